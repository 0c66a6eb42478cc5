//! Sub-signal derivation for the enrichment payload.
//!
//! Beyond the headline classification, each enrichment run records the raw
//! evidence it gathered: an estimate of the contributor's network reach, a
//! career/seniority signal, contact candidates, and company intelligence.
//! The bundle is persisted verbatim on the social context so downstream
//! consumers can audit how a classification came about.

use serde::Serialize;
use serde_json::Value;

use leadsourcer_shared::{Contributor, PositionLevel};

use crate::profile::{DiscoveredProfile, position_level};
use crate::search::SearchResults;

/// Snippets kept as company intelligence evidence.
const COMPANY_INTEL_LIMIT: usize = 3;

// ---------------------------------------------------------------------------
// Signal types
// ---------------------------------------------------------------------------

/// Estimated professional-network reach from host-profile counts.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NetworkSignal {
    pub followers: i64,
    pub following: i64,
    pub estimated_reach: &'static str,
}

/// Career/seniority signal from the discovered position.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CareerSignal {
    pub title: Option<String>,
    pub seniority: PositionLevel,
}

/// Contact-candidate signal: guessed email patterns and known profiles.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ContactSignal {
    pub email_candidates: Vec<String>,
    pub social_profiles: Vec<String>,
}

/// Company signal derived from the intelligence search.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompanySignal {
    pub name: Option<String>,
    pub mentions: usize,
    pub evidence: Vec<String>,
}

/// All sub-signals gathered for one contributor.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SignalBundle {
    pub network: NetworkSignal,
    pub career: CareerSignal,
    pub contacts: ContactSignal,
    pub company: CompanySignal,
}

impl SignalBundle {
    /// Serialize for the `raw_signals` payload column.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Derive all sub-signals from the contributor row, the discovered profile,
/// and the company-intelligence search results.
pub fn derive_signals(
    contributor: &Contributor,
    profile: Option<&DiscoveredProfile>,
    company_results: &SearchResults,
) -> SignalBundle {
    let title = profile.and_then(|p| p.current_position.clone());
    let seniority = title
        .as_deref()
        .map(position_level)
        .unwrap_or(PositionLevel::Unknown);

    let company_name = profile
        .and_then(|p| p.current_company.clone())
        .or_else(|| contributor.company.clone())
        .map(|c| clean_company(&c))
        .filter(|c| !c.is_empty());

    SignalBundle {
        network: NetworkSignal {
            followers: contributor.followers,
            following: contributor.following,
            estimated_reach: reach_bucket(contributor.followers),
        },
        career: CareerSignal { title, seniority },
        contacts: contact_signal(contributor, company_name.as_deref()),
        company: company_signal(company_name, company_results),
    }
}

fn reach_bucket(followers: i64) -> &'static str {
    match followers {
        n if n >= 1_000 => "broad",
        n if n >= 100 => "established",
        n if n >= 10 => "emerging",
        _ => "minimal",
    }
}

fn contact_signal(contributor: &Contributor, company: Option<&str>) -> ContactSignal {
    let mut email_candidates = Vec::new();

    // Known address beats any guess.
    if let Some(email) = contributor.email.as_deref().filter(|e| !e.is_empty()) {
        email_candidates.push(email.to_string());
    } else if let (Some(name), Some(domain)) = (
        contributor.full_name.as_deref(),
        company.and_then(company_domain_guess),
    ) {
        let parts: Vec<String> = name
            .split_whitespace()
            .map(|p| {
                p.chars()
                    .filter(|c| c.is_ascii_alphanumeric())
                    .collect::<String>()
                    .to_lowercase()
            })
            .filter(|p| !p.is_empty())
            .collect();

        if let [first, .., last] = parts.as_slice() {
            email_candidates.push(format!("{first}.{last}@{domain}"));
            email_candidates.push(format!("{first}@{domain}"));
            if let Some(initial) = first.chars().next() {
                email_candidates.push(format!("{initial}{last}@{domain}"));
            }
        }
    }

    let mut social_profiles = Vec::new();
    if let Some(twitter) = contributor.twitter_username.as_deref().filter(|t| !t.is_empty()) {
        social_profiles.push(format!("https://twitter.com/{twitter}"));
    }
    if let Some(blog) = contributor.blog.as_deref().filter(|b| !b.is_empty()) {
        social_profiles.push(blog.to_string());
    }

    ContactSignal {
        email_candidates,
        social_profiles,
    }
}

fn company_signal(name: Option<String>, results: &SearchResults) -> CompanySignal {
    let Some(name) = name else {
        return CompanySignal {
            name: None,
            mentions: 0,
            evidence: Vec::new(),
        };
    };

    let needle = name.to_lowercase();
    let mentions = results
        .organic
        .iter()
        .filter(|r| {
            r.title.to_lowercase().contains(&needle) || r.snippet.to_lowercase().contains(&needle)
        })
        .count();

    let evidence = results
        .organic
        .iter()
        .filter(|r| !r.snippet.is_empty())
        .take(COMPANY_INTEL_LIMIT)
        .map(|r| r.snippet.clone())
        .collect();

    CompanySignal {
        name: Some(name),
        mentions,
        evidence,
    }
}

/// Strip the `@`-prefix convention from host company fields.
pub fn clean_company(raw: &str) -> String {
    raw.trim().trim_start_matches('@').trim().to_string()
}

/// Guess a company web domain from its name.
fn company_domain_guess(company: &str) -> Option<String> {
    let slug: String = company
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if slug.is_empty() {
        None
    } else {
        Some(format!("{slug}.com"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::OrganicResult;
    use uuid::Uuid;

    fn contributor() -> Contributor {
        Contributor {
            id: Uuid::now_v7().to_string(),
            account_id: 1,
            username: "asmith".into(),
            full_name: Some("Alice Smith".into()),
            email: None,
            company: Some("@Acme".into()),
            location: Some("Berlin".into()),
            bio: None,
            blog: Some("https://alice.example".into()),
            twitter_username: Some("alicedev".into()),
            avatar_url: None,
            profile_url: None,
            public_repos: 30,
            followers: 250,
            following: 10,
        }
    }

    fn profile() -> DiscoveredProfile {
        DiscoveredProfile {
            profile_url: "https://linkedin.com/in/alice".into(),
            username: Some("alice".into()),
            headline: Some("VP of Engineering at Acme".into()),
            photo_url: None,
            current_position: Some("VP of Engineering".into()),
            current_company: Some("Acme Corp".into()),
        }
    }

    #[test]
    fn derives_full_bundle() {
        let results = SearchResults {
            organic: vec![OrganicResult {
                title: "Acme Corp raises Series B".into(),
                link: "https://news.example/acme".into(),
                snippet: "Acme Corp, a 200-person company, raised...".into(),
                ..Default::default()
            }],
        };

        let bundle = derive_signals(&contributor(), Some(&profile()), &results);

        assert_eq!(bundle.network.estimated_reach, "established");
        assert_eq!(bundle.career.seniority, PositionLevel::Director);
        assert_eq!(bundle.company.name.as_deref(), Some("Acme Corp"));
        assert_eq!(bundle.company.mentions, 1);
        assert_eq!(bundle.company.evidence.len(), 1);
        assert!(
            bundle
                .contacts
                .email_candidates
                .contains(&"alice.smith@acmecorp.com".to_string())
        );
        assert!(
            bundle
                .contacts
                .social_profiles
                .contains(&"https://twitter.com/alicedev".to_string())
        );
    }

    #[test]
    fn known_email_wins_over_guesses() {
        let mut c = contributor();
        c.email = Some("alice@acme.io".into());
        let bundle = derive_signals(&c, Some(&profile()), &SearchResults::default());
        assert_eq!(bundle.contacts.email_candidates, vec!["alice@acme.io"]);
    }

    #[test]
    fn no_profile_means_unknown_seniority() {
        let bundle = derive_signals(&contributor(), None, &SearchResults::default());
        assert_eq!(bundle.career.seniority, PositionLevel::Unknown);
        assert!(bundle.career.title.is_none());
        // Company falls back to the host-profile field, cleaned.
        assert_eq!(bundle.company.name.as_deref(), Some("Acme"));
    }

    #[test]
    fn reach_buckets() {
        assert_eq!(reach_bucket(5_000), "broad");
        assert_eq!(reach_bucket(500), "established");
        assert_eq!(reach_bucket(50), "emerging");
        assert_eq!(reach_bucket(3), "minimal");
    }

    #[test]
    fn company_cleaning_and_domain_guess() {
        assert_eq!(clean_company("@Acme "), "Acme");
        assert_eq!(company_domain_guess("Acme Corp"), Some("acmecorp.com".into()));
        assert_eq!(company_domain_guess("@!!"), None);
    }

    #[test]
    fn bundle_serializes_to_value() {
        let bundle = derive_signals(&contributor(), None, &SearchResults::default());
        let value = bundle.to_value();
        assert!(value.get("network").is_some());
        assert!(value.get("career").is_some());
        assert!(value.get("contacts").is_some());
        assert!(value.get("company").is_some());
    }
}
