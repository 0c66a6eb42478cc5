//! Professional-profile extraction from raw search results.
//!
//! Search hits are messy: the profile URL hides in any of the organic
//! results, the title usually reads "Position - Company | LinkedIn", and
//! the snippet carries the headline. The extractors here normalize that
//! into a [`DiscoveredProfile`].

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use leadsourcer_shared::PositionLevel;

use crate::search::SearchResults;

static PROFILE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:https?://)?(?:www\.)?linkedin\.com/in/([A-Za-z0-9%_-]+)")
        .expect("profile URL regex")
});

static POSITION_COMPANY_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(.+?)\s+at\s+(.+?)(?:\s*[·•|]|$)",
        r"(?i)(.+?)\s+@\s+(.+?)(?:\s*[·•|]|$)",
        r"(?i)(.+?)\s+-\s+(.+?)(?:\s*[·•|]|$)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("position/company regex"))
    .collect()
});

/// Maximum headline length kept from a snippet.
const HEADLINE_MAX_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// DiscoveredProfile
// ---------------------------------------------------------------------------

/// Structured result of profile discovery. Persisted as stage-1 output of
/// the enrichment pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredProfile {
    pub profile_url: String,
    pub username: Option<String>,
    pub headline: Option<String>,
    pub photo_url: Option<String>,
    pub current_position: Option<String>,
    pub current_company: Option<String>,
}

/// Extract the first professional profile from search results.
pub fn extract_profile(results: &SearchResults) -> Option<DiscoveredProfile> {
    let hit = results
        .organic
        .iter()
        .find(|r| r.link.contains("linkedin.com/in/"))?;

    let username = PROFILE_URL_RE
        .captures(&hit.link)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    // Title usually reads "Position - Company | LinkedIn".
    let (mut position, mut company) = split_title(&hit.title);
    if position.is_none() {
        let (p, c) = parse_position_company(&hit.snippet);
        position = p;
        company = company.or(c);
    }

    Some(DiscoveredProfile {
        profile_url: hit.link.clone(),
        username,
        headline: non_empty(truncate_chars(&hit.snippet, HEADLINE_MAX_CHARS)),
        photo_url: hit.image.clone().or_else(|| hit.thumbnail.clone()),
        current_position: position,
        current_company: company,
    })
}

/// Look for a profile link in host-profile free text (bio, blog field).
pub fn profile_from_hints(bio: Option<&str>, blog: Option<&str>) -> Option<(String, String)> {
    let combined = format!("{} {}", bio.unwrap_or_default(), blog.unwrap_or_default());
    let captures = PROFILE_URL_RE.captures(&combined)?;
    let username = captures.get(1)?.as_str().to_string();
    Some((format!("https://linkedin.com/in/{username}"), username))
}

fn split_title(title: &str) -> (Option<String>, Option<String>) {
    let mut parts = title.splitn(3, " - ");
    let first = parts.next().map(str::trim);
    let second = parts.next().map(str::trim);
    match (first, second) {
        (Some(position), Some(company)) if !position.is_empty() && !company.is_empty() => (
            Some(position.to_string()),
            Some(strip_site_suffix(company)),
        ),
        _ => (None, None),
    }
}

/// Parse "Position at Company"-shaped text.
pub(crate) fn parse_position_company(text: &str) -> (Option<String>, Option<String>) {
    for pattern in POSITION_COMPANY_RE.iter() {
        if let Some(captures) = pattern.captures(text) {
            let position = captures.get(1).map(|m| m.as_str().trim().to_string());
            let company = captures
                .get(2)
                .map(|m| strip_site_suffix(m.as_str().trim()));
            return (position, company);
        }
    }
    (None, None)
}

fn strip_site_suffix(company: &str) -> String {
    company
        .split('|')
        .next()
        .unwrap_or(company)
        .trim()
        .to_string()
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect::<String>().trim().to_string()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

// ---------------------------------------------------------------------------
// Position level
// ---------------------------------------------------------------------------

/// Classify a job title into a seniority bucket. Checked top-down so
/// "Senior Engineering Manager" lands on Manager, not Senior.
pub fn position_level(title: &str) -> PositionLevel {
    let title = title.to_lowercase();
    let contains_any = |terms: &[&str]| terms.iter().any(|t| title.contains(t));

    if contains_any(&[
        "ceo", "cto", "cfo", "coo", "cmo", "chief", "president", "founder",
    ]) {
        PositionLevel::CSuite
    } else if contains_any(&["vp", "vice president", "director", "head of"]) {
        PositionLevel::Director
    } else if contains_any(&["manager", "principal"]) {
        PositionLevel::Manager
    } else if title.contains("lead") {
        PositionLevel::Lead
    } else if contains_any(&["senior", "sr.", "staff"]) {
        PositionLevel::Senior
    } else if contains_any(&["engineer", "developer", "architect", "analyst"]) {
        PositionLevel::Mid
    } else {
        PositionLevel::Entry
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
