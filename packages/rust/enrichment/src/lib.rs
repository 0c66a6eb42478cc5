//! Social enrichment: web search, professional-profile extraction,
//! sub-signal derivation, and the classification oracle.
//!
//! The pipeline uses these pieces in order: [`SearchClient`] discovers a
//! candidate profile, [`profile`] extracts structured fields from the raw
//! results, [`signals`] derives the network/career/contact/company
//! sub-signals, and [`OracleClient`] turns the assembled picture into a
//! lead classification (with a rule-based fallback when no oracle is
//! configured).

pub mod classify;
pub mod profile;
pub mod search;
pub mod signals;

pub use classify::{Classified, ClassifyInput, OracleClient, rule_based};
pub use profile::{DiscoveredProfile, extract_profile, position_level, profile_from_hints};
pub use search::{OrganicResult, SearchClient, SearchResults, company_query, person_query};
pub use signals::{SignalBundle, derive_signals};
