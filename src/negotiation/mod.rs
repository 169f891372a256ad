//! Content negotiation engine
//!
//! Scores variants against client preference lists and selects the best
//! one. Pure computation: every call works on its own inputs, so the
//! engine can be shared freely across worker threads.

mod engine;
mod enrich;
mod header;
mod score;

pub use engine::{ClientPreferences, Negotiation, Negotiator, LANGUAGE_WEIGHT};
pub use enrich::EnrichmentPolicy;
pub use header::parse_preferences;
pub use score::{accepts_character_set, score_language, score_media_type};
