//! Language preference enrichment
//!
//! Browsers routinely under-report the languages their users read. Before
//! scoring, the client list is completed with low-weight preferences so that
//! some variant stays selectable:
//!
//! - primary tags implied by sub-tagged preferences (`en` for `en-GB`)
//! - the server default language, and its primary tag
//! - a final "all languages" preference

use serde::{Deserialize, Serialize};

use crate::metadata::{Language, Preference};

/// Qualities given to synthesized language preferences
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentPolicy {
    /// Base quality of an implied primary tag
    pub implied_primary_base: f32,
    /// Share of the originating preference's quality added to the base
    pub implied_primary_factor: f32,
    /// Quality of the server default language
    pub default_language: f32,
    /// Quality of the default language's primary tag
    pub default_primary: f32,
    /// Quality of the trailing "all languages" preference
    pub all_languages: f32,
}

impl Default for EnrichmentPolicy {
    fn default() -> Self {
        Self {
            implied_primary_base: 0.005,
            implied_primary_factor: 0.001,
            default_language: 0.003,
            default_primary: 0.002,
            all_languages: 0.001,
        }
    }
}

impl EnrichmentPolicy {
    /// Complete the client's language preferences
    ///
    /// An empty client list means every language is accepted at full
    /// quality. When a default language exists, every "all languages"
    /// preference the client sent is replaced by the low-weight one so the
    /// default wins over arbitrary languages.
    #[must_use]
    pub fn enrich_languages(
        &self,
        client: &[Preference<Language>],
        default_language: Option<&Language>,
    ) -> Vec<Preference<Language>> {
        let mut result: Vec<Preference<Language>> = client.to_vec();
        let mut primaries = Vec::new();

        if result.is_empty() {
            result.push(Preference::full(Language::all()));
        } else {
            let mut seen: Vec<String> = Vec::new();

            for pref in &result {
                if let Some(parent) = pref.metadata.parent() {
                    let primary = parent.primary_tag().to_ascii_lowercase();
                    if !seen.contains(&primary) {
                        seen.push(primary);
                        primaries.push(Preference::new(
                            parent,
                            self.implied_primary_base + self.implied_primary_factor * pref.quality,
                        ));
                    }
                }
            }

            if let Some(parent) = default_language.and_then(Language::parent) {
                if !seen.contains(&parent.primary_tag().to_ascii_lowercase()) {
                    primaries.push(Preference::new(parent, self.default_primary));
                }
            }
        }

        result.extend(primaries);

        if let Some(default) = default_language {
            result.push(Preference::new(default.clone(), self.default_language));
            result.retain(|pref| !pref.metadata.is_all());
        }

        result.push(Preference::new(Language::all(), self.all_languages));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lang(tag: &str) -> Language {
        Language::parse(tag).unwrap()
    }

    fn tags(prefs: &[Preference<Language>]) -> Vec<String> {
        prefs.iter().map(|p| p.metadata.to_string()).collect()
    }

    #[test]
    fn test_empty_client_list() {
        let prefs = EnrichmentPolicy::default().enrich_languages(&[], None);

        assert_eq!(tags(&prefs), ["*", "*"]);
        assert!((prefs[0].quality - 1.0).abs() < f32::EPSILON);
        assert!((prefs[1].quality - 0.001).abs() < f32::EPSILON);
    }

    #[test]
    fn test_implied_primaries() {
        let client = vec![
            Preference::new(lang("en-GB"), 1.0),
            Preference::new(lang("en-US"), 0.8),
            Preference::new(lang("fr-CA"), 0.5),
        ];
        let prefs = EnrichmentPolicy::default().enrich_languages(&client, None);

        assert_eq!(tags(&prefs), ["en-GB", "en-US", "fr-CA", "en", "fr", "*"]);
        assert!((prefs[3].quality - 0.006).abs() < 1e-6);
        assert!((prefs[4].quality - 0.0055).abs() < 1e-6);
    }

    #[test]
    fn test_default_language_replaces_all() {
        let client = vec![
            Preference::new(lang("de"), 1.0),
            Preference::new(Language::all(), 0.5),
        ];
        let default = lang("es-MX");
        let prefs = EnrichmentPolicy::default().enrich_languages(&client, Some(&default));

        assert_eq!(tags(&prefs), ["de", "es", "es-MX", "*"]);
        assert!((prefs[1].quality - 0.002).abs() < 1e-6);
        assert!((prefs[2].quality - 0.003).abs() < 1e-6);
        assert!((prefs[3].quality - 0.001).abs() < 1e-6);
    }

    #[test]
    fn test_default_primary_already_covered() {
        let client = vec![Preference::new(lang("en-GB"), 1.0)];
        let default = lang("en-US");
        let prefs = EnrichmentPolicy::default().enrich_languages(&client, Some(&default));

        assert_eq!(tags(&prefs), ["en-GB", "en", "en-US", "*"]);
    }
}
