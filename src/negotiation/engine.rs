//! Variant selection

use tracing::debug;

use crate::metadata::{CharacterSet, Language, MediaType, Preference, Variant};

use super::enrich::EnrichmentPolicy;
use super::score::{accepts_character_set, score_language, score_media_type};

/// Weight of the language quality relative to the media type quality
pub const LANGUAGE_WEIGHT: f32 = 10.0;

/// Preferences stated by a client, in insertion order
#[derive(Debug, Clone, Default)]
pub struct ClientPreferences {
    /// Accepted languages
    pub languages: Vec<Preference<Language>>,
    /// Accepted media types
    pub media_types: Vec<Preference<MediaType>>,
    /// Accepted character sets
    pub character_sets: Vec<Preference<CharacterSet>>,
}

impl ClientPreferences {
    /// Add an accepted language
    #[must_use]
    pub fn accept_language(mut self, language: Language, quality: f32) -> Self {
        self.languages.push(Preference::new(language, quality));
        self
    }

    /// Add an accepted media type
    #[must_use]
    pub fn accept_media_type(mut self, media_type: MediaType, quality: f32) -> Self {
        self.media_types.push(Preference::new(media_type, quality));
        self
    }

    /// Add an accepted character set
    #[must_use]
    pub fn accept_character_set(mut self, character_set: CharacterSet, quality: f32) -> Self {
        self.character_sets.push(Preference::new(character_set, quality));
        self
    }
}

/// Stateless entry point configured with an enrichment policy
#[derive(Debug, Clone, Copy, Default)]
pub struct Negotiator {
    policy: EnrichmentPolicy,
}

impl Negotiator {
    /// Create a negotiator
    #[must_use]
    pub fn new(policy: EnrichmentPolicy) -> Self {
        Self { policy }
    }

    /// Enrichment policy in use
    #[must_use]
    pub fn policy(&self) -> &EnrichmentPolicy {
        &self.policy
    }

    /// Prepare a negotiation for one client
    #[must_use]
    pub fn negotiation<'p>(
        &self,
        preferences: &'p ClientPreferences,
        default_language: Option<&Language>,
    ) -> Negotiation<'p> {
        Negotiation::new(&self.policy, preferences, default_language)
    }

    /// Best variant for the client, or `None` when nothing is acceptable
    #[must_use]
    pub fn preferred_variant<'v>(
        &self,
        variants: &'v [Variant],
        preferences: &ClientPreferences,
        default_language: Option<&Language>,
    ) -> Option<&'v Variant> {
        self.negotiation(preferences, default_language)
            .preferred_variant(variants)
    }
}

/// Enriched preferences of one client, ready to score variants
#[derive(Debug, Clone)]
pub struct Negotiation<'p> {
    languages: Vec<Preference<Language>>,
    media_types: Vec<Preference<MediaType>>,
    character_sets: &'p [Preference<CharacterSet>],
}

impl<'p> Negotiation<'p> {
    /// Enrich the client's preferences
    #[must_use]
    pub fn new(
        policy: &EnrichmentPolicy,
        preferences: &'p ClientPreferences,
        default_language: Option<&Language>,
    ) -> Self {
        let media_types = if preferences.media_types.is_empty() {
            vec![Preference::full(MediaType::all())]
        } else {
            preferences.media_types.clone()
        };

        Self {
            languages: policy.enrich_languages(&preferences.languages, default_language),
            media_types,
            character_sets: &preferences.character_sets,
        }
    }

    /// Enriched language preferences
    #[must_use]
    pub fn languages(&self) -> &[Preference<Language>] {
        &self.languages
    }

    /// Media type preferences, `*/*` when the client sent none
    #[must_use]
    pub fn media_types(&self) -> &[Preference<MediaType>] {
        &self.media_types
    }

    /// Composite quality of a variant, or `None` when it is not acceptable
    ///
    /// For each dimension the most specific compatible preference is
    /// retained and its quality used: `10 × language + media type`.
    #[must_use]
    pub fn score_variant(&self, variant: &Variant) -> Option<f32> {
        let mut best_language: Option<(f32, &Preference<Language>)> = None;

        for language in &variant.languages {
            for pref in &self.languages {
                if let Some(score) = score_language(language, &pref.metadata) {
                    if best_language.map_or(true, |(best, _)| score > best) {
                        best_language = Some((score, pref));
                    }
                }
            }
        }

        if !variant.languages.is_empty() && best_language.is_none() {
            return None;
        }

        let mut best_media_type: Option<(f32, &Preference<MediaType>)> = None;

        if let Some(media_type) = &variant.media_type {
            for pref in &self.media_types {
                if let Some(score) = score_media_type(media_type, &pref.metadata) {
                    if best_media_type.map_or(true, |(best, _)| score > best) {
                        best_media_type = Some((score, pref));
                    }
                }
            }

            if best_media_type.is_none() {
                return None;
            }
        }

        if let Some(charset) = &variant.character_set {
            if !accepts_character_set(charset, self.character_sets) {
                return None;
            }
        }

        let mut quality = 0.0;
        if let Some((_, pref)) = best_language {
            quality += pref.quality * LANGUAGE_WEIGHT;
        }
        if let Some((_, pref)) = best_media_type {
            quality += pref.quality;
        }

        Some(quality)
    }

    /// Index of the best variant; the first one wins ties
    #[must_use]
    pub fn preferred_index(&self, variants: &[Variant]) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;

        for (index, variant) in variants.iter().enumerate() {
            match self.score_variant(variant) {
                Some(quality) => {
                    if best.map_or(true, |(_, best_quality)| quality > best_quality) {
                        best = Some((index, quality));
                    }
                }
                None => debug!("Variant {} is not acceptable", index),
            }
        }

        best.map(|(index, _)| index)
    }

    /// Best variant, or `None` when the list is empty or nothing is acceptable
    #[must_use]
    pub fn preferred_variant<'v>(&self, variants: &'v [Variant]) -> Option<&'v Variant> {
        self.preferred_index(variants).map(|index| &variants[index])
    }
}
