//! Pairwise match scores
//!
//! A score measures how specifically a preference matches a piece of
//! variant metadata. `None` means the two are incompatible.

use crate::metadata::{CharacterSet, Language, MediaType, Preference, WILDCARD};

/// Score a variant language against a preferred language range
#[must_use]
pub fn score_language(variant: &Language, preference: &Language) -> Option<f32> {
    let mut score = 0.0_f32;

    if variant.primary_tag().eq_ignore_ascii_case(preference.primary_tag()) {
        score += 100.0;
    } else if preference.primary_tag() != WILDCARD || !preference.sub_tags().is_empty() {
        // Only the bare "*" range may differ from the primary tag
        return None;
    } else {
        score += 1.0;
    }

    let variant_tags = variant.sub_tags();
    let preference_tags = preference.sub_tags();

    if variant_tags.is_empty() && preference_tags.is_empty() {
        score += 10.0;
    } else if !variant_tags.is_empty() && !preference_tags.is_empty() {
        for (i, (variant_tag, preference_tag)) in
            variant_tags.iter().zip(preference_tags).enumerate()
        {
            if !variant_tag.eq_ignore_ascii_case(preference_tag) {
                return None;
            }
            // Each position weighs ten times less than the previous one
            score += 10_f32.powi(1 - i as i32);
        }
    }

    Some(score)
}

/// Score a variant media type against a preferred media range
#[must_use]
pub fn score_media_type(variant: &MediaType, preference: &MediaType) -> Option<f32> {
    let mut score = 0.0_f32;

    if preference.main_type() == variant.main_type() {
        score += 1000.0;
    } else if preference.main_type() != WILDCARD || preference.sub_type() != WILDCARD {
        // Ranges such as "*/html" are not supported
        return None;
    }

    if variant.sub_type() == preference.sub_type() {
        score += 100.0;
    } else if preference.sub_type() != WILDCARD {
        return None;
    }

    for param in variant.parameters() {
        if preference.parameters().contains(param) {
            score += 1.0;
        }
    }

    Some(score)
}

/// Whether a character set is acceptable given the client's preferences
///
/// An empty preference list or a `*` range accepts everything. Otherwise
/// the character set must be listed with a non-zero quality.
#[must_use]
pub fn accepts_character_set(
    character_set: &CharacterSet,
    preferences: &[Preference<CharacterSet>],
) -> bool {
    preferences.is_empty()
        || preferences.iter().any(|pref| {
            pref.quality > 0.0 && (pref.metadata.is_all() || &pref.metadata == character_set)
        })
}
