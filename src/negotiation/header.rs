//! Reading preference lists from `Accept-*` header values

use std::str::FromStr;

use tracing::debug;

use crate::metadata::{CharacterSet, Language, MediaType, Preference};
use crate::ConnegError;

use super::ClientPreferences;

/// Parse a comma-separated preference header
///
/// Each entry may carry a `q` parameter; its absence means full quality.
/// Entries that fail to parse, or carry an invalid quality, are skipped.
#[must_use]
pub fn parse_preferences<T>(header: &str) -> Vec<Preference<T>>
where
    T: FromStr<Err = ConnegError>,
{
    let mut result = Vec::new();

    for entry in header.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        let mut value_parts = Vec::new();
        let mut quality = 1.0_f32;
        let mut valid = true;

        for (i, part) in entry.split(';').enumerate() {
            let part = part.trim();
            if i > 0 {
                if let Some(q) = quality_parameter(part) {
                    match q.parse::<f32>() {
                        Ok(q) if (0.0..=1.0).contains(&q) => quality = q,
                        _ => valid = false,
                    }
                    continue;
                }
            }
            value_parts.push(part);
        }

        if !valid {
            debug!("Skipping preference with invalid quality: {}", entry);
            continue;
        }

        match value_parts.join(";").parse::<T>() {
            Ok(metadata) => result.push(Preference::new(metadata, quality)),
            Err(e) => debug!("Skipping preference '{}': {}", entry, e),
        }
    }

    result
}

fn quality_parameter(part: &str) -> Option<&str> {
    let (name, value) = part.split_once('=')?;
    name.trim().eq_ignore_ascii_case("q").then(|| value.trim())
}

impl ClientPreferences {
    /// Build preferences from raw `Accept`, `Accept-Language` and
    /// `Accept-Charset` values; a missing header yields an empty list
    #[must_use]
    pub fn from_headers(
        accept: Option<&str>,
        accept_language: Option<&str>,
        accept_charset: Option<&str>,
    ) -> Self {
        Self {
            media_types: accept.map(parse_preferences::<MediaType>).unwrap_or_default(),
            languages: accept_language
                .map(parse_preferences::<Language>)
                .unwrap_or_default(),
            character_sets: accept_charset
                .map(parse_preferences::<CharacterSet>)
                .unwrap_or_default(),
        }
    }
}
