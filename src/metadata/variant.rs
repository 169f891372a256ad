//! Variant descriptors

use super::{CharacterSet, Language, MediaType};

/// A candidate representation a resource can produce
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variant {
    /// Media type of the representation
    pub media_type: Option<MediaType>,
    /// Languages of the representation
    pub languages: Vec<Language>,
    /// Character set of the representation
    pub character_set: Option<CharacterSet>,
    /// Location reference, when the variant is individually addressable
    pub location: Option<String>,
}

impl Variant {
    /// Create an empty variant
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the media type
    #[must_use]
    pub fn with_media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = Some(media_type);
        self
    }

    /// Add a language
    #[must_use]
    pub fn with_language(mut self, language: Language) -> Self {
        self.languages.push(language);
        self
    }

    /// Set the character set
    #[must_use]
    pub fn with_character_set(mut self, character_set: CharacterSet) -> Self {
        self.character_set = Some(character_set);
        self
    }

    /// Set the location reference
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Whether this prototype variant admits `other`
    ///
    /// Unset metadata admits anything. Set metadata must include the
    /// corresponding metadata of `other`, which must then be present.
    #[must_use]
    pub fn includes(&self, other: &Self) -> bool {
        let media_type = match (&self.media_type, &other.media_type) {
            (None, _) => true,
            (Some(range), Some(media_type)) => range.includes(media_type),
            (Some(_), None) => false,
        };

        let languages = self.languages.is_empty()
            || (!other.languages.is_empty()
                && other
                    .languages
                    .iter()
                    .all(|lang| self.languages.iter().any(|range| range.includes(lang))));

        let character_set = match (&self.character_set, &other.character_set) {
            (None, _) => true,
            (Some(range), Some(charset)) => range.is_all() || range == charset,
            (Some(_), None) => false,
        };

        media_type && languages && character_set
    }
}
