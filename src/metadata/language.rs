//! Language tags

use std::fmt;
use std::str::FromStr;

use crate::{ConnegError, Result};

use super::WILDCARD;

/// A language tag such as `en`, `en-GB` or the `*` range
#[derive(Debug, Clone)]
pub struct Language {
    primary: String,
    sub_tags: Vec<String>,
}

impl Language {
    /// Parse a language tag
    ///
    /// # Errors
    ///
    /// Returns error if the tag or one of its sub-tags is empty
    pub fn parse(tag: &str) -> Result<Self> {
        let tag = tag.trim();
        let mut parts = tag.split('-');

        let primary = parts.next().unwrap_or_default();
        if primary.is_empty() {
            return Err(ConnegError::InvalidMetadata(format!(
                "empty language tag: {tag:?}"
            )));
        }

        let mut sub_tags = Vec::new();
        for part in parts {
            if part.is_empty() {
                return Err(ConnegError::InvalidMetadata(format!(
                    "empty language sub-tag in {tag:?}"
                )));
            }
            sub_tags.push(part.to_string());
        }

        Ok(Self {
            primary: primary.to_string(),
            sub_tags,
        })
    }

    /// The `*` range accepting every language
    #[must_use]
    pub fn all() -> Self {
        Self {
            primary: WILDCARD.to_string(),
            sub_tags: Vec::new(),
        }
    }

    /// Primary tag (`en` in `en-GB`)
    #[must_use]
    pub fn primary_tag(&self) -> &str {
        &self.primary
    }

    /// Sub-tags following the primary tag
    #[must_use]
    pub fn sub_tags(&self) -> &[String] {
        &self.sub_tags
    }

    /// Whether this is the `*` range
    #[must_use]
    pub fn is_all(&self) -> bool {
        self.primary == WILDCARD && self.sub_tags.is_empty()
    }

    /// Primary-only language when sub-tags are present
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.sub_tags.is_empty() {
            None
        } else {
            Some(Self {
                primary: self.primary.clone(),
                sub_tags: Vec::new(),
            })
        }
    }

    /// Whether this language range includes `other`
    ///
    /// `*` includes everything; otherwise the primary tags must match and
    /// this language's sub-tags must prefix the other's.
    #[must_use]
    pub fn includes(&self, other: &Self) -> bool {
        if self.is_all() {
            return true;
        }

        self.primary.eq_ignore_ascii_case(&other.primary)
            && self.sub_tags.len() <= other.sub_tags.len()
            && self
                .sub_tags
                .iter()
                .zip(&other.sub_tags)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

impl PartialEq for Language {
    fn eq(&self, other: &Self) -> bool {
        self.primary.eq_ignore_ascii_case(&other.primary)
            && self.sub_tags.len() == other.sub_tags.len()
            && self
                .sub_tags
                .iter()
                .zip(&other.sub_tags)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

impl Eq for Language {}

impl FromStr for Language {
    type Err = ConnegError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.primary)?;
        for sub_tag in &self.sub_tags {
            write!(f, "-{sub_tag}")?;
        }
        Ok(())
    }
}
