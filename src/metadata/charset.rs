//! Character sets

use std::fmt;
use std::str::FromStr;

use crate::{ConnegError, Result};

use super::WILDCARD;

/// A character set name such as `UTF-8`, or the `*` range
#[derive(Debug, Clone)]
pub struct CharacterSet {
    name: String,
}

impl CharacterSet {
    /// Parse a character set name
    ///
    /// # Errors
    ///
    /// Returns error if the name is empty
    pub fn parse(name: &str) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ConnegError::InvalidMetadata(
                "empty character set name".to_string(),
            ));
        }
        Ok(Self {
            name: name.to_string(),
        })
    }

    /// The `*` range
    #[must_use]
    pub fn all() -> Self {
        Self {
            name: WILDCARD.to_string(),
        }
    }

    /// Character set name as given
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is the `*` range
    #[must_use]
    pub fn is_all(&self) -> bool {
        self.name == WILDCARD
    }
}

impl PartialEq for CharacterSet {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl Eq for CharacterSet {}

impl FromStr for CharacterSet {
    type Err = ConnegError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for CharacterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
