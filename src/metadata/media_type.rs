//! Media types and media ranges

use std::fmt;
use std::str::FromStr;

use crate::{ConnegError, Result};

use super::WILDCARD;

/// A media type parameter such as `charset=UTF-8`
#[derive(Debug, Clone)]
pub struct Parameter {
    /// Parameter name, compared case-insensitively
    pub name: String,
    /// Parameter value, compared exactly
    pub value: String,
}

impl Parameter {
    /// Create a new parameter
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl PartialEq for Parameter {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name) && self.value == other.value
    }
}

impl Eq for Parameter {}

/// A media type (`text/html`) or range (`text/*`, `*/*`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    main_type: String,
    sub_type: String,
    parameters: Vec<Parameter>,
}

impl MediaType {
    /// Create a media type without parameters
    #[must_use]
    pub fn new(main_type: &str, sub_type: &str) -> Self {
        Self {
            main_type: main_type.to_ascii_lowercase(),
            sub_type: sub_type.to_ascii_lowercase(),
            parameters: Vec::new(),
        }
    }

    /// Parse `main/sub; name=value; ...`
    ///
    /// # Errors
    ///
    /// Returns error if the type is not of the `main/sub` form
    pub fn parse(value: &str) -> Result<Self> {
        let mut parts = value.split(';');
        let essence = parts.next().unwrap_or_default().trim();

        let (main_type, sub_type) = essence
            .split_once('/')
            .filter(|(main, sub)| !main.trim().is_empty() && !sub.trim().is_empty())
            .ok_or_else(|| ConnegError::InvalidMetadata(format!("invalid media type: {value:?}")))?;

        let mut media_type = Self::new(main_type.trim(), sub_type.trim());

        for part in parts {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (name, param_value) = part.split_once('=').unwrap_or((part, ""));
            media_type.parameters.push(Parameter::new(
                name.trim(),
                param_value.trim().trim_matches('"'),
            ));
        }

        Ok(media_type)
    }

    /// The `*/*` range
    #[must_use]
    pub fn all() -> Self {
        Self::new(WILDCARD, WILDCARD)
    }

    /// `application/octet-stream`
    #[must_use]
    pub fn application_octet_stream() -> Self {
        Self::new("application", "octet-stream")
    }

    /// `text/plain`
    #[must_use]
    pub fn text_plain() -> Self {
        Self::new("text", "plain")
    }

    /// `text/html`
    #[must_use]
    pub fn text_html() -> Self {
        Self::new("text", "html")
    }

    /// `text/uri-list`
    #[must_use]
    pub fn text_uri_list() -> Self {
        Self::new("text", "uri-list")
    }

    /// Add a parameter, builder style
    #[must_use]
    pub fn with_parameter(mut self, name: &str, value: &str) -> Self {
        self.parameters.push(Parameter::new(name, value));
        self
    }

    /// Main type (`text` in `text/html`)
    #[must_use]
    pub fn main_type(&self) -> &str {
        &self.main_type
    }

    /// Sub-type (`html` in `text/html`)
    #[must_use]
    pub fn sub_type(&self) -> &str {
        &self.sub_type
    }

    /// Parameters in declaration order
    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Whether the range is `*/*`
    #[must_use]
    pub fn is_all(&self) -> bool {
        self.main_type == WILDCARD && self.sub_type == WILDCARD
    }

    /// Whether this range includes `other`, ignoring parameters
    #[must_use]
    pub fn includes(&self, other: &Self) -> bool {
        if self.is_all() {
            return true;
        }

        self.main_type == other.main_type
            && (self.sub_type == WILDCARD || self.sub_type == other.sub_type)
    }
}

impl FromStr for MediaType {
    type Err = ConnegError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.main_type, self.sub_type)?;
        for param in &self.parameters {
            write!(f, "; {}={}", param.name, param.value)?;
        }
        Ok(())
    }
}
