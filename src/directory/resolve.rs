//! Request path resolution under the served root

use std::borrow::Cow;

/// A request path resolved relative to the served root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Normalised path relative to the root, without leading slash
    pub relative: String,
    /// Whether the request explicitly addressed a directory
    pub trailing_slash: bool,
}

impl Target {
    /// Directory part of the target, slash-terminated or empty
    #[must_use]
    pub fn parent(&self) -> &str {
        match self.relative.rfind('/') {
            Some(index) => &self.relative[..=index],
            None => "",
        }
    }

    /// Last segment of the target, empty for the root
    #[must_use]
    pub fn file_name(&self) -> &str {
        match self.relative.rfind('/') {
            Some(index) => &self.relative[index + 1..],
            None => &self.relative,
        }
    }

    /// Absolute, percent-encoded reference of the target as seen by clients
    #[must_use]
    pub fn reference(&self) -> String {
        let mut reference = format!("/{}", encode_path(&self.relative));
        if self.trailing_slash && !reference.ends_with('/') {
            reference.push('/');
        }
        reference
    }
}

/// Percent-encode each segment of a decoded relative path
#[must_use]
pub fn encode_path(relative: &str) -> String {
    relative
        .split('/')
        .map(|segment| urlencoding::encode(segment))
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve a request path against the root
///
/// The path is percent-decoded first, so encoded dot segments are
/// normalised too. A `..` segment that would climb above the root is
/// dropped, which clamps the target to the root.
#[must_use]
pub fn resolve_target(request_path: &str) -> Target {
    let decoded: Cow<'_, str> = match urlencoding::decode(request_path) {
        Ok(decoded) => decoded,
        Err(_) => Cow::Owned(
            String::from_utf8_lossy(&urlencoding::decode_binary(request_path.as_bytes()))
                .into_owned(),
        ),
    };

    let mut segments: Vec<&str> = Vec::new();
    let mut ends_in_directory = true;

    for segment in decoded.split(&['/', '\\'][..]) {
        match segment {
            "" | "." => ends_in_directory = true,
            ".." => {
                segments.pop();
                ends_in_directory = true;
            }
            _ => {
                segments.push(segment);
                ends_in_directory = false;
            }
        }
    }

    Target {
        relative: segments.join("/"),
        trailing_slash: ends_in_directory,
    }
}
