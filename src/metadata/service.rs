//! Extension-based metadata service

use tracing::debug;

use super::{CharacterSet, Language, MediaType, Variant};

/// Metadata an extension can map to
#[derive(Debug, Clone, PartialEq)]
pub enum Metadata {
    /// Language extension (`.en`)
    Language(Language),
    /// Media type extension (`.html`)
    MediaType(MediaType),
    /// Character set extension (`.utf8`)
    CharacterSet(CharacterSet),
}

/// Extension to metadata mapping
#[derive(Debug, Clone)]
struct MetadataExtension {
    name: String,
    metadata: Metadata,
}

/// Maps file extensions to metadata and holds the defaults used when a
/// file name says nothing about its media type
#[derive(Debug, Clone)]
pub struct MetadataService {
    mappings: Vec<MetadataExtension>,
    default_language: Option<Language>,
    default_media_type: MediaType,
}

impl MetadataService {
    /// Create a service with the common extensions registered
    #[must_use]
    pub fn new() -> Self {
        let mut service = Self::empty();
        service.add_common_extensions();
        service
    }

    /// Create a service without any extension
    #[must_use]
    pub fn empty() -> Self {
        Self {
            mappings: Vec::new(),
            default_language: None,
            default_media_type: MediaType::application_octet_stream(),
        }
    }

    /// Register an extension. The first registration of a name wins on lookup.
    pub fn add_extension(&mut self, name: &str, metadata: Metadata) {
        self.mappings.push(MetadataExtension {
            name: name.to_ascii_lowercase(),
            metadata,
        });
    }

    /// Look up the metadata registered for an extension
    #[must_use]
    pub fn metadata(&self, extension: &str) -> Option<&Metadata> {
        self.mappings
            .iter()
            .find(|mapping| mapping.name.eq_ignore_ascii_case(extension))
            .map(|mapping| &mapping.metadata)
    }

    /// Default language of served representations
    #[must_use]
    pub fn default_language(&self) -> Option<&Language> {
        self.default_language.as_ref()
    }

    /// Set the default language
    pub fn set_default_language(&mut self, language: Option<Language>) {
        self.default_language = language;
    }

    /// Base name of a file: the first dot-separated token followed by every
    /// token that is not a known extension
    #[must_use]
    pub fn base_name(&self, file_name: &str) -> String {
        let mut tokens = file_name.split('.');
        let mut base = tokens.next().unwrap_or_default().to_string();

        for token in tokens {
            if self.metadata(token).is_none() {
                base.push('.');
                base.push_str(token);
            }
        }

        base
    }

    /// Build the variant described by a file name's extensions
    ///
    /// With `apply_defaults`, a variant without a media type extension gets
    /// the default media type.
    #[must_use]
    pub fn variant_for(&self, file_name: &str, apply_defaults: bool) -> Variant {
        let mut variant = Variant::new();

        for token in file_name.split('.').skip(1) {
            match self.metadata(token) {
                Some(Metadata::Language(language)) => {
                    if !variant.languages.contains(language) {
                        variant.languages.push(language.clone());
                    }
                }
                Some(Metadata::MediaType(media_type)) => {
                    variant.media_type = Some(media_type.clone());
                }
                Some(Metadata::CharacterSet(charset)) => {
                    variant.character_set = Some(charset.clone());
                }
                None => {
                    debug!("Unknown extension '{}' in {}", token, file_name);
                }
            }
        }

        if apply_defaults && variant.media_type.is_none() {
            variant.media_type = Some(self.default_media_type.clone());
        }

        variant
    }

    /// Register the extensions every deployment expects
    pub fn add_common_extensions(&mut self) {
        for (name, tag) in [("de", "de"), ("en", "en"), ("es", "es"), ("fr", "fr"), ("it", "it")] {
            self.add_language(name, tag);
        }

        for (name, charset) in [
            ("ascii", "US-ASCII"),
            ("latin1", "ISO-8859-1"),
            ("mac", "MacRoman"),
            ("utf16", "UTF-16"),
            ("utf8", "UTF-8"),
            ("win", "windows-1252"),
        ] {
            self.add_character_set(name, charset);
        }

        for (name, main_type, sub_type) in [
            ("atom", "application", "atom+xml"),
            ("bin", "application", "octet-stream"),
            ("bmp", "image", "bmp"),
            ("css", "text", "css"),
            ("csv", "text", "csv"),
            ("gif", "image", "gif"),
            ("htm", "text", "html"),
            ("html", "text", "html"),
            ("ico", "image", "x-icon"),
            ("jpeg", "image", "jpeg"),
            ("jpg", "image", "jpeg"),
            ("js", "application", "javascript"),
            ("json", "application", "json"),
            ("mp3", "audio", "mpeg"),
            ("mp4", "video", "mp4"),
            ("pdf", "application", "pdf"),
            ("png", "image", "png"),
            ("rdf", "application", "rdf+xml"),
            ("rss", "application", "rss+xml"),
            ("svg", "image", "svg+xml"),
            ("tar", "application", "x-tar"),
            ("txt", "text", "plain"),
            ("uri", "text", "uri-list"),
            ("wadl", "application", "vnd.sun.wadl+xml"),
            ("xhtml", "application", "xhtml+xml"),
            ("xml", "text", "xml"),
            ("xml", "application", "xml"),
            ("xsd", "application", "x-xsd+xml"),
            ("zip", "application", "zip"),
        ] {
            self.add_extension(name, Metadata::MediaType(MediaType::new(main_type, sub_type)));
        }
    }

    fn add_language(&mut self, name: &str, tag: &str) {
        if let Ok(language) = Language::parse(tag) {
            self.add_extension(name, Metadata::Language(language));
        }
    }

    fn add_character_set(&mut self, name: &str, charset: &str) {
        if let Ok(charset) = CharacterSet::parse(charset) {
            self.add_extension(name, Metadata::CharacterSet(charset));
        }
    }
}

impl Default for MetadataService {
    fn default() -> Self {
        Self::new()
    }
}
