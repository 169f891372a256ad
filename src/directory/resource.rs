//! Static directory resource with extension-based variants

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::DirectoryConfig;
use crate::metadata::{Language, MetadataService, Variant};
use crate::negotiation::{ClientPreferences, Negotiator};
use crate::Result;

use super::resolve::{resolve_target, Target};

/// A discovered file and the variant its name describes
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryVariant {
    /// Metadata and location reference
    pub variant: Variant,
    /// File backing the variant
    pub path: PathBuf,
}

/// Result of a GET on the directory
#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryOutcome {
    /// A single variant was selected
    Found(DirectoryVariant),
    /// Negotiation is disabled and several variants exist
    MultipleChoices(Vec<String>),
    /// Directory listing, as absolute references
    Listing(Vec<String>),
    /// Directory addressed without its trailing slash
    Redirect(String),
    /// Nothing matches the target
    NotFound,
    /// Variants exist but none suits the client preferences
    NotAcceptable,
}

/// Serves a directory tree, discovering variants from file names
pub struct DirectoryResource {
    root: PathBuf,
    index_name: Option<String>,
    negotiate_content: bool,
    listing_allowed: bool,
    deeply_accessible: bool,
    metadata: MetadataService,
    negotiator: Negotiator,
}

impl DirectoryResource {
    /// Create a directory resource
    #[must_use]
    pub fn new(config: &DirectoryConfig, metadata: MetadataService, negotiator: Negotiator) -> Self {
        Self {
            root: config.root.clone(),
            index_name: config.index_name.clone().filter(|name| !name.is_empty()),
            negotiate_content: config.negotiate_content,
            listing_allowed: config.listing_allowed,
            deeply_accessible: config.deeply_accessible,
            metadata,
            negotiator,
        }
    }

    /// Create a directory resource from configuration, registering the
    /// default language on a standard metadata service
    ///
    /// # Errors
    ///
    /// Returns error if the default language is not a valid tag
    pub fn from_config(config: &DirectoryConfig, negotiator: Negotiator) -> Result<Self> {
        let mut metadata = MetadataService::new();
        if let Some(language) = &config.default_language {
            metadata.set_default_language(Some(Language::parse(language)?));
        }
        Ok(Self::new(config, metadata, negotiator))
    }

    /// Served root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether variants are negotiated rather than listed
    #[must_use]
    pub fn negotiates(&self) -> bool {
        self.negotiate_content
    }

    /// Metadata service used to interpret file names
    #[must_use]
    pub fn metadata(&self) -> &MetadataService {
        &self.metadata
    }

    /// Handle a GET (or HEAD) on a request path
    ///
    /// # Errors
    ///
    /// Returns error if the file system cannot be read
    pub fn get(
        &self,
        request_path: &str,
        query: Option<&str>,
        preferences: &ClientPreferences,
    ) -> Result<DirectoryOutcome> {
        let target = resolve_target(request_path);
        let fs_target = self.root.join(&target.relative);

        debug!("Converted target: {} -> {}", request_path, fs_target.display());

        if fs_target.is_dir() {
            if !self.deeply_accessible && !target.relative.is_empty() {
                return Ok(DirectoryOutcome::NotFound);
            }

            if !request_path.ends_with('/') {
                let mut location = target.reference();
                if !location.ends_with('/') {
                    location.push('/');
                }
                if let Some(query) = query.filter(|q| !q.is_empty()) {
                    location.push('?');
                    location.push_str(query);
                }
                return Ok(DirectoryOutcome::Redirect(location));
            }

            let directory_ref = target.reference();
            let variants = match &self.index_name {
                Some(index_name) => self.discover(&fs_target, &directory_ref, index_name)?,
                None => Vec::new(),
            };

            if variants.is_empty() && self.listing_allowed {
                return Ok(DirectoryOutcome::Listing(list_directory(
                    &fs_target,
                    &directory_ref,
                )?));
            }

            return Ok(self.select(variants, preferences));
        }

        if !self.deeply_accessible && !target.parent().is_empty() {
            return Ok(DirectoryOutcome::NotFound);
        }

        let file_name = target.file_name();
        if file_name.is_empty() {
            return Ok(DirectoryOutcome::NotFound);
        }

        let directory = self.root.join(target.parent());
        let directory_ref = Target {
            relative: target.parent().trim_end_matches('/').to_string(),
            trailing_slash: true,
        }
        .reference();

        let variants = self.discover(&directory, &directory_ref, file_name)?;
        Ok(self.select(variants, preferences))
    }

    /// Files of `directory` that are variants of `requested_name`, sorted
    /// by file name
    ///
    /// # Errors
    ///
    /// Returns error if the directory exists but cannot be listed
    pub fn discover(
        &self,
        directory: &Path,
        directory_ref: &str,
        requested_name: &str,
    ) -> Result<Vec<DirectoryVariant>> {
        let entries = match fs::read_dir(directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let base_name = self.metadata.base_name(requested_name);
        let prototype = self.metadata.variant_for(requested_name, false);

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }

            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };

            if self.metadata.base_name(&name) != base_name {
                continue;
            }

            let variant = self
                .metadata
                .variant_for(&name, true)
                .with_location(format!("{directory_ref}{}", urlencoding::encode(&name)));

            if !prototype.includes(&variant) {
                debug!("Excluding {}: not included in {}", name, requested_name);
                continue;
            }

            found.push((name, DirectoryVariant {
                variant,
                path: entry.path(),
            }));
        }

        found.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(found.into_iter().map(|(_, variant)| variant).collect())
    }

    fn select(
        &self,
        mut variants: Vec<DirectoryVariant>,
        preferences: &ClientPreferences,
    ) -> DirectoryOutcome {
        if variants.is_empty() {
            return DirectoryOutcome::NotFound;
        }

        if self.negotiate_content {
            let candidates: Vec<Variant> = variants.iter().map(|v| v.variant.clone()).collect();
            let negotiation = self
                .negotiator
                .negotiation(preferences, self.metadata.default_language());

            return match negotiation.preferred_index(&candidates) {
                Some(index) => DirectoryOutcome::Found(variants.swap_remove(index)),
                None => DirectoryOutcome::NotAcceptable,
            };
        }

        if variants.len() == 1 {
            return DirectoryOutcome::Found(variants.swap_remove(0));
        }

        let mut references = Vec::with_capacity(variants.len());
        for variant in variants {
            match variant.variant.location {
                Some(location) => references.push(location),
                None => warn!(
                    "A resource with multiple variants should provide a location for each variant when content negotiation is turned off"
                ),
            }
        }

        if references.is_empty() {
            DirectoryOutcome::NotFound
        } else {
            DirectoryOutcome::MultipleChoices(references)
        }
    }
}

fn list_directory(directory: &Path, directory_ref: &str) -> Result<Vec<String>> {
    let mut references = Vec::new();

    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };

        if entry.file_type()?.is_dir() {
            references.push(format!("{directory_ref}{}/", urlencoding::encode(&name)));
        } else {
            references.push(format!("{directory_ref}{}", urlencoding::encode(&name)));
        }
    }

    references.sort();
    Ok(references)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MediaType;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), name.as_bytes()).unwrap();
    }

    fn resource(dir: &TempDir) -> DirectoryResource {
        let config = DirectoryConfig::new(dir.path().to_path_buf());
        DirectoryResource::from_config(&config, Negotiator::default()).unwrap()
    }

    fn found(outcome: DirectoryOutcome) -> DirectoryVariant {
        match outcome {
            DirectoryOutcome::Found(variant) => variant,
            other => panic!("expected a variant, got {other:?}"),
        }
    }

    #[test]
    fn test_negotiates_between_languages() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "page.en.html");
        touch(dir.path(), "page.fr.html");

        let prefs = ClientPreferences::from_headers(Some("text/html"), Some("fr, en;q=0.5"), None);
        let variant = found(resource(&dir).get("/page", None, &prefs).unwrap());

        assert_eq!(variant.path, dir.path().join("page.fr.html"));
        assert_eq!(variant.variant.location.as_deref(), Some("/page.fr.html"));
    }

    #[test]
    fn test_requested_extension_restricts_variants() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "doc.html");
        touch(dir.path(), "doc.txt");

        let prefs = ClientPreferences::from_headers(Some("text/plain"), None, None);
        let outcome = resource(&dir).get("/doc.html", None, &prefs).unwrap();

        assert_eq!(outcome, DirectoryOutcome::NotAcceptable);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let outcome = resource(&dir)
            .get("/nothing", None, &ClientPreferences::default())
            .unwrap();

        assert_eq!(outcome, DirectoryOutcome::NotFound);
    }

    #[test]
    fn test_directory_redirect_keeps_query() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();

        let outcome = resource(&dir)
            .get("/docs", Some("x=1"), &ClientPreferences::default())
            .unwrap();

        assert_eq!(outcome, DirectoryOutcome::Redirect("/docs/?x=1".to_string()));
    }

    #[test]
    fn test_redirect_encodes_directory_names() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("my docs")).unwrap();
        fs::create_dir(dir.path().join("café")).unwrap();

        let outcome = resource(&dir)
            .get("/my%20docs", None, &ClientPreferences::default())
            .unwrap();
        assert_eq!(outcome, DirectoryOutcome::Redirect("/my%20docs/".to_string()));

        let outcome = resource(&dir)
            .get("/caf%C3%A9", Some("lang=fr"), &ClientPreferences::default())
            .unwrap();
        assert_eq!(outcome, DirectoryOutcome::Redirect("/caf%C3%A9/?lang=fr".to_string()));
    }

    #[test]
    fn test_locations_are_encoded() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("my docs")).unwrap();
        touch(&dir.path().join("my docs"), "read me.en.html");

        let variant = found(
            resource(&dir)
                .get("/my%20docs/read%20me", None, &ClientPreferences::default())
                .unwrap(),
        );

        assert_eq!(variant.path, dir.path().join("my docs").join("read me.en.html"));
        assert_eq!(
            variant.variant.location.as_deref(),
            Some("/my%20docs/read%20me.en.html")
        );
    }

    #[test]
    fn test_listing_encodes_names() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("café")).unwrap();
        touch(&dir.path().join("café"), "a b.txt");
        fs::create_dir(dir.path().join("café").join("x y")).unwrap();

        let mut config = DirectoryConfig::new(dir.path().to_path_buf());
        config.listing_allowed = true;
        let resource = DirectoryResource::from_config(&config, Negotiator::default()).unwrap();

        let outcome = resource
            .get("/caf%C3%A9/", None, &ClientPreferences::default())
            .unwrap();
        assert_eq!(
            outcome,
            DirectoryOutcome::Listing(vec![
                "/caf%C3%A9/a%20b.txt".to_string(),
                "/caf%C3%A9/x%20y/".to_string(),
            ])
        );
    }

    #[test]
    fn test_directory_index() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        touch(&dir.path().join("docs"), "index.html");

        let variant = found(
            resource(&dir)
                .get("/docs/", None, &ClientPreferences::default())
                .unwrap(),
        );

        assert_eq!(variant.variant.media_type, Some(MediaType::text_html()));
        assert_eq!(variant.variant.location.as_deref(), Some("/docs/index.html"));
    }

    #[test]
    fn test_directory_listing() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        touch(dir.path(), "b.txt");
        touch(dir.path(), "a.txt");

        let mut config = DirectoryConfig::new(dir.path().to_path_buf());
        config.listing_allowed = true;
        let resource = DirectoryResource::from_config(&config, Negotiator::default()).unwrap();

        let outcome = resource.get("/", None, &ClientPreferences::default()).unwrap();
        assert_eq!(
            outcome,
            DirectoryOutcome::Listing(vec![
                "/a.txt".to_string(),
                "/b.txt".to_string(),
                "/sub/".to_string(),
            ])
        );
    }

    #[test]
    fn test_multiple_choices_without_negotiation() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "page.fr.html");
        touch(dir.path(), "page.en.html");

        let mut config = DirectoryConfig::new(dir.path().to_path_buf());
        config.negotiate_content = false;
        let resource = DirectoryResource::from_config(&config, Negotiator::default()).unwrap();

        let outcome = resource.get("/page", None, &ClientPreferences::default()).unwrap();
        assert_eq!(
            outcome,
            DirectoryOutcome::MultipleChoices(vec![
                "/page.en.html".to_string(),
                "/page.fr.html".to_string(),
            ])
        );
    }

    #[test]
    fn test_single_variant_without_negotiation() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "page.html");

        let mut config = DirectoryConfig::new(dir.path().to_path_buf());
        config.negotiate_content = false;
        let resource = DirectoryResource::from_config(&config, Negotiator::default()).unwrap();

        let variant = found(resource.get("/page", None, &ClientPreferences::default()).unwrap());
        assert_eq!(variant.path, dir.path().join("page.html"));
    }

    #[test]
    fn test_not_deeply_accessible() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        touch(&dir.path().join("sub"), "file.txt");
        touch(dir.path(), "top.txt");

        let mut config = DirectoryConfig::new(dir.path().to_path_buf());
        config.deeply_accessible = false;
        let resource = DirectoryResource::from_config(&config, Negotiator::default()).unwrap();
        let prefs = ClientPreferences::default();

        assert_eq!(resource.get("/sub/file.txt", None, &prefs).unwrap(), DirectoryOutcome::NotFound);
        assert!(matches!(
            resource.get("/top.txt", None, &prefs).unwrap(),
            DirectoryOutcome::Found(_)
        ));
    }

    #[test]
    fn test_traversal_stays_in_root() {
        let outer = TempDir::new().unwrap();
        let root = outer.path().join("root");
        fs::create_dir(&root).unwrap();
        touch(outer.path(), "secret.txt");

        let config = DirectoryConfig::new(root);
        let resource = DirectoryResource::from_config(&config, Negotiator::default()).unwrap();

        let outcome = resource
            .get("/../secret.txt", None, &ClientPreferences::default())
            .unwrap();
        assert_eq!(outcome, DirectoryOutcome::NotFound);
    }

    #[test]
    fn test_default_language_wins_for_unknown_preferences() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "home.de.html");
        touch(dir.path(), "home.en.html");

        let mut config = DirectoryConfig::new(dir.path().to_path_buf());
        config.default_language = Some("en".to_string());
        let resource = DirectoryResource::from_config(&config, Negotiator::default()).unwrap();

        let prefs = ClientPreferences::from_headers(None, Some("ja"), None);
        let variant = found(resource.get("/home", None, &prefs).unwrap());
        assert_eq!(variant.path, dir.path().join("home.en.html"));
    }
}
