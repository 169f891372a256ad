//! Representation metadata: languages, media types, character sets
//!
//! Also holds the [`MetadataService`] mapping file extensions to metadata,
//! used by directory variant discovery.

mod charset;
mod language;
mod media_type;
mod preference;
mod service;
mod variant;

pub use charset::CharacterSet;
pub use language::Language;
pub use media_type::{MediaType, Parameter};
pub use preference::Preference;
pub use service::{Metadata, MetadataService};
pub use variant::Variant;

/// Wildcard token used by every "all values" range
pub const WILDCARD: &str = "*";
