//! Directory resource
//!
//! Maps request paths to files under a root and picks among the variants
//! a base name has on disk (`page.en.html`, `page.fr.html`, ...).

mod resolve;
mod resource;

pub use resolve::{encode_path, resolve_target, Target};
pub use resource::{DirectoryOutcome, DirectoryResource, DirectoryVariant};
