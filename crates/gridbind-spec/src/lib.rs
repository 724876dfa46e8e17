//! Declarative binding model for gridbind.
//!
//! A [`TypeBinding`] says which property of a mapped type occupies which cell
//! and where each collection starts. Bindings are plain data: they can be built
//! in code or loaded from a versioned YAML/JSON [`BindingManifest`]. Resolving
//! them against a concrete Rust type happens in `gridbind-core`.

mod binding;
mod manifest;
mod validation;

pub use binding::{CollectionSpec, DEFAULT_SHEET, Layout, PropertySpec, TypeBinding};
pub use manifest::{BindingManifest, CURRENT_MANIFEST_VERSION};
pub use validation::{ManifestError, ManifestIssue, ValidationError};
