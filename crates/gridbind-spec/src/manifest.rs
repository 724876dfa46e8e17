use std::collections::HashSet;
use std::path::Path;

use gridbind_common::CellRef;
use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::binding::{Layout, TypeBinding};
use crate::validation::{ManifestError, ManifestIssue, ValidationError};

/// Manifest format version understood by this crate.
pub const CURRENT_MANIFEST_VERSION: &str = "1.0.0";

static IDENT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex must compile")
});

static TYPE_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(::[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("type name regex must compile")
});

/// A versioned document holding bindings for several types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BindingManifest {
    pub version: String,
    #[serde(default)]
    pub types: Vec<TypeBinding>,
}

impl BindingManifest {
    pub fn new(types: Vec<TypeBinding>) -> Self {
        Self {
            version: CURRENT_MANIFEST_VERSION.to_string(),
            types,
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ManifestError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from disk, choosing JSON for `.json` files and YAML otherwise.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_yaml_str(&text),
        }
    }

    pub fn to_yaml(&self) -> Result<String, ManifestError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Locate the binding for a type by name.
    pub fn binding_for(&self, type_name: &str) -> Option<&TypeBinding> {
        self.types.iter().find(|t| t.type_name == type_name)
    }

    /// Validate the whole manifest, collecting every issue instead of stopping at the first.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        match Version::parse(&self.version) {
            Ok(version) => {
                let current = Version::parse(CURRENT_MANIFEST_VERSION)
                    .expect("CURRENT_MANIFEST_VERSION must be valid semver");
                if version.major != current.major {
                    issues.push(ManifestIssue::new(
                        "version",
                        format!(
                            "incompatible major version `{}` (expected `{}`)",
                            version, current.major
                        ),
                    ));
                }
            }
            Err(err) => issues.push(ManifestIssue::new(
                "version",
                format!("`{}` is not a semantic version: {err}", self.version),
            )),
        }

        let mut seen_types = HashSet::new();
        for (idx, binding) in self.types.iter().enumerate() {
            let prefix = format!("types[{idx}]");
            if !seen_types.insert(binding.type_name.as_str()) {
                issues.push(ManifestIssue::new(
                    format!("{prefix}.type"),
                    format!("duplicate binding for type `{}`", binding.type_name),
                ));
            }
            collect_binding_issues(binding, &prefix, &mut issues);
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(issues))
        }
    }
}

impl TypeBinding {
    /// Syntactic checks for a single binding. Semantic resolution against the
    /// mapped type happens when the binding is compiled.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();
        collect_binding_issues(self, "binding", &mut issues);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(issues))
        }
    }
}

fn collect_binding_issues(binding: &TypeBinding, prefix: &str, issues: &mut Vec<ManifestIssue>) {
    if !TYPE_NAME_PATTERN.is_match(&binding.type_name) {
        issues.push(ManifestIssue::new(
            format!("{prefix}.type"),
            format!("`{}` is not a valid type name", binding.type_name),
        ));
    }
    if binding.sheet.trim().is_empty() {
        issues.push(ManifestIssue::new(
            format!("{prefix}.sheet"),
            "sheet name must not be empty",
        ));
    }

    let mut seen = HashSet::new();
    for (idx, property) in binding.properties.iter().enumerate() {
        let path = format!("{prefix}.properties[{idx}]");
        check_ident(&property.property, &format!("{path}.property"), issues);
        if !seen.insert(property.property.as_str()) {
            issues.push(ManifestIssue::new(
                format!("{path}.property"),
                format!("duplicate binding for property `{}`", property.property),
            ));
        }
        if let Some(cell) = &property.cell {
            check_cell(cell, &format!("{path}.cell"), issues);
        }
    }

    for (idx, collection) in binding.collections.iter().enumerate() {
        let path = format!("{prefix}.collections[{idx}]");
        check_ident(&collection.property, &format!("{path}.property"), issues);
        if !seen.insert(collection.property.as_str()) {
            issues.push(ManifestIssue::new(
                format!("{path}.property"),
                format!("duplicate binding for property `{}`", collection.property),
            ));
        }
        if let Some(start) = &collection.start {
            check_cell(start, &format!("{path}.start"), issues);
        }
        if collection.layout != Layout::Vertical && collection.nested.is_some() {
            issues.push(ManifestIssue::new(
                format!("{path}.layout"),
                format!("nested collections require a vertical layout, found `{}`", collection.layout),
            ));
        }
    }
}

fn check_ident(ident: &str, path: &str, issues: &mut Vec<ManifestIssue>) {
    if !IDENT_PATTERN.is_match(ident) {
        issues.push(ManifestIssue::new(
            path,
            format!("`{ident}` is not a valid property identifier"),
        ));
    }
}

fn check_cell(cell: &str, path: &str, issues: &mut Vec<ManifestIssue>) {
    if let Err(err) = CellRef::parse_a1(cell) {
        issues.push(ManifestIssue::new(path, err.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{CollectionSpec, PropertySpec};

    #[test]
    fn valid_binding_passes() {
        let binding = TypeBinding::new("Person")
            .property("Name", "A1")
            .property("Age", "B1");
        assert!(binding.validate().is_ok());
    }

    #[test]
    fn all_issues_are_reported() {
        let binding = TypeBinding::new("Person")
            .property("Name", "A1")
            .property("Name", "B1")
            .with_property(PropertySpec::new("bad-id").cell("C1"))
            .with_collection(CollectionSpec::vertical("Items", "1A"));
        let err = binding.validate().unwrap_err();
        let paths: Vec<_> = err.issues().iter().map(|i| i.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "binding.properties[1].property",
                "binding.properties[2].property",
                "binding.collections[0].start",
            ]
        );
    }

    #[test]
    fn missing_cells_are_left_to_the_compiler() {
        let binding = TypeBinding::new("Person").with_property(PropertySpec::new("Name"));
        assert!(binding.validate().is_ok());
    }

    #[test]
    fn incompatible_version_rejected() {
        let mut manifest = BindingManifest::new(vec![TypeBinding::new("A")]);
        manifest.version = "2.1.0".into();
        let err = manifest.validate().unwrap_err();
        assert_eq!(err.issues()[0].path, "version");
        manifest.version = "one".into();
        assert!(manifest.validate().is_err());
    }
}
