//! The static declaration of namespaces and their collections.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Characters MongoDB refuses in database names.
const FORBIDDEN_NAMESPACE_CHARS: &[char] = &[
    '/', '\\', '.', '"', '$', '*', '<', '>', ':', '|', '?', ' ', '\0',
];
const MAX_NAMESPACE_LEN: usize = 63;

const BEFORE_DOMAIN_CHANGE: &[&str] = &[
    "China-Mobile-DNSPoisoning",
    "China-Mobile-GFWLocation",
    "China-Mobile-IPBlocking",
    "China-Telecom-IPBlocking",
    "UCDavis-CompareGroup-DNSPoisoning",
    "UCDavis-CompareGroup-GFWLocation",
    "UCDavis-CompareGroup-IPBlocking",
];

const AFTER_DOMAIN_CHANGE: &[&str] = &[
    "China-Mobile-DNSPoisoning",
    "China-Mobile-GFWLocation",
    "China-Telecom-DNSPoisoning",
    "China-Telecom-GFWLocation",
    "China-Telecom-IPBlocking",
    "UCDavis-Server-GFWLocation",
    "UCDavis-Server-IPBlocking",
    "UCDavis-Server-DNSPoisoning",
];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ManifestError {
    #[error("manifest declares no namespaces")]
    Empty,

    #[error("invalid namespace name '{name}': {reason}")]
    InvalidNamespace { name: String, reason: &'static str },

    #[error("namespace '{0}' is declared more than once")]
    DuplicateNamespace(String),

    #[error("invalid collection name '{name}' in namespace '{namespace}': {reason}")]
    InvalidCollection {
        namespace: String,
        name: String,
        reason: &'static str,
    },

    #[error("collection '{name}' is declared more than once in namespace '{namespace}'")]
    DuplicateCollection { namespace: String, name: String },

    #[error("failed to read manifest file: {0}")]
    Load(String),
}

/// One namespace and the collections it must contain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceEntry {
    pub name: String,
    #[serde(default)]
    pub collections: Vec<String>,
}

impl NamespaceEntry {
    pub fn new<I, S>(name: impl Into<String>, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            collections: collections.into_iter().map(Into::into).collect(),
        }
    }
}

/// Ordered namespace → collections table.
///
/// Declaration order is kept so repeated runs create collections in the same
/// sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "namespace", default)]
    pub namespaces: Vec<NamespaceEntry>,
}

impl Manifest {
    pub fn new(namespaces: Vec<NamespaceEntry>) -> Result<Self, ManifestError> {
        let manifest = Self { namespaces };
        manifest.validate()?;
        Ok(manifest)
    }

    /// The measurement databases before and after the domain change.
    pub fn builtin() -> Self {
        Self {
            namespaces: vec![
                NamespaceEntry::new("BeforeDomainChange", BEFORE_DOMAIN_CHANGE.iter().copied()),
                NamespaceEntry::new("AfterDomainChange", AFTER_DOMAIN_CHANGE.iter().copied()),
            ],
        }
    }

    /// Load a manifest from a TOML file of `[[namespace]]` tables.
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let cfg = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .build()
            .map_err(|e| ManifestError::Load(format!("{}: {e}", path.display())))?;

        let manifest: Manifest = cfg
            .try_deserialize()
            .map_err(|e| ManifestError::Load(format!("{}: {e}", path.display())))?;

        manifest.validate()?;
        Ok(manifest)
    }

    /// Resolve the manifest to use: the file at `path` if given, else the
    /// built-in table.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ManifestError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::builtin()),
        }
    }

    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.namespaces.is_empty() {
            return Err(ManifestError::Empty);
        }

        let mut seen_namespaces = HashSet::new();
        for namespace in &self.namespaces {
            validate_namespace_name(&namespace.name)?;
            if !seen_namespaces.insert(namespace.name.as_str()) {
                return Err(ManifestError::DuplicateNamespace(namespace.name.clone()));
            }

            let mut seen_collections = HashSet::new();
            for collection in &namespace.collections {
                validate_collection_name(&namespace.name, collection)?;
                if !seen_collections.insert(collection.as_str()) {
                    return Err(ManifestError::DuplicateCollection {
                        namespace: namespace.name.clone(),
                        name: collection.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn namespace(&self, name: &str) -> Option<&NamespaceEntry> {
        self.namespaces.iter().find(|ns| ns.name == name)
    }

    /// Total number of (namespace, collection) pairs.
    pub fn collection_count(&self) -> usize {
        self.namespaces.iter().map(|ns| ns.collections.len()).sum()
    }
}

fn validate_namespace_name(name: &str) -> Result<(), ManifestError> {
    let invalid = |reason| ManifestError::InvalidNamespace {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.len() > MAX_NAMESPACE_LEN {
        return Err(invalid("name is longer than 63 bytes"));
    }
    if name.contains(FORBIDDEN_NAMESPACE_CHARS) {
        return Err(invalid("name contains a forbidden character"));
    }
    Ok(())
}

fn validate_collection_name(namespace: &str, name: &str) -> Result<(), ManifestError> {
    let invalid = |reason| ManifestError::InvalidCollection {
        namespace: namespace.to_string(),
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.contains(['$', '\0']) {
        return Err(invalid("name contains '$' or NUL"));
    }
    if name.starts_with("system.") {
        return Err(invalid("the 'system.' prefix is reserved"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn builtin_manifest_is_valid() {
        let manifest = Manifest::builtin();
        manifest.validate().unwrap();
        assert_eq!(manifest.namespaces.len(), 2);
        assert_eq!(manifest.collection_count(), 15);
        assert_eq!(
            manifest.namespace("BeforeDomainChange").unwrap().collections[0],
            "China-Mobile-DNSPoisoning"
        );
    }

    #[test]
    fn same_collection_in_two_namespaces_is_allowed() {
        let manifest = Manifest::new(vec![
            NamespaceEntry::new("BeforeDomainChange", ["A"]),
            NamespaceEntry::new("AfterDomainChange", ["A"]),
        ]);
        assert!(manifest.is_ok());
    }

    #[test]
    fn rejects_empty_manifest() {
        assert_eq!(Manifest::new(vec![]), Err(ManifestError::Empty));
    }

    #[test]
    fn rejects_duplicate_namespace() {
        let result = Manifest::new(vec![
            NamespaceEntry::new("BeforeDomainChange", ["A"]),
            NamespaceEntry::new("BeforeDomainChange", ["B"]),
        ]);
        assert_eq!(
            result,
            Err(ManifestError::DuplicateNamespace(
                "BeforeDomainChange".to_string()
            ))
        );
    }

    #[test]
    fn rejects_duplicate_collection() {
        let result = Manifest::new(vec![NamespaceEntry::new("BeforeDomainChange", ["A", "A"])]);
        assert!(matches!(
            result,
            Err(ManifestError::DuplicateCollection { ref name, .. }) if name == "A"
        ));
    }

    #[test]
    fn rejects_bad_names() {
        for bad in ["", "has.dot", "has space", "a/b"] {
            let result = Manifest::new(vec![NamespaceEntry::new(bad, ["A"])]);
            assert!(
                matches!(result, Err(ManifestError::InvalidNamespace { .. })),
                "namespace {bad:?} should be rejected"
            );
        }

        for bad in ["", "$cmd", "system.users"] {
            let result = Manifest::new(vec![NamespaceEntry::new("Ok", [bad])]);
            assert!(
                matches!(result, Err(ManifestError::InvalidCollection { .. })),
                "collection {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn loads_from_toml_file() {
        let path = std::env::temp_dir().join(format!(
            "provision-manifest-{}.toml",
            std::process::id()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[[namespace]]\nname = \"BeforeDomainChange\"\ncollections = [\"A\", \"B\", \"C\"]"
        )
        .unwrap();
        drop(file);

        let manifest = Manifest::resolve(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(
            manifest,
            Manifest {
                namespaces: vec![NamespaceEntry::new("BeforeDomainChange", ["A", "B", "C"])]
            }
        );
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let result = Manifest::from_file(Path::new("/nonexistent/manifest.toml"));
        assert!(matches!(result, Err(ManifestError::Load(_))));
    }
}
