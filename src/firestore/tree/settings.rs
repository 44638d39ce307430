use crate::firestore::error::{invalid_argument, FirestoreResult};

use super::metadata::{DEFAULT_LEDGER_COLLECTION, DEFAULT_METADATA_NAME};

pub const DEFAULT_CHILDREN_COLLECTION: &str = "children";

/// Names the tree database uses in the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeDatabaseSettings {
    ledger_collection: String,
    children_collection: String,
    default_metadata_name: String,
}

impl Default for TreeDatabaseSettings {
    fn default() -> Self {
        Self {
            ledger_collection: DEFAULT_LEDGER_COLLECTION.to_string(),
            children_collection: DEFAULT_CHILDREN_COLLECTION.to_string(),
            default_metadata_name: DEFAULT_METADATA_NAME.to_string(),
        }
    }
}

impl TreeDatabaseSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Top-level collection holding one ledger record per root.
    pub fn ledger_collection(&self) -> &str {
        &self.ledger_collection
    }

    /// Sub-collection under each document that holds its child nodes.
    pub fn children_collection(&self) -> &str {
        &self.children_collection
    }

    pub fn default_metadata_name(&self) -> &str {
        &self.default_metadata_name
    }

    pub fn with_ledger_collection(mut self, name: impl Into<String>) -> Self {
        self.ledger_collection = name.into();
        self
    }

    pub fn with_children_collection(mut self, name: impl Into<String>) -> Self {
        self.children_collection = name.into();
        self
    }

    pub fn with_default_metadata_name(mut self, name: impl Into<String>) -> Self {
        self.default_metadata_name = name.into();
        self
    }

    pub fn validate(&self) -> FirestoreResult<()> {
        for (label, value) in [
            ("ledger collection", &self.ledger_collection),
            ("children collection", &self.children_collection),
        ] {
            if value.is_empty() || value.contains('/') {
                return Err(invalid_argument(format!(
                    "The {label} must be a single non-empty segment, got '{value}'"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_overrides() {
        let settings = TreeDatabaseSettings::default();
        assert_eq!(settings.ledger_collection(), "metadata");
        assert_eq!(settings.children_collection(), "children");
        assert!(settings.validate().is_ok());

        let settings = settings
            .with_ledger_collection("ledger")
            .with_children_collection("nodes")
            .with_default_metadata_name("tree metadata");
        assert_eq!(settings.ledger_collection(), "ledger");
        assert_eq!(settings.children_collection(), "nodes");
        assert_eq!(settings.default_metadata_name(), "tree metadata");
    }

    #[test]
    fn rejects_nested_names() {
        assert!(TreeDatabaseSettings::new()
            .with_children_collection("a/b")
            .validate()
            .is_err());
        assert!(TreeDatabaseSettings::new().with_ledger_collection("").validate().is_err());
    }
}
