use std::collections::BTreeMap;

use crate::firestore::api::generate_auto_id;
use crate::firestore::error::{invalid_argument, FirestoreResult};
use crate::firestore::model::Timestamp;
use crate::firestore::value::{FirestoreValue, MapValue, ValueKind};

use super::node::{NodeHeader, TreeNode};
use super::path::{all_type_key, parent_path};

pub const METADATA_TYPE: &str = "Metadata";
pub const UPDATE_MAP_FIELD: &str = "updateMap";
pub const DEFAULT_LEDGER_COLLECTION: &str = "metadata";
pub const DEFAULT_METADATA_NAME: &str = "metadata";

/// Ledger record of one root: when each tracked path (and each `all<Type>` key) last changed.
#[derive(Clone, Debug, PartialEq)]
pub struct Metadata {
    pub header: NodeHeader,
    pub update_map: BTreeMap<String, Timestamp>,
}

impl Metadata {
    pub fn builder(now: Timestamp) -> MetadataBuilder {
        MetadataBuilder::new(now)
    }

    pub fn last_update_for(&self, key: &str) -> Option<Timestamp> {
        self.update_map.get(key).copied()
    }

    /// Applies one revision: `affected_path` is stamped (or dropped when `is_delete`), its parent
    /// and the type key are stamped, all with the same `now`.
    pub fn apply_stamp(&mut self, affected_path: &str, node_type: Option<&str>, is_delete: bool, now: Timestamp) {
        if let Some(node_type) = node_type {
            self.update_map.insert(all_type_key(node_type), now);
        }
        if is_delete {
            self.update_map.remove(affected_path);
        } else {
            self.update_map.insert(affected_path.to_string(), now);
        }
        self.update_map.insert(parent_path(affected_path).to_string(), now);
    }

    pub fn update_map_value(&self) -> FirestoreValue {
        FirestoreValue::from_map(
            self.update_map
                .iter()
                .map(|(key, stamp)| (key.clone(), FirestoreValue::from(*stamp)))
                .collect(),
        )
    }

    pub fn from_map(map: &MapValue) -> FirestoreResult<Self> {
        let header = NodeHeader::from_map(map);
        let update_map = match map.get(UPDATE_MAP_FIELD).map(|value| value.kind()) {
            None | Some(ValueKind::Null) => BTreeMap::new(),
            Some(ValueKind::Map(entries)) => parse_update_map(entries)?,
            Some(_) => {
                return Err(invalid_argument(format!(
                    "Metadata field '{UPDATE_MAP_FIELD}' must be a map"
                )))
            }
        };
        Ok(Self { header, update_map })
    }
}

fn parse_update_map(entries: &MapValue) -> FirestoreResult<BTreeMap<String, Timestamp>> {
    entries
        .fields()
        .iter()
        .map(|(key, value)| {
            value
                .as_timestamp()
                .map(|stamp| (key.clone(), stamp))
                .ok_or_else(|| invalid_argument(format!("Metadata entry '{key}' is not a timestamp")))
        })
        .collect()
}

impl TreeNode for Metadata {
    fn header(&self) -> &NodeHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut NodeHeader {
        &mut self.header
    }

    fn payload(&self) -> FirestoreResult<BTreeMap<String, FirestoreValue>> {
        Ok(BTreeMap::from([(UPDATE_MAP_FIELD.to_string(), self.update_map_value())]))
    }
}

/// Builds a [`Metadata`] record starting from the ledger defaults.
#[derive(Clone, Debug)]
pub struct MetadataBuilder {
    building: Metadata,
}

impl MetadataBuilder {
    pub fn new(now: Timestamp) -> Self {
        Self {
            building: Metadata {
                header: NodeHeader {
                    id: Some(generate_auto_id()),
                    name: Some(DEFAULT_METADATA_NAME.to_string()),
                    node_type: Some(METADATA_TYPE.to_string()),
                    creation_date: Some(now),
                    last_update: Some(now),
                    path: Some(DEFAULT_LEDGER_COLLECTION.to_string()),
                },
                update_map: BTreeMap::new(),
            },
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.building.header.id = Some(id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.building.header.name = Some(name.into());
        self
    }

    pub fn node_type(mut self, node_type: impl Into<String>) -> Self {
        self.building.header.node_type = Some(node_type.into());
        self
    }

    pub fn creation_date(mut self, creation_date: Timestamp) -> Self {
        self.building.header.creation_date = Some(creation_date);
        self
    }

    pub fn last_update(mut self, last_update: Timestamp) -> Self {
        self.building.header.last_update = Some(last_update);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.building.header.path = Some(path.into());
        self
    }

    pub fn update_map(mut self, update_map: BTreeMap<String, Timestamp>) -> Self {
        self.building.update_map = update_map;
        self
    }

    pub fn build(self) -> Metadata {
        self.building
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let now = Timestamp::from_millis(1_000);
        let metadata = Metadata::builder(now).build();
        assert_eq!(metadata.header.node_type.as_deref(), Some(METADATA_TYPE));
        assert_eq!(metadata.header.path.as_deref(), Some(DEFAULT_LEDGER_COLLECTION));
        assert_eq!(metadata.header.creation_date, Some(now));
        assert_eq!(metadata.header.id.as_ref().map(String::len), Some(20));
        assert!(metadata.update_map.is_empty());
    }

    #[test]
    fn first_profile_write_stamps_three_keys() {
        let t0 = Timestamp::from_millis(42);
        let mut metadata = Metadata::builder(t0).id("acct1").build();
        metadata.apply_stamp("acct1/profile", Some("Profile"), false, t0);
        let expected = BTreeMap::from([
            ("acct1/profile".to_string(), t0),
            ("acct1".to_string(), t0),
            ("allProfile".to_string(), t0),
        ]);
        assert_eq!(metadata.update_map, expected);
    }

    #[test]
    fn delete_removes_path_but_bumps_parent() {
        let t0 = Timestamp::from_millis(1);
        let t1 = Timestamp::from_millis(2);
        let mut metadata = Metadata::builder(t0).build();
        metadata.apply_stamp("acct1/profile/children/n1", Some("Note"), false, t0);
        metadata.apply_stamp("acct1/profile/children/n1", None, true, t1);
        assert_eq!(metadata.last_update_for("acct1/profile/children/n1"), None);
        assert_eq!(metadata.last_update_for("acct1/profile/children"), Some(t1));
        assert_eq!(metadata.last_update_for("allNote"), Some(t0));
    }

    #[test]
    fn survives_store_encoding() {
        let t0 = Timestamp::from_millis(7);
        let mut metadata = Metadata::builder(t0).id("acct1").build();
        metadata.apply_stamp("acct1/profile", Some("Profile"), false, t0);
        let decoded = Metadata::from_map(&metadata.to_map().unwrap()).unwrap();
        assert_eq!(decoded, metadata);
    }

    #[test]
    fn rejects_malformed_update_map() {
        let mut map = MapValue::default();
        map.insert(UPDATE_MAP_FIELD, FirestoreValue::from("oops"));
        assert!(Metadata::from_map(&map).is_err());

        let mut entries = BTreeMap::new();
        entries.insert("acct1".to_string(), FirestoreValue::from(3_i64));
        let mut map = MapValue::default();
        map.insert(UPDATE_MAP_FIELD, FirestoreValue::from_map(entries));
        assert!(Metadata::from_map(&map).is_err());
    }
}
