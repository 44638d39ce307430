use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::firestore::api::DocumentSnapshot;
use crate::firestore::error::{unknown_type, FirestoreResult};
use crate::firestore::model::Timestamp;
use crate::firestore::value::{FirestoreValue, MapValue};

pub const FIELD_ID: &str = "id";
pub const FIELD_NAME: &str = "name";
pub const FIELD_TYPE: &str = "type";
pub const FIELD_CREATION_DATE: &str = "creationDate";
pub const FIELD_LAST_UPDATE: &str = "lastUpdate";
pub const FIELD_PATH: &str = "path";

const HEADER_FIELDS: [&str; 6] = [
    FIELD_ID,
    FIELD_NAME,
    FIELD_TYPE,
    FIELD_CREATION_DATE,
    FIELD_LAST_UPDATE,
    FIELD_PATH,
];

/// Fields shared by every node stored in the tree.
///
/// `path` is the logical path of the collection holding the node, so the node itself lives at
/// [`complete_path`](Self::complete_path).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeHeader {
    pub id: Option<String>,
    pub name: Option<String>,
    pub node_type: Option<String>,
    pub creation_date: Option<Timestamp>,
    pub last_update: Option<Timestamp>,
    pub path: Option<String>,
}

impl NodeHeader {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: Some(node_type.into()),
            ..Default::default()
        }
    }

    /// `path/id`, when both are known.
    pub fn complete_path(&self) -> Option<String> {
        match (&self.path, &self.id) {
            (Some(path), Some(id)) => Some(format!("{path}/{id}")),
            _ => None,
        }
    }

    pub fn is_header_field(field: &str) -> bool {
        HEADER_FIELDS.contains(&field)
    }

    /// Reads the header fields out of a stored document. Missing or mistyped fields stay `None`.
    pub fn from_map(map: &MapValue) -> Self {
        let string = |field: &str| map.get(field).and_then(|value| value.as_str()).map(str::to_string);
        let timestamp = |field: &str| map.get(field).and_then(|value| value.as_timestamp());
        Self {
            id: string(FIELD_ID),
            name: string(FIELD_NAME),
            node_type: string(FIELD_TYPE),
            creation_date: timestamp(FIELD_CREATION_DATE),
            last_update: timestamp(FIELD_LAST_UPDATE),
            path: string(FIELD_PATH),
        }
    }

    pub fn write_into(&self, fields: &mut BTreeMap<String, FirestoreValue>) {
        let mut put = |field: &str, value: Option<FirestoreValue>| match value {
            Some(value) => {
                fields.insert(field.to_string(), value);
            }
            None => {
                fields.remove(field);
            }
        };
        put(FIELD_ID, self.id.clone().map(FirestoreValue::from));
        put(FIELD_NAME, self.name.clone().map(FirestoreValue::from));
        put(FIELD_TYPE, self.node_type.clone().map(FirestoreValue::from));
        put(FIELD_CREATION_DATE, self.creation_date.map(FirestoreValue::from));
        put(FIELD_LAST_UPDATE, self.last_update.map(FirestoreValue::from));
        put(FIELD_PATH, self.path.clone().map(FirestoreValue::from));
    }
}

/// A typed node of the tree: the shared header plus whatever the concrete type carries.
pub trait TreeNode: Clone + Send + Sync + 'static {
    fn header(&self) -> &NodeHeader;

    fn header_mut(&mut self) -> &mut NodeHeader;

    /// Non-header fields to persist.
    fn payload(&self) -> FirestoreResult<BTreeMap<String, FirestoreValue>>;

    fn complete_path(&self) -> Option<String> {
        self.header().complete_path()
    }

    /// Document body written to the store. Header fields take precedence over payload fields
    /// with the same name.
    fn to_map(&self) -> FirestoreResult<MapValue> {
        let mut fields = self.payload()?;
        self.header().write_into(&mut fields);
        Ok(MapValue::new(fields))
    }
}

/// Node without a dedicated Rust type: header plus the remaining fields as stored.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawNode {
    pub header: NodeHeader,
    pub fields: BTreeMap<String, FirestoreValue>,
}

impl RawNode {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            header: NodeHeader::new(node_type),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.header.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.header.name = Some(name.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<FirestoreValue>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&FirestoreValue> {
        self.fields.get(field)
    }

    /// Decoder usable with [`NodeRegistry::register`].
    pub fn decode(header: NodeHeader, map: &MapValue) -> FirestoreResult<Self> {
        let fields = map
            .fields()
            .iter()
            .filter(|(field, _)| !NodeHeader::is_header_field(field))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();
        Ok(Self { header, fields })
    }
}

impl TreeNode for RawNode {
    fn header(&self) -> &NodeHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut NodeHeader {
        &mut self.header
    }

    fn payload(&self) -> FirestoreResult<BTreeMap<String, FirestoreValue>> {
        Ok(self.fields.clone())
    }
}

pub type NodeDecoder<N> = Arc<dyn Fn(NodeHeader, &MapValue) -> FirestoreResult<N> + Send + Sync + 'static>;

/// Maps the stored `type` discriminator to the decoder producing the matching node.
pub struct NodeRegistry<N> {
    decoders: HashMap<String, NodeDecoder<N>>,
}

impl<N> Clone for NodeRegistry<N> {
    fn clone(&self) -> Self {
        Self {
            decoders: self.decoders.clone(),
        }
    }
}

impl<N> Default for NodeRegistry<N> {
    fn default() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }
}

impl<N> fmt::Debug for NodeRegistry<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&String> = self.decoders.keys().collect();
        types.sort();
        f.debug_struct("NodeRegistry").field("types", &types).finish()
    }
}

impl<N: TreeNode> NodeRegistry<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, discriminator: impl Into<String>, decoder: F) -> Self
    where
        F: Fn(NodeHeader, &MapValue) -> FirestoreResult<N> + Send + Sync + 'static,
    {
        self.decoders.insert(discriminator.into(), Arc::new(decoder));
        self
    }

    pub fn knows(&self, discriminator: &str) -> bool {
        self.decoders.contains_key(discriminator)
    }

    pub fn decode_map(&self, map: &MapValue) -> FirestoreResult<N> {
        let header = NodeHeader::from_map(map);
        let discriminator = header.node_type.clone().unwrap_or_default();
        let decoder = self
            .decoders
            .get(&discriminator)
            .ok_or_else(|| unknown_type(&discriminator))?;
        decoder(header, map)
    }

    /// `Ok(None)` for a missing document; `Err` with `firestore/unknown-type` for an unmapped type.
    pub fn decode(&self, snapshot: &DocumentSnapshot) -> FirestoreResult<Option<N>> {
        match snapshot.map_value() {
            Some(map) => self.decode_map(map).map(Some),
            None => Ok(None),
        }
    }
}

impl NodeRegistry<RawNode> {
    /// Registry decoding each of `types` into a [`RawNode`].
    pub fn raw<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        types
            .into_iter()
            .fold(Self::new(), |registry, node_type| registry.register(node_type, RawNode::decode))
    }
}
