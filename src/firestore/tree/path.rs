//! Logical tree paths and their mapping onto store references.
//!
//! A logical path is a `/`-separated list of tokens. The first token is the root id: it names
//! both the root's ledger record and the top-level collection holding that root's nodes. The
//! tokens after it alternate document and collection ids, so `acct1/profile` is a document,
//! `acct1/profile/children` a collection and `acct1/profile/children/n1` a document again.

use crate::firestore::api::{CollectionReference, DocumentReference};
use crate::firestore::error::{invalid_argument, FirestoreResult};

const SEPARATOR: char = '/';

/// Splits `path` into its tokens, rejecting empty paths and empty tokens.
pub fn tokens(path: &str) -> FirestoreResult<Vec<&str>> {
    if path.is_empty() {
        return Err(invalid_argument("Tree path must not be empty"));
    }
    let tokens: Vec<&str> = path.split(SEPARATOR).collect();
    if tokens.iter().any(|token| token.is_empty()) {
        return Err(invalid_argument(format!(
            "Tree path '{path}' contains an empty segment"
        )));
    }
    Ok(tokens)
}

/// First token of `path`.
pub fn root_id(path: &str) -> FirestoreResult<&str> {
    Ok(tokens(path)?[0])
}

/// Everything before the last separator; a single-token path is its own parent.
pub fn parent_path(path: &str) -> &str {
    path.rsplit_once(SEPARATOR)
        .map(|(parent, _)| parent)
        .unwrap_or(path)
}

/// Synthetic ledger key tracking every node of one type under a root.
pub fn all_type_key(node_type: &str) -> String {
    format!("all{node_type}")
}

/// Read-timestamp key of [`all_type_key`] for one root.
///
/// Every root stamps its own `all<Type>` entry, so the local read time has to be kept per root
/// too. The empty segment keeps the key apart from every valid logical path.
pub fn type_read_key(root_id: &str, node_type: &str) -> String {
    format!("{root_id}{SEPARATOR}{SEPARATOR}{}", all_type_key(node_type))
}

/// Smallest string greater than every string that has `value` as a prefix, for the tail
/// characters in use. Used as the exclusive upper bound of a prefix range scan.
pub fn next_alphabetic_string(value: &str) -> String {
    let mut chars: Vec<char> = value.chars().collect();
    match chars.pop() {
        None => String::new(),
        Some(last) => {
            let mut next = last as u32 + 1;
            // Skip the surrogate block, which has no char values.
            if (0xD800..=0xDFFF).contains(&next) {
                next = 0xE000;
            }
            match char::from_u32(next) {
                Some(bumped) => chars.push(bumped),
                None => {
                    chars.push(last);
                    chars.push(char::MAX);
                }
            }
            chars.into_iter().collect()
        }
    }
}

/// Whether the tokens after the root address a document (odd count).
pub fn is_document_path(path: &str) -> FirestoreResult<bool> {
    Ok((tokens(path)?.len() - 1) % 2 == 1)
}

/// Maps logical paths to store references, honouring the configured collection names.
#[derive(Clone, Debug)]
pub struct PathResolver {
    ledger_collection: String,
    children_collection: String,
}

impl PathResolver {
    pub fn new(ledger_collection: impl Into<String>, children_collection: impl Into<String>) -> Self {
        Self {
            ledger_collection: ledger_collection.into(),
            children_collection: children_collection.into(),
        }
    }

    pub fn ledger_collection(&self) -> &str {
        &self.ledger_collection
    }

    pub fn children_collection(&self) -> &str {
        &self.children_collection
    }

    /// Validates `path` and returns its root id.
    pub fn root_of<'a>(&self, path: &'a str) -> FirestoreResult<&'a str> {
        let root = root_id(path)?;
        self.validate_root(root)?;
        Ok(root)
    }

    pub fn validate_root(&self, root: &str) -> FirestoreResult<()> {
        if root.is_empty() || root.contains(SEPARATOR) {
            return Err(invalid_argument(format!("Invalid root id '{root}'")));
        }
        if root == self.ledger_collection {
            return Err(invalid_argument(format!(
                "Root id '{root}' collides with the metadata collection"
            )));
        }
        Ok(())
    }

    pub fn resolve_document(&self, path: &str) -> FirestoreResult<DocumentReference> {
        self.root_of(path)?;
        if !is_document_path(path)? {
            return Err(invalid_argument(format!(
                "Tree path '{path}' does not address a document"
            )));
        }
        DocumentReference::from_string(path)
    }

    pub fn resolve_collection(&self, path: &str) -> FirestoreResult<CollectionReference> {
        self.root_of(path)?;
        if is_document_path(path)? {
            return Err(invalid_argument(format!(
                "Tree path '{path}' does not address a collection"
            )));
        }
        CollectionReference::from_string(path)
    }

    /// Collection holding the children of `path`: the `children` sub-collection of a document,
    /// or the collection itself.
    pub fn children_path(&self, path: &str) -> FirestoreResult<String> {
        self.root_of(path)?;
        if is_document_path(path)? {
            Ok(format!("{path}{SEPARATOR}{}", self.children_collection))
        } else {
            Ok(path.to_string())
        }
    }
}
