use crate::firestore::model::DocumentKey;
use crate::firestore::value::FirestoreValue;

use super::reference::CollectionReference;

/// Which documents a query scans before filters are applied.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryScope {
    /// Direct children of one collection.
    Collection(CollectionReference),
    /// Every document in the database, regardless of nesting. Subtree selection is then done
    /// with range filters on an indexed string field.
    AllDocuments,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    ArrayContains,
    In,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldFilter {
    field: String,
    operator: FilterOperator,
    value: FirestoreValue,
}

impl FieldFilter {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: FirestoreValue) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> FilterOperator {
        self.operator
    }

    pub fn value(&self) -> &FirestoreValue {
        &self.value
    }
}

/// A scoped set of field filters executed by a [`RemoteStore`](crate::firestore::remote::RemoteStore).
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    scope: QueryScope,
    filters: Vec<FieldFilter>,
}

impl Query {
    pub fn collection(collection: CollectionReference) -> Self {
        Self {
            scope: QueryScope::Collection(collection),
            filters: Vec::new(),
        }
    }

    pub fn all_documents() -> Self {
        Self {
            scope: QueryScope::AllDocuments,
            filters: Vec::new(),
        }
    }

    /// Adds a filter; all filters of a query must hold for a document to match.
    pub fn where_field(
        mut self,
        field: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<FirestoreValue>,
    ) -> Self {
        self.filters.push(FieldFilter::new(field, operator, value.into()));
        self
    }

    pub fn scope(&self) -> &QueryScope {
        &self.scope
    }

    pub fn filters(&self) -> &[FieldFilter] {
        &self.filters
    }

    pub(crate) fn matches_scope(&self, key: &DocumentKey) -> bool {
        match &self.scope {
            QueryScope::Collection(collection) => &key.collection_path() == collection.path(),
            QueryScope::AllDocuments => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_scope_matches_direct_children_only() {
        let collection = CollectionReference::from_string("acct1").unwrap();
        let query = Query::collection(collection);
        assert!(query.matches_scope(&DocumentKey::from_string("acct1/profile").unwrap()));
        assert!(!query.matches_scope(&DocumentKey::from_string("acct1/profile/children/n1").unwrap()));
        assert!(!query.matches_scope(&DocumentKey::from_string("acct2/profile").unwrap()));
    }

    #[test]
    fn builder_accumulates_filters() {
        let query = Query::all_documents()
            .where_field("path", FilterOperator::GreaterThanOrEqual, "acct1")
            .where_field("type", FilterOperator::Equal, "Profile");
        assert_eq!(query.filters().len(), 2);
        assert_eq!(query.filters()[1].field(), "type");
        assert!(query.matches_scope(&DocumentKey::from_string("a/b/c/d").unwrap()));
    }
}
