// Document types - the caller-side contract for typed documents

use crate::schema::SchemaDescriptor;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A document type with a fixed storage namespace and index schema.
///
/// The type name is stated explicitly rather than taken from the Rust type
/// name, so renaming a struct never moves its data.
pub trait DocumentType: Serialize + DeserializeOwned {
    /// Name the keyspace and index name derive from (lowercased).
    const TYPE_NAME: &'static str;

    /// Field mappings used to build the search index.
    fn schema() -> SchemaDescriptor;
}

/// A search result: the logical id and its decoded document.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit<T> {
    pub id: String,
    pub document: T,
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults<T> {
    /// Total matches reported by the store. A hint only: it can disagree with
    /// `hits` under concurrent writes or when entries fail to decode.
    pub total: u64,
    pub hits: Vec<SearchHit<T>>,
}

impl<T> SearchResults<T> {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.id.as_str()).collect()
    }

    pub fn into_documents(self) -> Vec<T> {
        self.hits.into_iter().map(|h| h.document).collect()
    }
}
