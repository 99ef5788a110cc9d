//! Document store seam.
//!
//! Collections are addressed by name and hold raw BSON documents. Filters
//! are field-equality documents (dotted paths allowed); updates use the
//! `$set` / `$unset` / `$push` / `$pull` / `$addToSet` / `$inc` operators.

use anyhow::Result;
use async_trait::async_trait;
use mongodb::bson::Document;

/// Result of an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
    /// A new document was inserted by upsert.
    pub upserted: bool,
}

/// Which version of the document `find_one_and_update` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnDocument {
    Before,
    After,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_one(&self, collection: &str, filter: Document) -> Result<Option<Document>>;

    /// Iterate every matching document to exhaustion.
    async fn find_many(&self, collection: &str, filter: Document) -> Result<Vec<Document>>;

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<UpdateOutcome>;

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<UpdateOutcome>;

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
        returning: ReturnDocument,
    ) -> Result<Option<Document>>;

    async fn find_one_and_delete(&self, collection: &str, filter: Document)
    -> Result<Option<Document>>;

    /// Returns the number of deleted documents.
    async fn delete_many(&self, collection: &str, filter: Document) -> Result<u64>;

    async fn count(&self, collection: &str, filter: Document) -> Result<u64>;

    /// Release the connection. Calls after close may fail.
    async fn close(&self);
}
