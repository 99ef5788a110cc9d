//! In-memory [`DocumentStore`] mirroring MongoDB's update-operator semantics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, Document};
use parking_lot::Mutex;

use super::store::{DocumentStore, ReturnDocument, UpdateOutcome};

#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Document>>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every document currently stored in `collection`.
    pub fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.collections
            .lock()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            bail!("store is closed");
        }
        Ok(())
    }

    fn update(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
        upsert: bool,
        many: bool,
    ) -> Result<(UpdateOutcome, Option<Document>, Option<Document>)> {
        self.ensure_open()?;
        let mut collections = self.collections.lock();
        let documents = collections.entry(collection.to_string()).or_default();

        let mut outcome = UpdateOutcome::default();
        let mut before = None;
        let mut after = None;
        for document in documents.iter_mut().filter(|d| matches(d, filter)) {
            let original = document.clone();
            apply_update(document, update)?;
            outcome.matched += 1;
            if *document != original {
                outcome.modified += 1;
            }
            if before.is_none() {
                before = Some(original);
                after = Some(document.clone());
            }
            if !many {
                break;
            }
        }

        if outcome.matched == 0 && upsert {
            let mut document = seed_from_filter(filter)?;
            apply_update(&mut document, update)?;
            if !document.contains_key("_id") {
                document.insert("_id", ObjectId::new());
            }
            after = Some(document.clone());
            documents.push(document);
            outcome.upserted = true;
        }

        Ok((outcome, before, after))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_one(&self, collection: &str, filter: Document) -> Result<Option<Document>> {
        self.ensure_open()?;
        Ok(self
            .collections
            .lock()
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| matches(d, &filter)).cloned()))
    }

    async fn find_many(&self, collection: &str, filter: Document) -> Result<Vec<Document>> {
        self.ensure_open()?;
        Ok(self
            .collections
            .lock()
            .get(collection)
            .map(|docs| docs.iter().filter(|d| matches(d, &filter)).cloned().collect())
            .unwrap_or_default())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<UpdateOutcome> {
        Ok(self.update(collection, &filter, &update, upsert, false)?.0)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<UpdateOutcome> {
        Ok(self.update(collection, &filter, &update, false, true)?.0)
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
        returning: ReturnDocument,
    ) -> Result<Option<Document>> {
        let (_, before, after) = self.update(collection, &filter, &update, upsert, false)?;
        Ok(match returning {
            ReturnDocument::Before => before,
            ReturnDocument::After => after,
        })
    }

    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>> {
        self.ensure_open()?;
        let mut collections = self.collections.lock();
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(None);
        };
        let position = documents.iter().position(|d| matches(d, &filter));
        Ok(position.map(|index| documents.remove(index)))
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> Result<u64> {
        self.ensure_open()?;
        let mut collections = self.collections.lock();
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = documents.len();
        documents.retain(|d| !matches(d, &filter));
        Ok((before - documents.len()) as u64)
    }

    async fn count(&self, collection: &str, filter: Document) -> Result<u64> {
        Ok(self.find_many(collection, filter).await?.len() as u64)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

/// Equality with numeric widening, as the server compares numbers.
fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    match path.split_once('.') {
        None => document.get(path),
        Some((head, rest)) => match document.get(head)? {
            Bson::Document(inner) => lookup(inner, rest),
            _ => None,
        },
    }
}

fn lookup_mut<'a>(document: &'a mut Document, path: &str) -> Option<&'a mut Bson> {
    match path.split_once('.') {
        None => document.get_mut(path),
        Some((head, rest)) => match document.get_mut(head)? {
            Bson::Document(inner) => lookup_mut(inner, rest),
            _ => None,
        },
    }
}

fn matches(document: &Document, filter: &Document) -> bool {
    filter.iter().all(|(path, expected)| match lookup(document, path) {
        Some(Bson::Array(items)) if !matches!(expected, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(item, expected))
        }
        Some(actual) => values_equal(actual, expected),
        None => matches!(expected, Bson::Null),
    })
}

fn set_path(document: &mut Document, path: &str, value: Bson) -> Result<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, Document::new());
            }
            let inner = document
                .get_document_mut(head)
                .map_err(|_| anyhow!("cannot create field '{rest}' in non-document '{head}'"))?;
            set_path(inner, rest, value)
        }
    }
}

fn remove_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Ok(inner) = document.get_document_mut(head) {
                remove_path(inner, rest);
            }
        }
    }
}

fn array_at<'a>(document: &'a mut Document, path: &str) -> Result<&'a mut Vec<Bson>> {
    if lookup(document, path).is_none() {
        set_path(document, path, Bson::Array(Vec::new()))?;
    }
    match lookup_mut(document, path) {
        Some(Bson::Array(items)) => Ok(items),
        _ => Err(anyhow!("field '{path}' is not an array")),
    }
}

fn increment(current: Option<&Bson>, by: &Bson) -> Result<Bson> {
    Ok(match (current.unwrap_or(&Bson::Int32(0)), by) {
        (Bson::Int32(a), Bson::Int32(b)) => Bson::Int32(a + b),
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(i64::from(*a) + b),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a + i64::from(*b)),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a + b),
        (a, b) => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => Bson::Double(x + y),
            _ => bail!("cannot $inc non-numeric values"),
        },
    })
}

fn apply_update(document: &mut Document, update: &Document) -> Result<()> {
    for (operator, spec) in update {
        let Bson::Document(fields) = spec else {
            bail!("{operator} expects a document");
        };
        for (path, value) in fields {
            match operator.as_str() {
                "$set" => set_path(document, path, value.clone())?,
                "$unset" => remove_path(document, path),
                "$push" => array_at(document, path)?.push(value.clone()),
                "$addToSet" => {
                    let items = array_at(document, path)?;
                    if !items.iter().any(|item| values_equal(item, value)) {
                        items.push(value.clone());
                    }
                }
                "$pull" => {
                    if let Some(Bson::Array(items)) = lookup_mut(document, path) {
                        items.retain(|item| !values_equal(item, value));
                    }
                }
                "$inc" => {
                    let next = increment(lookup(document, path), value)?;
                    set_path(document, path, next)?;
                }
                other => bail!("unsupported update operator {other}"),
            }
        }
    }
    Ok(())
}

/// Equality fields of the filter become the upserted document's base.
fn seed_from_filter(filter: &Document) -> Result<Document> {
    let mut document = Document::new();
    for (path, value) in filter {
        if !path.starts_with('$') {
            set_path(&mut document, path, value.clone())?;
        }
    }
    Ok(document)
}

#[cfg(test)]
mod tests {
    use mongodb::bson::doc;

    use super::*;

    #[tokio::test]
    async fn test_upsert_seeds_from_filter() {
        let store = MemoryStore::new();
        let outcome = store
            .update_one("RULES", doc! { "chat_id": -100_i64 }, doc! { "$set": { "rules": "be nice" } }, true)
            .await
            .unwrap();
        assert!(outcome.upserted);

        let stored = store.find_one("RULES", doc! { "chat_id": -100_i64 }).await.unwrap().unwrap();
        assert_eq!(stored.get_str("rules").unwrap(), "be nice");
        assert!(stored.contains_key("_id"));
    }

    #[tokio::test]
    async fn test_push_pull_add_to_set_unset() {
        let store = MemoryStore::new();
        let filter = doc! { "chat_id": 1_i64 };
        store.update_one("C", filter.clone(), doc! { "$push": { "ids": 5 } }, true).await.unwrap();
        store.update_one("C", filter.clone(), doc! { "$push": { "ids": 5 } }, false).await.unwrap();
        store.update_one("C", filter.clone(), doc! { "$addToSet": { "ids": 6 } }, false).await.unwrap();
        store.update_one("C", filter.clone(), doc! { "$addToSet": { "ids": 6 } }, false).await.unwrap();

        let doc = store.find_one("C", filter.clone()).await.unwrap().unwrap();
        assert_eq!(doc.get_array("ids").unwrap().len(), 3);

        store.update_one("C", filter.clone(), doc! { "$pull": { "ids": 5 } }, false).await.unwrap();
        store.update_one("C", filter.clone(), doc! { "$set": { "a.b": 1 }, "$inc": { "n": 2 } }, false).await.unwrap();
        store.update_one("C", filter.clone(), doc! { "$unset": { "a": "" } }, false).await.unwrap();

        let doc = store.find_one("C", filter).await.unwrap().unwrap();
        assert_eq!(doc.get_array("ids").unwrap(), &vec![Bson::Int32(6)]);
        assert_eq!(doc.get_i32("n").unwrap(), 2);
        assert!(!doc.contains_key("a"));
    }

    #[tokio::test]
    async fn test_filter_matches_array_members() {
        let store = MemoryStore::new();
        store
            .update_one("USERS", doc! { "_id": 9_i64 }, doc! { "$addToSet": { "chats": -5_i64 } }, true)
            .await
            .unwrap();
        assert_eq!(store.count("USERS", doc! { "chats": -5_i64 }).await.unwrap(), 1);
        assert_eq!(store.count("USERS", doc! { "chats": -6_i64 }).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_find_one_and_update_returns_requested_version() {
        let store = MemoryStore::new();
        store.update_one("C", doc! { "k": 1 }, doc! { "$set": { "v": 1 } }, true).await.unwrap();

        let before = store
            .find_one_and_update("C", doc! { "k": 1 }, doc! { "$inc": { "v": 1 } }, false, ReturnDocument::Before)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(before.get_i32("v").unwrap(), 1);

        let after = store
            .find_one_and_update("C", doc! { "k": 1 }, doc! { "$inc": { "v": 1 } }, false, ReturnDocument::After)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.get_i32("v").unwrap(), 3);
    }

    #[tokio::test]
    async fn test_closed_store_rejects_operations() {
        let store = MemoryStore::new();
        store.close().await;
        assert!(store.find_one("C", doc! {}).await.is_err());
    }
}
