use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use super::{Collection, Document, EntityStore, FindOptions, StoreError};

/// Process-local document store. Records are held as JSON documents per
/// collection, with a unique-key index maintained alongside them.
#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    documents: HashMap<Collection, BTreeMap<String, Value>>,
    unique: HashMap<(Collection, String), String>,
}

impl Inner {
    fn collection(&mut self, collection: Collection) -> &mut BTreeMap<String, Value> {
        self.documents.entry(collection).or_default()
    }

    fn claim(
        &mut self,
        collection: Collection,
        key: Option<String>,
        id: &str,
    ) -> Result<(), StoreError> {
        let Some(key) = key else {
            return Ok(());
        };
        match self.unique.get(&(collection, key.clone())) {
            Some(holder) if holder != id => Err(StoreError::Conflict(collection)),
            _ => {
                self.unique.insert((collection, key), id.to_string());
                Ok(())
            }
        }
    }

    fn release(&mut self, collection: Collection, key: Option<String>, id: &str) {
        if let Some(key) = key {
            let index_key = (collection, key);
            if self.unique.get(&index_key).map(String::as_str) == Some(id) {
                self.unique.remove(&index_key);
            }
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held in `collection`.
    pub fn count(&self, collection: Collection) -> usize {
        self.lock()
            .map(|inner| {
                inner
                    .documents
                    .get(&collection)
                    .map_or(0, BTreeMap::len)
            })
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))
    }
}

fn encode<D: Document>(doc: &D) -> Result<Value, StoreError> {
    serde_json::to_value(doc).map_err(|err| StoreError::Corrupt(err.to_string()))
}

fn decode<D: Document>(value: &Value) -> Result<D, StoreError> {
    <D as serde::Deserialize>::deserialize(value).map_err(|err| StoreError::Corrupt(err.to_string()))
}

impl EntityStore for MemoryStore {
    fn find_by_id<D: Document>(&self, id: &str) -> Result<D, StoreError> {
        let mut inner = self.lock()?;
        let value = inner
            .collection(D::COLLECTION)
            .get(id)
            .ok_or_else(|| StoreError::NotFound(D::COLLECTION, id.to_string()))?;
        decode(value)
    }

    fn find<D: Document>(
        &self,
        filter: &dyn Fn(&D) -> bool,
        options: FindOptions<D>,
    ) -> Result<Vec<D>, StoreError> {
        let mut inner = self.lock()?;
        let mut matches = Vec::new();
        for value in inner.collection(D::COLLECTION).values() {
            let doc: D = decode(value)?;
            if filter(&doc) {
                matches.push(doc);
            }
        }
        drop(inner);

        if let Some(sort) = options.sort {
            matches.sort_by(sort);
        }
        let limit = options.limit.unwrap_or(usize::MAX);
        Ok(matches
            .into_iter()
            .skip(options.skip)
            .take(limit)
            .collect())
    }

    fn insert<D: Document>(&self, doc: D) -> Result<D, StoreError> {
        let value = encode(&doc)?;
        let mut inner = self.lock()?;
        if inner.collection(D::COLLECTION).contains_key(doc.key()) {
            return Err(StoreError::Conflict(D::COLLECTION));
        }
        inner.claim(D::COLLECTION, doc.unique_key(), doc.key())?;
        inner
            .collection(D::COLLECTION)
            .insert(doc.key().to_string(), value);
        Ok(doc)
    }

    fn update_if<D: Document>(
        &self,
        id: &str,
        predicate: &dyn Fn(&D) -> bool,
        patch: &mut dyn FnMut(&mut D),
    ) -> Result<D, StoreError> {
        let mut inner = self.lock()?;
        let current: D = match inner.collection(D::COLLECTION).get(id) {
            Some(value) => decode(value)?,
            None => return Err(StoreError::NotFound(D::COLLECTION, id.to_string())),
        };
        if !predicate(&current) {
            return Err(StoreError::PredicateFailed(D::COLLECTION, id.to_string()));
        }

        let mut updated = current.clone();
        patch(&mut updated);
        let value = encode(&updated)?;

        let old_key = current.unique_key();
        let new_key = updated.unique_key();
        if old_key != new_key {
            inner.claim(D::COLLECTION, new_key, id)?;
            inner.release(D::COLLECTION, old_key, id);
        }
        inner.collection(D::COLLECTION).insert(id.to_string(), value);
        Ok(updated)
    }

    fn delete_many<D: Document>(&self, filter: &dyn Fn(&D) -> bool) -> Result<usize, StoreError> {
        let mut inner = self.lock()?;
        let mut doomed = Vec::new();
        for (id, value) in inner.collection(D::COLLECTION).iter() {
            let doc: D = decode(value)?;
            if filter(&doc) {
                doomed.push((id.clone(), doc.unique_key()));
            }
        }
        for (id, key) in &doomed {
            inner.collection(D::COLLECTION).remove(id);
            inner.release(D::COLLECTION, key.clone(), id);
        }
        Ok(doomed.len())
    }

    fn delete_one<D: Document>(&self, id: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        let Some(value) = inner.collection(D::COLLECTION).remove(id) else {
            return Ok(false);
        };
        let doc: D = decode(&value)?;
        inner.release(D::COLLECTION, doc.unique_key(), id);
        Ok(true)
    }
}
