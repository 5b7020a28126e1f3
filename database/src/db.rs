use crate::errors::{StoreError, StoreResult};
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

type Bucket = BTreeMap<Vec<u8>, Vec<u8>>;

/// A transactional, bucketed key-value store. Readers run inside `view`
/// closures against a consistent snapshot; writers run inside `update`
/// closures whose staged mutations are committed only when the closure
/// returns `Ok`, and discarded wholesale otherwise.
#[derive(Default)]
pub struct Database {
    buckets: RwLock<HashMap<String, Bucket>>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view<F, R>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&ViewTx<'_>) -> StoreResult<R>,
    {
        let guard = self.buckets.read();
        f(&ViewTx { buckets: &*guard })
    }

    pub fn update<F, R>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&mut WriteTx<'_>) -> StoreResult<R>,
    {
        let mut guard = self.buckets.write();
        let mut tx = WriteTx { base: &*guard, staged: HashMap::new(), created: HashSet::new() };
        let result = f(&mut tx);
        let WriteTx { staged, created, .. } = tx;
        if result.is_ok() {
            for name in created {
                guard.entry(name).or_default();
            }
            for (bucket, changes) in staged {
                let bucket = guard.entry(bucket).or_default();
                for (key, value) in changes {
                    match value {
                        Some(value) => {
                            bucket.insert(key, value);
                        }
                        None => {
                            bucket.remove(&key);
                        }
                    }
                }
            }
        }
        result
    }
}

pub struct ViewTx<'a> {
    buckets: &'a HashMap<String, Bucket>,
}

impl ViewTx<'_> {
    pub fn bucket_exists(&self, bucket: &str) -> bool {
        self.buckets.contains_key(bucket)
    }

    pub fn get(&self, bucket: &str, key: &[u8]) -> StoreResult<Vec<u8>> {
        let bucket_map =
            self.buckets.get(bucket).ok_or_else(|| StoreError::BucketNotFound(bucket.to_owned()))?;
        bucket_map.get(key).cloned().ok_or_else(|| StoreError::KeyNotFound(hex_key(bucket, key)))
    }

    pub fn get_obj<T: DeserializeOwned>(&self, bucket: &str, key: &[u8]) -> StoreResult<T> {
        Ok(bincode::deserialize(&self.get(bucket, key)?)?)
    }

    pub fn items(&self, bucket: &str) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let bucket_map =
            self.buckets.get(bucket).ok_or_else(|| StoreError::BucketNotFound(bucket.to_owned()))?;
        Ok(bucket_map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

pub struct WriteTx<'a> {
    base: &'a HashMap<String, Bucket>,
    // key -> staged value, None marking a staged delete
    staged: HashMap<String, HashMap<Vec<u8>, Option<Vec<u8>>>>,
    created: HashSet<String>,
}

impl WriteTx<'_> {
    fn bucket_known(&self, bucket: &str) -> bool {
        self.base.contains_key(bucket) || self.created.contains(bucket)
    }

    pub fn create_bucket_if_not_exists(&mut self, bucket: &str) {
        if !self.base.contains_key(bucket) {
            self.created.insert(bucket.to_owned());
        }
    }

    pub fn get(&self, bucket: &str, key: &[u8]) -> StoreResult<Vec<u8>> {
        if let Some(staged) = self.staged.get(bucket).and_then(|changes| changes.get(key)) {
            return staged.clone().ok_or_else(|| StoreError::KeyNotFound(hex_key(bucket, key)));
        }
        if !self.bucket_known(bucket) {
            return Err(StoreError::BucketNotFound(bucket.to_owned()));
        }
        self.base
            .get(bucket)
            .and_then(|bucket_map| bucket_map.get(key))
            .cloned()
            .ok_or_else(|| StoreError::KeyNotFound(hex_key(bucket, key)))
    }

    pub fn get_obj<T: DeserializeOwned>(&self, bucket: &str, key: &[u8]) -> StoreResult<T> {
        Ok(bincode::deserialize(&self.get(bucket, key)?)?)
    }

    pub fn put(&mut self, bucket: &str, key: &[u8], value: Vec<u8>) -> StoreResult<()> {
        if !self.bucket_known(bucket) {
            return Err(StoreError::BucketNotFound(bucket.to_owned()));
        }
        self.staged.entry(bucket.to_owned()).or_default().insert(key.to_vec(), Some(value));
        Ok(())
    }

    pub fn put_obj<T: Serialize>(&mut self, bucket: &str, key: &[u8], value: &T) -> StoreResult<()> {
        let encoded = bincode::serialize(value)?;
        self.put(bucket, key, encoded)
    }

    pub fn delete(&mut self, bucket: &str, key: &[u8]) -> StoreResult<()> {
        if !self.bucket_known(bucket) {
            return Err(StoreError::BucketNotFound(bucket.to_owned()));
        }
        self.staged.entry(bucket.to_owned()).or_default().insert(key.to_vec(), None);
        Ok(())
    }
}

fn hex_key(bucket: &str, key: &[u8]) -> String {
    let hex: String = key.iter().map(|b| format!("{b:02x}")).collect();
    format!("{bucket}/{hex}")
}
