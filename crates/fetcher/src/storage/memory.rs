//! # メモリ上のオブジェクトストア
//!
//! 構築時に登録したオブジェクトだけを返す読み取り専用ストア。
//! テストや、成果物を埋め込みで配布する用途向け。

use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::Arc;

use super::{ObjectReader, ObjectStore};
use crate::error::StoreError;

/// メモリ上のオブジェクトストア。
///
/// 登録は構築時のみ行い、`Arc` に包んだ後は読み取り専用になる。
#[derive(Debug, Default, Clone)]
pub struct MemoryObjectStore {
    buckets: HashMap<String, BTreeMap<String, Arc<[u8]>>>,
}

impl MemoryObjectStore {
    /// 空のストアを作成する。
    pub fn new() -> Self {
        Self::default()
    }

    /// オブジェクトを登録する。同じキーが既にあれば置き換える。
    pub fn insert(&mut self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        self.buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), Arc::from(data.into()));
    }

    /// オブジェクトを登録したストアを返す（ビルダー形式）。
    pub fn with_object(mut self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) -> Self {
        self.insert(bucket, key, data);
        self
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let Some(objects) = self.buckets.get(bucket) else {
            return Ok(Vec::new());
        };
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn open_object(&self, bucket: &str, key: &str) -> Result<ObjectReader, StoreError> {
        let data = self
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .ok_or_else(|| StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;
        Ok(ObjectReader {
            size: data.len() as u64,
            body: Box::pin(Cursor::new(Arc::clone(data))),
        })
    }
}
