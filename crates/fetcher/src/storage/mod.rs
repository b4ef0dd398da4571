//! # オブジェクトストア
//!
//! 成果物が格納されたバケット型オブジェクトストアの抽象インターフェース。
//! 実装はサブモジュールを参照。
//!
//! ## 実装
//! - `MemoryObjectStore`: メモリ上のオブジェクト（テスト・組み込み用）
//! - `FsObjectStore`: ローカルディレクトリを `<root>/<bucket>/<key>` として扱う
//! - `GcsHttpStore`: 公開バケットをGCS JSON/XML APIで匿名読み取りする

pub mod fs;
pub mod memory;

#[cfg(feature = "vendor-gcs")]
pub mod gcs;

pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;

#[cfg(feature = "vendor-gcs")]
pub use gcs::GcsHttpStore;

use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::StoreError;

/// GCSの既定エンドポイント
pub const DEFAULT_GCS_ENDPOINT: &str = "https://storage.googleapis.com";

/// オブジェクトの読み込みストリーム。
pub struct ObjectReader {
    /// オブジェクト全体のサイズ（バイト）。範囲読み込みの場合も全体のサイズを表す。
    pub size: u64,
    /// オブジェクト本体。
    pub body: Pin<Box<dyn AsyncRead + Send>>,
}

impl ObjectReader {
    /// 空の本体を持つ読み込みストリーム（末尾以降のオフセット指定時など）。
    pub fn empty(size: u64) -> Self {
        Self {
            size,
            body: Box::pin(tokio::io::empty()),
        }
    }
}

/// オブジェクトストアの抽象インターフェース。
///
/// 一覧取得のタイムアウトやリトライは実装側の責務とする。
/// 複数の呼び出し元から同時に使われるため `Send + Sync` を要求する。
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// `prefix` で始まるオブジェクトキーを全て返す。該当なしは空の一覧。
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// オブジェクトを先頭から読み込むストリームを開く。
    /// 存在しない場合は `StoreError::NotFound`。
    async fn open_object(&self, bucket: &str, key: &str) -> Result<ObjectReader, StoreError>;

    /// オブジェクトを `offset` バイト目から読み込むストリームを開く。
    ///
    /// 既定の実装は先頭から開いて `offset` バイトを読み捨てる。
    /// 範囲読み込みをサポートするストアは上書きすること。
    async fn open_object_at(
        &self,
        bucket: &str,
        key: &str,
        offset: u64,
    ) -> Result<ObjectReader, StoreError> {
        let reader = self.open_object(bucket, key).await?;
        if offset == 0 {
            return Ok(reader);
        }
        if offset >= reader.size {
            return Ok(ObjectReader::empty(reader.size));
        }
        let ObjectReader { size, mut body } = reader;
        tokio::io::copy(&mut (&mut body).take(offset), &mut tokio::io::sink()).await?;
        Ok(ObjectReader { size, body })
    }
}
