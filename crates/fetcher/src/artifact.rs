//! # 成果物ハンドル
//!
//! オブジェクトストア上の1つの成果物への参照。
//! 構築時にはI/Oを行わず、サイズ取得・読み込みのたびにストアへアクセスする。
//! 結果はキャッシュしない。

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{FetchError, StoreError};
use crate::signer::UrlSigner;
use crate::storage::{ObjectReader, ObjectStore};

/// 成果物ハンドル。
///
/// `size_limit` は読み込み上限であり、上限を超える成果物の全体読み込みは
/// 途中で打ち切らず `FetchError::SizeExceeded` を返す。
pub struct ArtifactHandle {
    store: Arc<dyn ObjectStore>,
    signer: Arc<UrlSigner>,
    bucket: String,
    object_key: String,
    name: String,
    size_limit: u64,
}

impl ArtifactHandle {
    pub(crate) fn new(
        store: Arc<dyn ObjectStore>,
        signer: Arc<UrlSigner>,
        bucket: String,
        object_key: String,
        name: String,
        size_limit: u64,
    ) -> Self {
        Self {
            store,
            signer,
            bucket,
            object_key,
            name,
            size_limit,
        }
    }

    /// バケット名
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// バケット内の完全なオブジェクトキー
    pub fn object_key(&self) -> &str {
        &self.object_key
    }

    /// ジョブprefixからの相対名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 読み込み上限（バイト）
    pub fn size_limit(&self) -> u64 {
        self.size_limit
    }

    /// `<bucket>/<object_key>` 形式のパス。
    pub fn job_path(&self) -> String {
        format!("{}/{}", self.bucket, self.object_key)
    }

    /// ブラウザ等から成果物を取得するためのURL。
    /// フェッチャーのURL生成モードに従う（署名付きの場合は呼び出しのたびに署名する）。
    pub fn canonical_link(&self) -> Result<String, FetchError> {
        Ok(self.signer.sign_url(&self.bucket, &self.object_key)?)
    }

    async fn open(&self, offset: u64) -> Result<ObjectReader, FetchError> {
        self.store
            .open_object_at(&self.bucket, &self.object_key, offset)
            .await
            .map_err(|e| FetchError::from_store(e, &self.bucket, &self.object_key))
    }

    /// 成果物のサイズ（バイト）。存在しない場合は `FetchError::NotFound`。
    ///
    /// サイズ取得は読み込みではないため、上限を超えていてもエラーにしない。
    pub async fn size(&self) -> Result<u64, FetchError> {
        Ok(self.open(0).await?.size)
    }

    /// 成果物全体を読み込む。
    ///
    /// サイズが上限を超える場合は読み込みを行わず `FetchError::SizeExceeded` を返す。
    /// ストアが申告したサイズより本体が長い場合も上限で検出する。
    pub async fn read_all(&self) -> Result<Vec<u8>, FetchError> {
        let reader = self.open(0).await?;
        if reader.size > self.size_limit {
            return Err(self.size_exceeded(reader.size));
        }
        let buf = self
            .read_limited(reader.body, self.size_limit.saturating_add(1))
            .await?;
        if buf.len() as u64 > self.size_limit {
            return Err(self.size_exceeded(buf.len() as u64));
        }
        tracing::debug!(
            bucket = %self.bucket,
            object_key = %self.object_key,
            bytes = buf.len(),
            "成果物を読み込み"
        );
        Ok(buf)
    }

    /// 先頭から最大 `n` バイトを読み込む。`n` は読み込み上限で切り詰める。
    pub async fn read_at_most(&self, n: u64) -> Result<Vec<u8>, FetchError> {
        self.read_at(0, n).await
    }

    /// `offset` から最大 `len` バイトを読み込む。`len` は読み込み上限で切り詰める。
    /// `offset` が末尾以降の場合は空を返す。
    pub async fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>, FetchError> {
        let len = len.min(self.size_limit);
        let reader = self.open(offset).await?;
        if offset >= reader.size || len == 0 {
            return Ok(Vec::new());
        }
        self.read_limited(reader.body, len).await
    }

    /// 末尾の最大 `n` バイトを読み込む。`n` は読み込み上限で切り詰める。
    pub async fn read_tail(&self, n: u64) -> Result<Vec<u8>, FetchError> {
        let n = n.min(self.size_limit);
        let size = self.size().await?;
        let offset = size.saturating_sub(n);
        self.read_at(offset, n).await
    }

    async fn read_limited(
        &self,
        body: Pin<Box<dyn AsyncRead + Send>>,
        limit: u64,
    ) -> Result<Vec<u8>, FetchError> {
        let mut buf = Vec::new();
        body.take(limit)
            .read_to_end(&mut buf)
            .await
            .map_err(|e| {
                FetchError::from_store(StoreError::Io(e), &self.bucket, &self.object_key)
            })?;
        Ok(buf)
    }

    fn size_exceeded(&self, size: u64) -> FetchError {
        FetchError::SizeExceeded {
            key: self.object_key.clone(),
            size,
            limit: self.size_limit,
        }
    }
}

impl fmt::Debug for ArtifactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactHandle")
            .field("bucket", &self.bucket)
            .field("object_key", &self.object_key)
            .field("size_limit", &self.size_limit)
            .finish_non_exhaustive()
    }
}
