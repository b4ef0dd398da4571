//! # ファイルシステム オブジェクトストア
//!
//! ローカルディレクトリを `<root>/<bucket>/<key>` の構成でオブジェクトストアとして扱う。
//! 開発環境や、成果物をディスクに同期済みの環境向け。

use std::io::{ErrorKind, SeekFrom};
use std::path::{Component, Path, PathBuf};

use tokio::io::AsyncSeekExt;

use super::{ObjectReader, ObjectStore};
use crate::error::StoreError;

/// ローカルディレクトリをオブジェクトストアとして扱う実装。
///
/// ディレクトリ構成: `{root}/{bucket}/{key}`
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// 新しいFsObjectStoreを作成する。
    ///
    /// # 引数
    /// - `root`: バケットディレクトリが並ぶルートディレクトリ
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// バケット名・キーからファイルパスを組み立てる。
    /// ルート外を指しうるセグメント（`..` 等）は拒否する。
    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        let mut path = self.root.join(checked_segment(bucket)?);
        for segment in key.split('/').filter(|s| !s.is_empty()) {
            path.push(checked_segment(segment)?);
        }
        Ok(path)
    }

    async fn open_file(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<(tokio::fs::File, u64), StoreError> {
        let not_found = || StoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
        let path = self.object_path(bucket, key)?;
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(StoreError::Io(e)),
        };
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(not_found());
        }
        Ok((file, metadata.len()))
    }
}

fn checked_segment(segment: &str) -> Result<&str, StoreError> {
    let mut components = Path::new(segment).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(segment),
        _ => Err(StoreError::InvalidKey(segment.to_string())),
    }
}

#[async_trait::async_trait]
impl ObjectStore for FsObjectStore {
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        // prefixのディレクトリ部分から走査を始め、キー全体でprefix一致を確認する
        let dir_part = prefix.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        let start = self.object_path(bucket, dir_part)?;
        let bucket_root = self.object_path(bucket, "")?;

        let mut keys = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::Io(e)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&bucket_root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }
        tracing::debug!(bucket = %bucket, prefix = %prefix, count = keys.len(), "ローカルオブジェクト一覧を取得");
        Ok(keys)
    }

    async fn open_object(&self, bucket: &str, key: &str) -> Result<ObjectReader, StoreError> {
        let (file, size) = self.open_file(bucket, key).await?;
        Ok(ObjectReader {
            size,
            body: Box::pin(file),
        })
    }

    async fn open_object_at(
        &self,
        bucket: &str,
        key: &str,
        offset: u64,
    ) -> Result<ObjectReader, StoreError> {
        let (mut file, size) = self.open_file(bucket, key).await?;
        if offset >= size {
            return Ok(ObjectReader::empty(size));
        }
        file.seek(SeekFrom::Start(offset)).await?;
        Ok(ObjectReader {
            size,
            body: Box::pin(file),
        })
    }
}
