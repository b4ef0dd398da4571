//! # 成果物ハンドルの提供
//!
//! ジョブソース文字列を解析し、そのジョブprefix配下の成果物一覧と
//! 成果物ハンドルを提供する。

use std::sync::Arc;

use spyglass_types::JobSource;

use crate::artifact::ArtifactHandle;
use crate::error::FetchError;
use crate::signer::UrlSigner;
use crate::storage::ObjectStore;

/// オブジェクトストアをラップし、ジョブ単位で成果物を扱う。
#[derive(Clone)]
pub struct ArtifactHandleProvider {
    store: Arc<dyn ObjectStore>,
    signer: Arc<UrlSigner>,
}

impl ArtifactHandleProvider {
    /// 新しいArtifactHandleProviderを作成する。
    ///
    /// # 引数
    /// - `store`: 成果物が格納されたオブジェクトストア
    /// - `signer`: ハンドルのURL生成に使用する署名器
    pub fn new(store: Arc<dyn ObjectStore>, signer: Arc<UrlSigner>) -> Self {
        Self { store, signer }
    }

    /// ジョブソース配下の成果物名（ジョブprefixからの相対名）を返す。順序は保証しない。
    pub async fn list_artifacts(&self, source: &str) -> Result<Vec<String>, FetchError> {
        let job = JobSource::parse(source)?;
        let keys = self
            .store
            .list_objects(job.bucket(), job.job_prefix())
            .await
            .map_err(|e| FetchError::from_store(e, job.bucket(), job.job_prefix()))?;

        let names: Vec<String> = keys
            .iter()
            .filter_map(|key| job.artifact_name(key))
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        tracing::debug!(job = %job, count = names.len(), "成果物一覧を取得");
        Ok(names)
    }

    /// 成果物ハンドルを返す。この時点ではストアにアクセスしない。
    ///
    /// # 引数
    /// - `source`: ジョブソース文字列
    /// - `name`: ジョブprefixからの相対名
    /// - `max_size`: 読み込み上限（バイト）
    pub fn get_artifact(
        &self,
        source: &str,
        name: &str,
        max_size: u64,
    ) -> Result<ArtifactHandle, FetchError> {
        let job = JobSource::parse(source)?;
        let object_key = job.object_key(name);
        Ok(ArtifactHandle::new(
            Arc::clone(&self.store),
            Arc::clone(&self.signer),
            job.bucket().to_string(),
            object_key,
            name.trim_start_matches('/').to_string(),
            max_size,
        ))
    }
}
