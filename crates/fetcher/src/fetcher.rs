//! # ArtifactFetcher
//!
//! ジョブソース解析・成果物ハンドル・URL生成をまとめたファサード。
//! URL生成モード（匿名 / Cookie / 署名付き）は構築時に決まり、以後変わらない。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::artifact::ArtifactHandle;
use crate::config::FetcherConfig;
use crate::error::{FetchError, SignError};
use crate::provider::ArtifactHandleProvider;
use crate::signer::{SigningMode, UrlSigner, DEFAULT_SIGNED_URL_EXPIRY};
use crate::storage::ObjectStore;

/// CIジョブ成果物のフェッチャー。
///
/// 内部状態は構築後に変更されないため、複数タスクから同時に使用できる
/// （ストア実装が同時使用に対応している限り）。
#[derive(Clone)]
pub struct ArtifactFetcher {
    provider: ArtifactHandleProvider,
    signer: Arc<UrlSigner>,
}

impl ArtifactFetcher {
    /// 新しいArtifactFetcherを作成する。
    ///
    /// # 引数
    /// - `store`: 成果物が格納されたオブジェクトストア
    /// - `credential_path`: サービスアカウント認証情報ファイル（指定時は署名付きURL）
    /// - `use_cookie_auth`: 認証情報ファイルがない場合にCookie認証ホストを使うか
    pub fn new(
        store: Arc<dyn ObjectStore>,
        credential_path: Option<PathBuf>,
        use_cookie_auth: bool,
    ) -> Self {
        Self::with_expiry(
            store,
            SigningMode::new(credential_path, use_cookie_auth),
            DEFAULT_SIGNED_URL_EXPIRY,
        )
    }

    /// 設定から構築する。
    pub fn from_config(store: Arc<dyn ObjectStore>, config: &FetcherConfig) -> Self {
        Self::with_expiry(
            store,
            SigningMode::new(config.credentials_file.clone(), config.use_cookie_auth),
            config.signed_url_expiry,
        )
    }

    fn with_expiry(store: Arc<dyn ObjectStore>, mode: SigningMode, expiry: Duration) -> Self {
        let signer = Arc::new(UrlSigner::new(mode, expiry));
        Self {
            provider: ArtifactHandleProvider::new(store, Arc::clone(&signer)),
            signer,
        }
    }

    /// URL生成モード
    pub fn signing_mode(&self) -> &SigningMode {
        self.signer.mode()
    }

    /// ジョブソース配下の成果物名を返す。
    pub async fn artifacts(&self, source: &str) -> Result<Vec<String>, FetchError> {
        self.provider.list_artifacts(source).await
    }

    /// 成果物ハンドルを返す。ハンドルの `canonical_link` はこのフェッチャーのURL生成モードに従う。
    pub fn artifact(
        &self,
        source: &str,
        name: &str,
        max_size: u64,
    ) -> Result<ArtifactHandle, FetchError> {
        self.provider.get_artifact(source, name, max_size)
    }

    /// オブジェクトを取得するためのURLを生成する。
    pub fn sign_url(&self, bucket: &str, object_key: &str) -> Result<String, SignError> {
        self.signer.sign_url(bucket, object_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::{ANON_HOST, COOKIE_HOST};
    use crate::storage::MemoryObjectStore;

    const MAX_SIZE: u64 = 500_000_000;

    fn fake_store() -> Arc<dyn ObjectStore> {
        let prefix = "logs/example-ci-run/403";
        let objects = [
            ("build-log.txt", "Oh wow\nlogs\nthis is\ncrazy".to_string()),
            ("started.json", r#"{"timestamp":1528742858}"#.to_string()),
            ("finished.json", r#"{"timestamp":1528742943,"passed":true}"#.to_string()),
            ("junit_01.xml", "<testsuite tests=\"1\"/>".to_string()),
            ("long-log.txt", "x".repeat(300)),
        ];
        let mut store = MemoryObjectStore::new();
        for (name, data) in objects {
            store.insert("test-bucket", &format!("{prefix}/{name}"), data);
        }
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_list_artifacts() {
        let fetcher = ArtifactFetcher::new(fake_store(), None, false);

        let mut actual = fetcher
            .artifacts("test-bucket/logs/example-ci-run/403")
            .await
            .unwrap();
        actual.sort();
        assert_eq!(
            actual,
            vec![
                "build-log.txt",
                "finished.json",
                "junit_01.xml",
                "long-log.txt",
                "started.json",
            ]
        );

        let empty = fetcher
            .artifacts("test-bucket/logs/example-ci/404")
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_artifacts() {
        let fetcher = ArtifactFetcher::new(fake_store(), None, false);

        let artifact = fetcher
            .artifact("test-bucket/logs/example-ci-run/403", "build-log.txt", MAX_SIZE)
            .unwrap();
        assert_eq!(artifact.size().await.unwrap(), 25);

        // ハンドルの構築は成功し、サイズ取得で NotFound になる
        let artifact = fetcher
            .artifact("test-bucket/logs/example-ci-run/404", "build-log.txt", MAX_SIZE)
            .unwrap();
        let err = artifact.size().await.unwrap_err();
        assert!(err.is_not_found(), "{err:?}");
    }

    #[tokio::test]
    async fn test_artifact_link_follows_mode() {
        let source = "test-bucket/logs/example-ci-run/403";

        let anon = ArtifactFetcher::new(fake_store(), None, false);
        assert_eq!(anon.signing_mode(), &SigningMode::Anonymous);
        let link = anon
            .artifact(source, "build-log.txt", MAX_SIZE)
            .unwrap()
            .canonical_link()
            .unwrap();
        assert_eq!(
            link,
            format!("https://{ANON_HOST}/test-bucket/logs/example-ci-run/403/build-log.txt")
        );

        let cookie = ArtifactFetcher::new(fake_store(), None, true);
        assert_eq!(cookie.signing_mode(), &SigningMode::Cookie);
        let link = cookie
            .artifact(source, "build-log.txt", MAX_SIZE)
            .unwrap()
            .canonical_link()
            .unwrap();
        assert_eq!(
            link,
            format!("https://{COOKIE_HOST}/test-bucket/logs/example-ci-run/403/build-log.txt")
        );
    }

    #[test]
    fn test_sign_url_modes() {
        let anon = ArtifactFetcher::new(fake_store(), None, false);
        assert_eq!(
            anon.sign_url("foo", "bar/stuff").unwrap(),
            format!("https://{ANON_HOST}/foo/bar/stuff")
        );

        let cookie = ArtifactFetcher::new(fake_store(), None, true);
        assert_eq!(
            cookie.sign_url("foo", "bar/stuff").unwrap(),
            format!("https://{COOKIE_HOST}/foo/bar/stuff")
        );
    }

    /// 認証情報が不正な場合、ハンドルは取得できるがリンク生成は失敗する（署名なしURLに戻らない）
    #[tokio::test]
    async fn test_signed_mode_never_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        std::fs::write(&path, r#"{"type": "authorized_user", "client_email": "a@b"}"#).unwrap();

        let fetcher = ArtifactFetcher::new(fake_store(), Some(path), true);
        assert!(matches!(fetcher.signing_mode(), SigningMode::Signed { .. }));

        let artifact = fetcher
            .artifact("test-bucket/logs/example-ci-run/403", "build-log.txt", MAX_SIZE)
            .unwrap();
        assert_eq!(artifact.size().await.unwrap(), 25);
        let err = artifact.canonical_link().unwrap_err();
        assert!(
            matches!(err, FetchError::Sign(SignError::UnsupportedCredentialType(_))),
            "{err:?}"
        );
    }

    #[test]
    fn test_from_config() {
        let config = FetcherConfig {
            use_cookie_auth: true,
            signed_url_expiry: Duration::from_secs(60),
            ..FetcherConfig::default()
        };
        let fetcher = ArtifactFetcher::from_config(fake_store(), &config);
        assert_eq!(fetcher.signing_mode(), &SigningMode::Cookie);
    }
}
