//! # Fetcher設定
//!
//! 環境変数からの設定読み込み。
//!
//! | 環境変数 | 既定値 |
//! |---------|-------|
//! | `SPYGLASS_CREDENTIALS_FILE` | なし（署名しない） |
//! | `SPYGLASS_USE_COOKIE_AUTH` | `false` |
//! | `SPYGLASS_SIGNED_URL_EXPIRY_SECS` | `600` |
//! | `SPYGLASS_MAX_ARTIFACT_SIZE` | `500000000` |
//! | `SPYGLASS_STORE` | `gcs`（`fs` / `gcs`） |
//! | `SPYGLASS_STORE_ROOT` | `fs` の場合は必須 |
//! | `SPYGLASS_GCS_ENDPOINT` | `https://storage.googleapis.com` |

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::signer::DEFAULT_SIGNED_URL_EXPIRY;
use crate::storage::{FsObjectStore, ObjectStore, DEFAULT_GCS_ENDPOINT};

/// 成果物の既定の読み込み上限（500MB）
pub const DEFAULT_MAX_ARTIFACT_SIZE: u64 = 500_000_000;

/// フェッチャーの設定。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetcherConfig {
    /// サービスアカウント認証情報ファイル。指定時は署名付きURLを生成する。
    pub credentials_file: Option<PathBuf>,
    /// 認証情報ファイルがない場合にCookie認証ホストを使うか
    pub use_cookie_auth: bool,
    /// 署名付きURLの有効期間
    pub signed_url_expiry: Duration,
    /// 成果物の読み込み上限（バイト）
    pub max_artifact_size: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            credentials_file: None,
            use_cookie_auth: false,
            signed_url_expiry: DEFAULT_SIGNED_URL_EXPIRY,
            max_artifact_size: DEFAULT_MAX_ARTIFACT_SIZE,
        }
    }
}

impl FetcherConfig {
    /// 環境変数から構築する。
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 任意の変数参照関数から構築する。
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        // 空文字列は未指定として扱う
        let credentials_file = lookup("SPYGLASS_CREDENTIALS_FILE")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let use_cookie_auth = match lookup("SPYGLASS_USE_COOKIE_AUTH") {
            Some(v) => parse_bool(&v)
                .with_context(|| format!("SPYGLASS_USE_COOKIE_AUTHが不正です: {v:?}"))?,
            None => defaults.use_cookie_auth,
        };

        let signed_url_expiry = match lookup("SPYGLASS_SIGNED_URL_EXPIRY_SECS") {
            Some(v) => {
                let secs: u64 = v.trim().parse().with_context(|| {
                    format!("SPYGLASS_SIGNED_URL_EXPIRY_SECSは整数である必要があります: {v:?}")
                })?;
                if secs == 0 {
                    anyhow::bail!("SPYGLASS_SIGNED_URL_EXPIRY_SECSは1以上である必要があります");
                }
                Duration::from_secs(secs)
            }
            None => defaults.signed_url_expiry,
        };

        let max_artifact_size = match lookup("SPYGLASS_MAX_ARTIFACT_SIZE") {
            Some(v) => v.trim().parse::<u64>().with_context(|| {
                format!("SPYGLASS_MAX_ARTIFACT_SIZEは整数である必要があります: {v:?}")
            })?,
            None => defaults.max_artifact_size,
        };

        if credentials_file.is_some() && use_cookie_auth {
            tracing::warn!("認証情報ファイルが指定されているため、Cookie認証の設定は無視されます");
        }

        Ok(Self {
            credentials_file,
            use_cookie_auth,
            signed_url_expiry,
            max_artifact_size,
        })
    }
}

fn parse_bool(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("真偽値として解釈できません: {other}"),
    }
}

/// オブジェクトストアの選択。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    /// ローカルディレクトリ（`<root>/<bucket>/<key>`）
    Fs {
        /// ルートディレクトリ
        root: PathBuf,
    },
    /// 公開GCSバケット（HTTP）
    Gcs {
        /// APIのベースURL
        endpoint: String,
    },
}

impl StoreConfig {
    /// 環境変数から構築する。
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 任意の変数参照関数から構築する。
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let kind = lookup("SPYGLASS_STORE").unwrap_or_else(|| "gcs".to_string());
        match kind.trim() {
            "fs" => {
                let root = lookup("SPYGLASS_STORE_ROOT")
                    .filter(|s| !s.trim().is_empty())
                    .context("SPYGLASS_STORE=fs の場合はSPYGLASS_STORE_ROOTが必要です")?;
                Ok(StoreConfig::Fs {
                    root: PathBuf::from(root),
                })
            }
            "gcs" => Ok(StoreConfig::Gcs {
                endpoint: lookup("SPYGLASS_GCS_ENDPOINT")
                    .unwrap_or_else(|| DEFAULT_GCS_ENDPOINT.to_string()),
            }),
            other => anyhow::bail!("不明なSPYGLASS_STOREです: {other:?}（fs / gcs）"),
        }
    }

    /// 設定に従ってオブジェクトストアを構築する。
    pub fn build(&self) -> anyhow::Result<Arc<dyn ObjectStore>> {
        match self {
            StoreConfig::Fs { root } => {
                tracing::info!(root = %root.display(), "ローカルディレクトリのストアを使用");
                Ok(Arc::new(FsObjectStore::new(root.clone())))
            }
            StoreConfig::Gcs { endpoint } => build_gcs(endpoint),
        }
    }
}

#[cfg(feature = "vendor-gcs")]
fn build_gcs(endpoint: &str) -> anyhow::Result<Arc<dyn ObjectStore>> {
    tracing::info!(gcs_endpoint = %endpoint, "GCS HTTPストアを使用");
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()?;
    Ok(Arc::new(crate::storage::GcsHttpStore::new(client, endpoint)?))
}

#[cfg(not(feature = "vendor-gcs"))]
fn build_gcs(_endpoint: &str) -> anyhow::Result<Arc<dyn ObjectStore>> {
    anyhow::bail!("GCSストアは無効化されています（vendor-gcs featureが必要です）")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        move |name| map.get(name).map(|v| v.to_string())
    }

    #[test]
    fn test_defaults() {
        let config = FetcherConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, FetcherConfig::default());
        assert_eq!(config.signed_url_expiry, Duration::from_secs(600));
        assert_eq!(config.max_artifact_size, 500_000_000);
    }

    #[test]
    fn test_from_vars() {
        let config = FetcherConfig::from_lookup(lookup(&[
            ("SPYGLASS_CREDENTIALS_FILE", "/etc/spyglass/sa.json"),
            ("SPYGLASS_USE_COOKIE_AUTH", "true"),
            ("SPYGLASS_SIGNED_URL_EXPIRY_SECS", "3600"),
            ("SPYGLASS_MAX_ARTIFACT_SIZE", "1024"),
        ]))
        .unwrap();
        assert_eq!(
            config.credentials_file,
            Some(PathBuf::from("/etc/spyglass/sa.json"))
        );
        assert!(config.use_cookie_auth);
        assert_eq!(config.signed_url_expiry, Duration::from_secs(3600));
        assert_eq!(config.max_artifact_size, 1024);
    }

    #[test]
    fn test_empty_credentials_is_none() {
        let config =
            FetcherConfig::from_lookup(lookup(&[("SPYGLASS_CREDENTIALS_FILE", "")])).unwrap();
        assert_eq!(config.credentials_file, None);
    }

    #[test]
    fn test_invalid_values() {
        let invalid = [
            ("SPYGLASS_USE_COOKIE_AUTH", "maybe"),
            ("SPYGLASS_SIGNED_URL_EXPIRY_SECS", "ten"),
            ("SPYGLASS_SIGNED_URL_EXPIRY_SECS", "0"),
            ("SPYGLASS_MAX_ARTIFACT_SIZE", "-1"),
        ];
        for var in invalid {
            let vars = [var];
            assert!(FetcherConfig::from_lookup(lookup(&vars)).is_err(), "{var:?}");
        }
    }

    #[test]
    fn test_store_config() {
        assert_eq!(
            StoreConfig::from_lookup(lookup(&[])).unwrap(),
            StoreConfig::Gcs {
                endpoint: "https://storage.googleapis.com".to_string()
            }
        );
        assert_eq!(
            StoreConfig::from_lookup(lookup(&[
                ("SPYGLASS_STORE", "fs"),
                ("SPYGLASS_STORE_ROOT", "/data/artifacts"),
            ]))
            .unwrap(),
            StoreConfig::Fs {
                root: PathBuf::from("/data/artifacts")
            }
        );
        assert!(StoreConfig::from_lookup(lookup(&[("SPYGLASS_STORE", "fs")])).is_err());
        assert!(StoreConfig::from_lookup(lookup(&[("SPYGLASS_STORE", "s3")])).is_err());
    }

    #[tokio::test]
    async fn test_build_fs_store() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b/logs/job/1")).unwrap();
        std::fs::write(dir.path().join("b/logs/job/1/build-log.txt"), "ok").unwrap();

        let store = StoreConfig::Fs {
            root: dir.path().to_path_buf(),
        }
        .build()
        .unwrap();
        let keys = store.list_objects("b", "logs/job/1/").await.unwrap();
        assert_eq!(keys, vec!["logs/job/1/build-log.txt"]);
    }
}
