//! # Spyglass Fetcher
//!
//! CIジョブ成果物の取得ライブラリ。
//!
//! ## 構成
//! - [`storage`]: オブジェクトストアの抽象と実装（メモリ / ローカル / GCS）
//! - [`provider`]: ジョブソースから成果物一覧・ハンドルを提供
//! - [`artifact`]: 上限付き読み込みを行う成果物ハンドル
//! - [`signer`]: 匿名 / Cookie / V2署名付きURLの生成
//! - [`fetcher`]: 上記をまとめたファサード
//! - [`config`]: 環境変数からの設定読み込み
//!
//! ## 使用例
//! ```no_run
//! # async fn run() -> anyhow::Result<()> {
//! use spyglass_fetcher::{ArtifactFetcher, FetcherConfig, StoreConfig};
//!
//! let config = FetcherConfig::from_env()?;
//! let store = StoreConfig::from_env()?.build()?;
//! let fetcher = ArtifactFetcher::from_config(store, &config);
//!
//! let source = "kubernetes-jenkins/logs/ci-kubernetes-e2e/1234";
//! for name in fetcher.artifacts(source).await? {
//!     let artifact = fetcher.artifact(source, &name, config.max_artifact_size)?;
//!     println!("{} {}", artifact.size().await?, artifact.canonical_link()?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod provider;
pub mod signer;
pub mod storage;

pub use artifact::ArtifactHandle;
pub use config::{FetcherConfig, StoreConfig, DEFAULT_MAX_ARTIFACT_SIZE};
pub use error::{FetchError, SignError, StoreError};
pub use fetcher::ArtifactFetcher;
pub use provider::ArtifactHandleProvider;
pub use signer::{SignedUrlRequest, SigningMode, UrlSigner, DEFAULT_SIGNED_URL_EXPIRY};
pub use storage::{ObjectReader, ObjectStore};
pub use spyglass_types::{JobSource, ParseJobSourceError};
