//! # Spyglass CLI
//!
//! CIジョブ成果物の一覧・読み込み・URL生成を行うコマンドラインツール。
//!
//! 設定は環境変数（`SPYGLASS_*`）から読み込み、グローバルオプションで上書きする。
//! ログは標準エラー出力へ、結果は標準出力へ出力する。

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use spyglass_fetcher::{ArtifactFetcher, FetcherConfig, StoreConfig};
use spyglass_types::JobSource;
use tokio::io::AsyncWriteExt;

#[derive(Parser, Debug)]
#[command(name = "spyglass", version, about = "CIジョブ成果物の取得ツール")]
struct Cli {
    /// サービスアカウント認証情報ファイル（指定時は署名付きURLを生成）
    #[arg(long, global = true)]
    credentials_file: Option<PathBuf>,

    /// Cookie認証ホストのURLを生成する
    #[arg(long, global = true)]
    cookie_auth: bool,

    /// ローカルディレクトリをストアとして使用する（`<root>/<bucket>/<key>`）
    #[arg(long, global = true, conflicts_with = "gcs_endpoint")]
    store_root: Option<PathBuf>,

    /// GCS APIのベースURL
    #[arg(long, global = true)]
    gcs_endpoint: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// ジョブ配下の成果物名を一覧表示する
    List {
        /// ジョブソース（`[gs://]<bucket>/<prefix...>/<job>/<build>`）
        source: String,
        /// JSONで出力する
        #[arg(long)]
        json: bool,
    },
    /// 成果物全体を出力する
    Cat {
        source: String,
        name: String,
        /// 読み込み上限（バイト）。省略時は SPYGLASS_MAX_ARTIFACT_SIZE
        #[arg(long)]
        max_size: Option<u64>,
    },
    /// 成果物の末尾を出力する
    Tail {
        source: String,
        name: String,
        /// 出力するバイト数
        #[arg(long, default_value_t = 4096)]
        bytes: u64,
    },
    /// バケットとキーからURLを生成する
    Sign { bucket: String, key: String },
    /// 成果物のURLを生成する
    Link { source: String, name: String },
}

impl Cli {
    /// 環境変数から読み込んだ設定にオプションを上書きする。
    fn apply(
        &self,
        mut fetcher: FetcherConfig,
        mut store: StoreConfig,
    ) -> (FetcherConfig, StoreConfig) {
        if let Some(path) = &self.credentials_file {
            fetcher.credentials_file = Some(path.clone());
        }
        if self.cookie_auth {
            fetcher.use_cookie_auth = true;
        }
        if let Some(root) = &self.store_root {
            store = StoreConfig::Fs { root: root.clone() };
        } else if let Some(endpoint) = &self.gcs_endpoint {
            store = StoreConfig::Gcs {
                endpoint: endpoint.clone(),
            };
        }
        (fetcher, store)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let (config, store_config) = cli.apply(
        FetcherConfig::from_env().context("フェッチャー設定の読み込みに失敗しました")?,
        StoreConfig::from_env().context("ストア設定の読み込みに失敗しました")?,
    );
    let store = store_config.build()?;
    let fetcher = ArtifactFetcher::from_config(store, &config);
    tracing::debug!(command = ?cli.command, "コマンドを実行");

    let mut stdout = tokio::io::stdout();
    match cli.command {
        Command::List { source, json } => {
            let mut names = fetcher.artifacts(&source).await?;
            names.sort();
            tracing::info!(source = %source, count = names.len(), "成果物一覧を取得");
            if json {
                let job: JobSource = source.parse()?;
                let out = serde_json::json!({ "source": job, "artifacts": names });
                stdout
                    .write_all(serde_json::to_string_pretty(&out)?.as_bytes())
                    .await?;
                stdout.write_all(b"\n").await?;
            } else {
                for name in names {
                    stdout.write_all(format!("{name}\n").as_bytes()).await?;
                }
            }
        }
        Command::Cat {
            source,
            name,
            max_size,
        } => {
            let limit = max_size.unwrap_or(config.max_artifact_size);
            let artifact = fetcher.artifact(&source, &name, limit)?;
            let data = artifact.read_all().await?;
            tracing::info!(object_key = %artifact.object_key(), bytes = data.len(), "成果物を出力");
            stdout.write_all(&data).await?;
        }
        Command::Tail {
            source,
            name,
            bytes,
        } => {
            let artifact = fetcher.artifact(&source, &name, config.max_artifact_size)?;
            let data = artifact.read_tail(bytes).await?;
            stdout.write_all(&data).await?;
        }
        Command::Sign { bucket, key } => {
            let url = fetcher.sign_url(&bucket, &key)?;
            stdout.write_all(format!("{url}\n").as_bytes()).await?;
        }
        Command::Link { source, name } => {
            let artifact = fetcher.artifact(&source, &name, config.max_artifact_size)?;
            let url = artifact.canonical_link()?;
            stdout.write_all(format!("{url}\n").as_bytes()).await?;
        }
    }
    stdout.flush().await?;
    Ok(())
}
