//! # Fetcher エラー型
//!
//! ストレージ層・署名層・成果物取得層のエラー型。
//! いずれもリクエスト単位の失敗であり、プロセスを停止させるものはない。

use std::path::PathBuf;

use spyglass_types::ParseJobSourceError;

/// オブジェクトストアのエラー型。
/// ストレージ実装から返され、成果物取得層ではそのまま呼び出し元へ伝播する。
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// オブジェクトが存在しない
    #[error("オブジェクトが存在しません: {bucket}/{key}")]
    NotFound {
        /// バケット名
        bucket: String,
        /// オブジェクトキー
        key: String,
    },
    /// オブジェクトキーとして扱えない文字列（`..` を含む等）
    #[error("不正なオブジェクトキー: {0}")]
    InvalidKey(String),
    /// 通信エラー（HTTPエラー、レスポンスのパース失敗等）
    #[error("ストレージ通信に失敗: {0}")]
    Transport(String),
    /// 読み込み中のI/Oエラー
    #[error("ストレージI/Oに失敗: {0}")]
    Io(#[from] std::io::Error),
}

/// 署名付きURL生成のエラー型。
///
/// 認証情報に関するエラーはいずれも暗号処理の前に返され、
/// 署名なしURLへのフォールバックは行わない。
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    /// 認証情報ファイルを読み込めない
    #[error("認証情報ファイルの読み込みに失敗 ({}): {source}", .path.display())]
    CredentialRead {
        /// 認証情報ファイルのパス
        path: PathBuf,
        /// 元のI/Oエラー
        #[source]
        source: std::io::Error,
    },
    /// 認証情報ファイルがJSONとして不正
    #[error("認証情報ファイルのパースに失敗: {0}")]
    CredentialParse(String),
    /// サービスアカウント以外の認証情報
    #[error("サポートされていない認証情報の種別です: {0:?}")]
    UnsupportedCredentialType(String),
    /// 秘密鍵がRSA鍵として解釈できない
    #[error("不正な秘密鍵: {0}")]
    InvalidPrivateKey(String),
    /// URLのパスとして表せないオブジェクトキー（`.` / `..` セグメントを含む）
    #[error("URLで表せないオブジェクトキー: {0}")]
    InvalidObjectKey(String),
    /// 署名処理・URL組み立ての失敗
    #[error("署名付きURLの生成に失敗: {0}")]
    Signing(String),
    /// システム時刻の取得に失敗
    #[error("時刻取得失敗: {0}")]
    Clock(String),
}

/// 成果物取得のエラー型。
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// ジョブソース文字列のセグメント数が不足
    #[error(transparent)]
    MalformedSource(#[from] ParseJobSourceError),
    /// 成果物が存在しない
    #[error("成果物が存在しません: {bucket}/{key}")]
    NotFound {
        /// バケット名
        bucket: String,
        /// オブジェクトキー
        key: String,
    },
    /// 成果物のサイズが読み込み上限を超えている
    #[error("成果物のサイズが上限を超えています: {key} ({size} bytes, 上限: {limit} bytes)")]
    SizeExceeded {
        /// オブジェクトキー
        key: String,
        /// 実際のサイズ（読み込み中に検出した場合は検出時点のバイト数）
        size: u64,
        /// 読み込み上限
        limit: u64,
    },
    /// ストレージ操作の失敗（ストレージ実装のエラーをそのまま保持する）
    #[error("ストレージ操作に失敗 ({bucket}/{key}): {source}")]
    Store {
        /// バケット名
        bucket: String,
        /// オブジェクトキーまたはprefix
        key: String,
        /// 元のストレージエラー
        #[source]
        source: StoreError,
    },
    /// 署名付きURLの生成に失敗
    #[error(transparent)]
    Sign(#[from] SignError),
}

impl FetchError {
    /// ストレージエラーに操作対象の情報を付与する。
    /// `StoreError::NotFound` は型付きの `FetchError::NotFound` に変換する。
    pub(crate) fn from_store(err: StoreError, bucket: &str, key: &str) -> Self {
        match err {
            StoreError::NotFound { bucket, key } => FetchError::NotFound { bucket, key },
            source => FetchError::Store {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source,
            },
        }
    }

    /// 対象が存在しないことによるエラーかどうか。
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_store_maps_not_found() {
        let err = FetchError::from_store(
            StoreError::NotFound {
                bucket: "b".to_string(),
                key: "logs/job/1/build-log.txt".to_string(),
            },
            "b",
            "logs/job/1/build-log.txt",
        );
        assert!(err.is_not_found());

        let err = FetchError::from_store(
            StoreError::Transport("HTTP 503".to_string()),
            "b",
            "logs/job/1/",
        );
        assert!(!err.is_not_found());
        match err {
            FetchError::Store { bucket, key, source } => {
                assert_eq!(bucket, "b");
                assert_eq!(key, "logs/job/1/");
                assert!(matches!(source, StoreError::Transport(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
