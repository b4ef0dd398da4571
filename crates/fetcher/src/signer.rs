//! # 署名付きURL生成
//!
//! 成果物オブジェクトを認証情報なしで取得できるURLを生成する。
//!
//! ## モード
//! 構築時に一度だけ決定し、以後変更しない。
//! - `Anonymous`: `https://storage.googleapis.com/<bucket>/<key>`（公開オブジェクト前提）
//! - `Cookie`: `https://storage.cloud.google.com/<bucket>/<key>`（Cookie認証はホスト側で行う）
//! - `Signed`: サービスアカウント鍵によるV2形式のクエリ文字列署名
//!
//! ## V2 署名
//! ```text
//! 署名対象: GET\n\n\n<expires>\n/<bucket>/<key>
//! 署名:     RSA-SHA256 (PKCS#1 v1.5) → Base64 → URLエンコード
//! URL:      https://storage.googleapis.com/<bucket>/<key>?GoogleAccessId=..&Expires=..&Signature=..
//! ```

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use spyglass_crypto::{b64, parse_rsa_private_key_pem, rsa_sha256_sign, RsaPrivateKey};
use spyglass_types::{has_dot_segment, CredentialFile, CredentialKind};
use url::Url;

use crate::error::SignError;

/// 匿名アクセス用ホスト（署名付きURLのホストも兼ねる）
pub const ANON_HOST: &str = "storage.googleapis.com";
/// Cookie認証用ホスト
pub const COOKIE_HOST: &str = "storage.cloud.google.com";
/// 署名付きURLの既定の有効期間（10分）
pub const DEFAULT_SIGNED_URL_EXPIRY: Duration = Duration::from_secs(10 * 60);

/// URL生成モード。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningMode {
    /// 署名なし・公開ホスト
    Anonymous,
    /// 署名なし・Cookie認証ホスト
    Cookie,
    /// サービスアカウント鍵による署名
    Signed {
        /// 認証情報ファイルのパス（署名のたびに読み込む）
        credential_path: PathBuf,
    },
}

impl SigningMode {
    /// 認証情報ファイルのパスとCookie認証フラグからモードを決定する。
    /// 認証情報ファイルが指定されていればCookie認証フラグより優先する。
    pub fn new(credential_path: Option<PathBuf>, use_cookie_auth: bool) -> Self {
        match (credential_path, use_cookie_auth) {
            (Some(credential_path), _) => SigningMode::Signed { credential_path },
            (None, true) => SigningMode::Cookie,
            (None, false) => SigningMode::Anonymous,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            SigningMode::Anonymous => "anonymous",
            SigningMode::Cookie => "cookie",
            SigningMode::Signed { .. } => "signed",
        }
    }
}

/// 署名対象のリクエスト。1回の署名にのみ使用し、保存しない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrlRequest<'a> {
    /// URLエンコード済みのリソースパス（`/<bucket>/<key>`）
    pub resource: &'a str,
    /// 有効期限（UNIX秒）
    pub expires: u64,
}

impl SignedUrlRequest<'_> {
    /// V2形式の署名対象文字列を組み立てる。
    ///
    /// `METHOD\nContent-MD5\nContent-Type\nExpires\nResource`
    pub fn canonical_string(&self) -> String {
        format!("GET\n\n\n{}\n{}", self.expires, self.resource)
    }
}

/// 検証済みのサービスアカウント鍵。
struct ServiceAccountKey {
    private_key: RsaPrivateKey,
    client_email: String,
}

/// 認証情報ファイルを読み込み、サービスアカウント鍵として検証する。
///
/// 種別とメールアドレスの確認は秘密鍵のパースより先に行う。
fn load_service_account(path: &Path) -> Result<ServiceAccountKey, SignError> {
    let bytes = std::fs::read(path).map_err(|source| SignError::CredentialRead {
        path: path.to_path_buf(),
        source,
    })?;
    let credential = CredentialFile::from_json(&bytes)
        .map_err(|e| SignError::CredentialParse(format!("{}: {e}", path.display())))?;

    if let CredentialKind::Other(kind) = credential.kind() {
        return Err(SignError::UnsupportedCredentialType(kind));
    }
    if credential.client_email.trim().is_empty() {
        return Err(SignError::CredentialParse(format!(
            "{}: client_emailがありません",
            path.display()
        )));
    }

    let private_key = parse_rsa_private_key_pem(&credential.private_key)
        .map_err(|e| SignError::InvalidPrivateKey(e.to_string()))?;

    Ok(ServiceAccountKey {
        private_key,
        client_email: credential.client_email,
    })
}

/// 署名付きURLの生成器。
#[derive(Debug, Clone)]
pub struct UrlSigner {
    mode: SigningMode,
    expiry: Duration,
}

impl UrlSigner {
    /// 新しいUrlSignerを作成する。
    ///
    /// # 引数
    /// - `mode`: URL生成モード
    /// - `expiry`: 署名付きURLの有効期間（`Signed` モードでのみ使用）
    pub fn new(mode: SigningMode, expiry: Duration) -> Self {
        tracing::info!(mode = mode.name(), expiry_secs = expiry.as_secs(), "URL生成モードを設定");
        Self { mode, expiry }
    }

    /// URL生成モード
    pub fn mode(&self) -> &SigningMode {
        &self.mode
    }

    /// 署名付きURLの有効期間
    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// オブジェクトを取得するためのURLを生成する。
    /// `Signed` モードでは現在時刻 + 有効期間を期限とする。
    pub fn sign_url(&self, bucket: &str, object_key: &str) -> Result<String, SignError> {
        self.dispatch(bucket, object_key, || self.expires_from_now())
    }

    /// 有効期限（UNIX秒）を指定してURLを生成する。
    /// `Anonymous` / `Cookie` モードでは期限は使われない。
    pub fn sign_url_with_expiry(
        &self,
        bucket: &str,
        object_key: &str,
        expires: u64,
    ) -> Result<String, SignError> {
        self.dispatch(bucket, object_key, || Ok(expires))
    }

    fn dispatch(
        &self,
        bucket: &str,
        object_key: &str,
        expires: impl FnOnce() -> Result<u64, SignError>,
    ) -> Result<String, SignError> {
        tracing::debug!(
            bucket = %bucket,
            object_key = %object_key,
            mode = self.mode.name(),
            "URLを生成"
        );
        // 正規化で別のオブジェクトを指すURLは、どのモードでも生成しない
        if has_dot_segment(object_key) {
            return Err(SignError::InvalidObjectKey(object_key.to_string()));
        }
        match &self.mode {
            SigningMode::Anonymous => Ok(format!("https://{ANON_HOST}/{bucket}/{object_key}")),
            SigningMode::Cookie => Ok(format!("https://{COOKIE_HOST}/{bucket}/{object_key}")),
            SigningMode::Signed { credential_path } => {
                let key = load_service_account(credential_path)?;
                sign_v2(&key, bucket, object_key, expires()?)
            }
        }
    }

    fn expires_from_now(&self) -> Result<u64, SignError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| SignError::Clock(e.to_string()))?;
        Ok(now.as_secs() + self.expiry.as_secs())
    }
}

/// V2形式の署名付きURLを組み立てる。
fn sign_v2(
    key: &ServiceAccountKey,
    bucket: &str,
    object_key: &str,
    expires: u64,
) -> Result<String, SignError> {
    let mut url = Url::parse(&format!("https://{ANON_HOST}"))
        .map_err(|e| SignError::Signing(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| SignError::Signing("ベースURLとして使用できません".to_string()))?
        .pop_if_empty()
        .push(bucket)
        .extend(object_key.split('/'));

    let request = SignedUrlRequest {
        resource: url.path(),
        expires,
    };
    let signature = rsa_sha256_sign(&key.private_key, request.canonical_string().as_bytes())
        .map_err(|e| SignError::Signing(e.to_string()))?;
    let signature_b64 = b64().encode(signature);

    url.query_pairs_mut()
        .append_pair("GoogleAccessId", &key.client_email)
        .append_pair("Expires", &expires.to_string())
        .append_pair("Signature", &signature_b64);
    Ok(url.into())
}
