//! # GCS HTTP オブジェクトストア
//!
//! 公開バケットを認証なしで読み取る最小限のGCSクライアント。
//! 一覧はJSON API、読み込みはXML API（`{endpoint}/{bucket}/{key}`）を使う。
//! 書き込みや認証付きアクセスは扱わない。

use futures_util::stream::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio_util::io::StreamReader;
use spyglass_types::has_dot_segment;
use url::Url;

use super::{ObjectReader, ObjectStore};
use crate::error::StoreError;

/// JSON APIの一覧レスポンス（必要なフィールドのみ）
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    items: Vec<ListItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    name: String,
}

/// 公開GCSバケットをHTTP経由で読み取るストア。
pub struct GcsHttpStore {
    client: reqwest::Client,
    endpoint: Url,
}

impl GcsHttpStore {
    /// 新しいGcsHttpStoreを作成する。
    ///
    /// # 引数
    /// - `client`: HTTPクライアント（タイムアウト等は呼び出し側で設定する）
    /// - `endpoint`: APIのベースURL（例: "https://storage.googleapis.com"）
    pub fn new(client: reqwest::Client, endpoint: &str) -> Result<Self, StoreError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| StoreError::Transport(format!("不正なエンドポイント ({endpoint}): {e}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(StoreError::Transport(format!(
                "ベースURLとして使用できないエンドポイント: {endpoint}"
            )));
        }
        Ok(Self { client, endpoint })
    }

    fn url_with_segments<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn list_url(&self, bucket: &str, prefix: &str, page_token: Option<&str>) -> Url {
        let mut url = self.url_with_segments(["storage", "v1", "b", bucket, "o"]);
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("prefix", prefix)
                .append_pair("fields", "items(name),nextPageToken");
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }
        url
    }

    fn object_url(&self, bucket: &str, key: &str) -> Url {
        self.url_with_segments(std::iter::once(bucket).chain(key.split('/')))
    }

    fn reader_from_response(response: reqwest::Response, size: u64) -> ObjectReader {
        let stream = response
            .bytes_stream()
            .map(|r| r.map_err(std::io::Error::other));
        ObjectReader {
            size,
            body: Box::pin(StreamReader::new(stream)),
        }
    }
}

/// `Content-Range: bytes 10-99/100` または `bytes */100` から全体サイズを取り出す。
fn total_size_from_content_range(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

fn header_u64(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<u64> {
    response.headers().get(name)?.to_str().ok()?.trim().parse().ok()
}

#[async_trait::async_trait]
impl ObjectStore for GcsHttpStore {
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let url = self.list_url(bucket, prefix, page_token.as_deref());
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| StoreError::Transport(format!("一覧取得のHTTP送信失敗: {e}")))?;

            let status = response.status();
            // 存在しないバケットは空の一覧として扱う
            if status == StatusCode::NOT_FOUND {
                break;
            }
            if !status.is_success() {
                return Err(StoreError::Transport(format!(
                    "一覧取得でHTTPエラー: ステータス {status} ({bucket}/{prefix})"
                )));
            }
            let page: ListResponse = response
                .json()
                .await
                .map_err(|e| StoreError::Transport(format!("一覧レスポンスのパースに失敗: {e}")))?;

            keys.extend(page.items.into_iter().map(|item| item.name));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        tracing::debug!(bucket = %bucket, prefix = %prefix, count = keys.len(), "GCSオブジェクト一覧を取得");
        Ok(keys)
    }

    async fn open_object(&self, bucket: &str, key: &str) -> Result<ObjectReader, StoreError> {
        self.open_object_at(bucket, key, 0).await
    }

    async fn open_object_at(
        &self,
        bucket: &str,
        key: &str,
        offset: u64,
    ) -> Result<ObjectReader, StoreError> {
        // URLの正規化で別のオブジェクトを読まないよう、`.` / `..` セグメントは拒否する
        if has_dot_segment(key) {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        let url = self.object_url(bucket, key);
        let mut request = self.client.get(url);
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Transport(format!("オブジェクト取得のHTTP送信失敗: {e}")))?;

        let content_range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(total_size_from_content_range);

        match response.status() {
            StatusCode::NOT_FOUND => Err(StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            StatusCode::RANGE_NOT_SATISFIABLE => {
                let size = content_range.unwrap_or(offset);
                Ok(ObjectReader::empty(size))
            }
            StatusCode::PARTIAL_CONTENT => {
                let size = content_range.ok_or_else(|| {
                    StoreError::Transport(format!("Content-Rangeがありません ({bucket}/{key})"))
                })?;
                Ok(Self::reader_from_response(response, size))
            }
            status if status.is_success() => {
                let size = header_u64(&response, CONTENT_LENGTH).ok_or_else(|| {
                    StoreError::Transport(format!("Content-Lengthがありません ({bucket}/{key})"))
                })?;
                let reader = Self::reader_from_response(response, size);
                if offset == 0 {
                    return Ok(reader);
                }
                // 範囲指定が無視された場合は先頭から読み捨てる
                if offset >= size {
                    return Ok(ObjectReader::empty(size));
                }
                let ObjectReader { size, mut body } = reader;
                tokio::io::copy(
                    &mut tokio::io::AsyncReadExt::take(&mut body, offset),
                    &mut tokio::io::sink(),
                )
                .await?;
                Ok(ObjectReader { size, body })
            }
            status => Err(StoreError::Transport(format!(
                "オブジェクト取得でHTTPエラー: ステータス {status} ({bucket}/{key})"
            ))),
        }
    }
}
