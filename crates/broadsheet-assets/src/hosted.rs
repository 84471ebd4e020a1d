// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Client for the hosted image CDN.
//
// Uses the provider's REST endpoints:
//   - POST   {api}/{cloud}/image/upload                signed multipart upload
//   - POST   {api}/{cloud}/image/destroy               signed single delete
//   - DELETE {api}/{cloud}/resources/image/upload      admin bulk delete by prefix
//   - DELETE {api}/{cloud}/folders/{path}              admin folder removal

use std::time::Duration;

use async_trait::async_trait;
use broadsheet_core::config::AssetStoreConfig;
use broadsheet_core::error::{BroadsheetError, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::{debug, error, info, instrument, warn};

use crate::signing::sign_params;
use crate::store::{AssetStore, UploadedAsset, asset_id};
use crate::transform::{TransformParams, render_url};

/// Bulk delete removes at most this many batches before giving up.
const MAX_DELETE_ROUNDS: usize = 50;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: String,
    secure_url: String,
    width: u32,
    height: u32,
    bytes: u64,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct BulkDeleteResponse {
    #[serde(default)]
    deleted: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    partial: bool,
}

/// Uploads, deletes and addresses images on the hosted CDN.
pub struct HostedAssetStore {
    client: Client,
    config: AssetStoreConfig,
    delivery_base: String,
}

impl HostedAssetStore {
    /// Build a client. Fails with `Config` when credentials are missing.
    pub fn new(config: AssetStoreConfig) -> Result<Self> {
        for (field, value) in [
            ("assets.cloud_name", &config.cloud_name),
            ("assets.api_key", &config.api_key),
            ("assets.api_secret", &config.api_secret),
        ] {
            if value.trim().is_empty() {
                return Err(BroadsheetError::Config(format!("{field} is not set")));
            }
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| BroadsheetError::Config(format!("HTTP client: {e}")))?;

        let delivery_base = config.delivery_base();
        Ok(Self {
            client,
            config,
            delivery_base,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.cloud_name,
            path
        )
    }

    /// Signed form fields shared by upload and destroy.
    fn signed_fields(&self, public_id: &str) -> Vec<(&'static str, String)> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign_params(
            &[("public_id", public_id), ("timestamp", &timestamp)],
            &self.config.api_secret,
        );
        vec![
            ("public_id", public_id.to_string()),
            ("timestamp", timestamp),
            ("api_key", self.config.api_key.clone()),
            ("signature", signature),
            ("signature_algorithm", "sha256".to_string()),
        ]
    }

    async fn destroy(&self, asset_id: &str) -> Result<DestroyResponse> {
        let form = self
            .signed_fields(asset_id)
            .into_iter()
            .fold(Form::new(), |form, (k, v)| form.text(k, v));

        let response = self
            .client
            .post(self.endpoint("image/destroy"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| BroadsheetError::Upload(format!("destroy: {e}")))?;
        let response = ensure_success(response, "destroy").await?;
        response
            .json()
            .await
            .map_err(|e| BroadsheetError::Upload(format!("destroy response: {e}")))
    }

    async fn bulk_delete_round(&self, prefix: &str) -> Result<BulkDeleteResponse> {
        let response = self
            .client
            .delete(self.endpoint("resources/image/upload"))
            .basic_auth(&self.config.api_key, Some(&self.config.api_secret))
            .query(&[("prefix", prefix)])
            .send()
            .await
            .map_err(|e| BroadsheetError::Upload(format!("bulk delete: {e}")))?;
        let response = ensure_success(response, "bulk delete").await?;
        response
            .json()
            .await
            .map_err(|e| BroadsheetError::Upload(format!("bulk delete response: {e}")))
    }

    async fn delete_folder(&self, folder: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.endpoint(&format!("folders/{folder}")))
            .basic_auth(&self.config.api_key, Some(&self.config.api_secret))
            .send()
            .await
            .map_err(|e| BroadsheetError::Upload(format!("folder delete: {e}")))?;
        // A folder that never existed (or is already gone) is fine.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(response, "folder delete").await.map(|_| ())
    }
}

/// Turn a non-2xx response into an `Upload` error carrying the body text.
async fn ensure_success(response: Response, operation: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BroadsheetError::Upload(format!(
        "{operation} returned {status}: {}",
        body.trim()
    )))
}

#[async_trait]
impl AssetStore for HostedAssetStore {
    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    async fn upload(&self, bytes: Vec<u8>, namespace: &str, name: &str) -> Result<UploadedAsset> {
        let public_id = asset_id(namespace, name);

        let file = Part::bytes(bytes)
            .file_name(format!("{name}.jpg"))
            .mime_str("image/jpeg")
            .map_err(|e| BroadsheetError::Upload(format!("multipart: {e}")))?;
        let form = self
            .signed_fields(&public_id)
            .into_iter()
            .fold(Form::new(), |form, (k, v)| form.text(k, v))
            .part("file", file);

        debug!(%public_id, "uploading page image");
        let response = self
            .client
            .post(self.endpoint("image/upload"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| BroadsheetError::Upload(format!("upload {public_id}: {e}")))?;
        let response = ensure_success(response, "upload").await?;

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| BroadsheetError::Upload(format!("upload response: {e}")))?;

        info!(asset_id = %body.public_id, width = body.width, height = body.height, "page image uploaded");
        Ok(UploadedAsset {
            delivery_url: body.secure_url,
            asset_id: body.public_id,
            width: body.width,
            height: body.height,
            byte_size: body.bytes,
        })
    }

    #[instrument(skip(self))]
    async fn delete(&self, asset_id: &str) {
        let outcome = self.destroy(asset_id).await;

        match outcome {
            Ok(body) if body.result == "ok" || body.result == "not found" => {
                debug!(result = %body.result, "asset deleted");
            }
            Ok(body) => warn!(result = %body.result, "unexpected destroy result"),
            Err(e) => error!(error = %e, "asset delete failed"),
        }
    }

    #[instrument(skip(self))]
    async fn delete_namespace(&self, prefix: &str) {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            warn!("refusing to bulk-delete an empty namespace prefix");
            return;
        }
        let scoped = format!("{prefix}/");

        let mut removed = 0usize;
        for _ in 0..MAX_DELETE_ROUNDS {
            match self.bulk_delete_round(&scoped).await {
                Ok(round) => {
                    removed += round.deleted.len();
                    if !round.partial {
                        break;
                    }
                }
                Err(e) => {
                    error!(%prefix, error = %e, "namespace delete failed");
                    return;
                }
            }
        }

        if let Err(e) = self.delete_folder(prefix).await {
            warn!(%prefix, error = %e, "namespace folder left behind");
        }
        info!(%prefix, removed, "namespace deleted");
    }

    fn derived_url(&self, asset_id: &str, params: &TransformParams) -> String {
        render_url(&self.delivery_base, asset_id, params)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;
    use crate::transform::{CropBox, Format, Quality};

    fn config() -> AssetStoreConfig {
        AssetStoreConfig {
            cloud_name: "daily".into(),
            api_key: "key".into(),
            api_secret: "secret".into(),
            ..Default::default()
        }
    }

    #[test]
    fn missing_credentials_are_config_errors() {
        let mut cfg = config();
        cfg.api_secret.clear();
        match HostedAssetStore::new(cfg) {
            Err(BroadsheetError::Config(msg)) => assert!(msg.contains("api_secret")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected Config error"),
        }
    }

    #[test]
    fn endpoints_are_scoped_to_the_cloud() {
        let store = HostedAssetStore::new(config()).expect("client");
        assert_eq!(
            store.endpoint("image/upload"),
            "https://api.cloudinary.com/v1_1/daily/image/upload"
        );
    }

    #[test]
    fn signed_fields_include_a_valid_signature() {
        let store = HostedAssetStore::new(config()).expect("client");
        let fields = store.signed_fields("editions/abc/page-001");
        let get = |name: &str| {
            fields
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.clone())
                .expect("field present")
        };

        let expected = sign_params(
            &[("public_id", "editions/abc/page-001"), ("timestamp", &get("timestamp"))],
            "secret",
        );
        assert_eq!(get("signature"), expected);
        assert_eq!(get("api_key"), "key");
    }

    #[test]
    fn derived_urls_use_delivery_base() {
        let mut cfg = config();
        cfg.delivery_base_url = Some("https://img.daily.example/upload/".into());
        let store = HostedAssetStore::new(cfg).expect("client");
        let params = TransformParams::new()
            .crop(CropBox {
                x: 1,
                y: 2,
                width: 3,
                height: 4,
            })
            .quality(Quality::AutoGood)
            .format(Format::Jpg);
        assert_eq!(
            store.derived_url("editions/abc/page-001", &params),
            "https://img.daily.example/upload/c_crop,x_1,y_2,w_3,h_4/q_auto:good,f_jpg/editions/abc/page-001"
        );
    }

    // -- Against a local HTTP stub --------------------------------------------

    /// Canned reply for the first request whose path starts with `route`.
    struct Reply {
        route: &'static str,
        status: u16,
        body: &'static str,
    }

    fn reply(route: &'static str, status: u16, body: &'static str) -> Reply {
        Reply {
            route,
            status,
            body,
        }
    }

    /// Serve `replies` in order, one per connection. Returns the base URL
    /// and the request lines seen so far.
    async fn stub_api(replies: Vec<Reply>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        tokio::spawn(async move {
            let mut replies = replies;
            while let Ok((mut stream, _)) = listener.accept().await {
                let line = read_request(&mut stream).await;
                let path = line.split(' ').nth(1).unwrap_or_default().to_string();
                log.lock().expect("log").push(line);

                let (status, body) = match replies.iter().position(|r| path.starts_with(r.route)) {
                    Some(i) => {
                        let r = replies.remove(i);
                        (r.status, r.body)
                    }
                    None => (500, "unexpected request"),
                };
                let response = format!(
                    "HTTP/1.1 {status} Stub\r\n\
                     Content-Type: application/json\r\n\
                     Content-Length: {}\r\n\
                     Connection: close\r\n\
                     \r\n{body}",
                    body.len()
                );
                stream.write_all(response.as_bytes()).await.ok();
                stream.shutdown().await.ok();
            }
        });

        (format!("http://{addr}"), seen)
    }

    /// Read one request and return its request line.
    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        while !request_complete(&buf) {
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }
        String::from_utf8_lossy(&buf)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string()
    }

    fn request_complete(buf: &[u8]) -> bool {
        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            return false;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
        let body = &buf[end + 4..];
        if head.contains("transfer-encoding: chunked") {
            return body.ends_with(b"0\r\n\r\n");
        }
        let length = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        body.len() >= length
    }

    fn store_at(base: &str) -> HostedAssetStore {
        let mut cfg = config();
        cfg.api_base_url = base.to_string();
        cfg.request_timeout_secs = 5;
        HostedAssetStore::new(cfg).expect("client")
    }

    fn requests(seen: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        seen.lock().expect("log").clone()
    }

    #[tokio::test]
    async fn upload_reads_the_stored_asset() {
        let (base, seen) = stub_api(vec![reply(
            "/daily/image/upload",
            200,
            r#"{"public_id":"editions/abc/page-001","secure_url":"https://res.test/daily/image/upload/v1/editions/abc/page-001.jpg","width":1190,"height":1684,"bytes":48213}"#,
        )])
        .await;
        let store = store_at(&base);

        let asset = store
            .upload(vec![0xFF, 0xD8, 0xFF], "editions/abc", "page-001")
            .await
            .expect("upload");
        assert_eq!(asset.asset_id, "editions/abc/page-001");
        assert_eq!((asset.width, asset.height, asset.byte_size), (1190, 1684, 48213));
        assert_eq!(requests(&seen), vec!["POST /daily/image/upload HTTP/1.1".to_string()]);
    }

    #[tokio::test]
    async fn rejected_upload_carries_the_response_body() {
        let (base, _seen) = stub_api(vec![reply(
            "/daily/image/upload",
            401,
            r#"{"error":{"message":"Invalid Signature"}}"#,
        )])
        .await;
        let store = store_at(&base);

        match store.upload(vec![1, 2, 3], "editions/abc", "page-001").await {
            Err(BroadsheetError::Upload(msg)) => {
                assert!(msg.contains("401"), "{msg}");
                assert!(msg.contains("Invalid Signature"), "{msg}");
            }
            other => panic!("expected Upload error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn namespace_delete_repeats_partial_rounds() {
        let (base, seen) = stub_api(vec![
            reply(
                "/daily/resources/image/upload",
                200,
                r#"{"deleted":{"editions/abc/page-001":"deleted"},"partial":true}"#,
            ),
            reply(
                "/daily/resources/image/upload",
                200,
                r#"{"deleted":{"editions/abc/page-002":"deleted"},"partial":false}"#,
            ),
            reply("/daily/folders/", 404, r#"{"error":{"message":"Can't find folder"}}"#),
        ])
        .await;
        let store = store_at(&base);

        store.delete_namespace("/editions/abc/").await;

        let lines = requests(&seen);
        assert_eq!(lines.len(), 3, "{lines:?}");
        assert!(lines[..2].iter().all(|l| {
            l.starts_with("DELETE /daily/resources/image/upload?prefix=editions%2Fabc%2F ")
        }));
        assert_eq!(lines[2], "DELETE /daily/folders/editions/abc HTTP/1.1");
    }

    #[tokio::test]
    async fn missing_folder_is_not_an_error() {
        let (base, _seen) = stub_api(vec![
            reply("/daily/folders/editions/gone", 404, "{}"),
            reply("/daily/folders/editions/locked", 500, "folder is not empty"),
        ])
        .await;
        let store = store_at(&base);

        store.delete_folder("editions/gone").await.expect("404 is fine");
        match store.delete_folder("editions/locked").await {
            Err(BroadsheetError::Upload(msg)) => assert!(msg.contains("folder is not empty"), "{msg}"),
            other => panic!("expected Upload error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_deletes_are_logged_not_returned() {
        let (base, seen) = stub_api(vec![
            reply("/daily/image/destroy", 500, "boom"),
            reply("/daily/resources/image/upload", 500, "rate limited"),
        ])
        .await;
        let store = store_at(&base);

        store.delete("editions/abc/page-001").await;
        store.delete_namespace("editions/abc").await;

        // A failed bulk round stops before the folder is touched.
        let lines = requests(&seen);
        assert_eq!(lines.len(), 2, "{lines:?}");
        assert!(lines[0].starts_with("POST /daily/image/destroy "));
        assert!(lines[1].starts_with("DELETE /daily/resources/image/upload?"));
    }

    #[tokio::test]
    async fn unreachable_api_fails_uploads_and_tolerates_deletes() {
        // Nothing listens on the discard port.
        let store = store_at("http://127.0.0.1:9");

        match store.upload(vec![1, 2, 3], "editions/abc", "page-001").await {
            Err(BroadsheetError::Upload(msg)) => assert!(msg.contains("editions/abc/page-001"), "{msg}"),
            other => panic!("expected Upload error, got {other:?}"),
        }
        store.delete("editions/abc/page-001").await;
        store.delete_namespace("editions/abc").await;
    }
}
