//! Project archive upload.

use std::sync::Arc;

use async_trait::async_trait;
use gradebox_core::{BlobStore, TransportError, TransportResult, TransportSession, UploadOptions};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::client::{check, GatewayClient};
use crate::config::url_for;
use crate::{GatewayError, Result};

pub(crate) const ACCESS_KEY_HEADER: &str = "x-gradebox-access-key";
pub(crate) const SECRET_KEY_HEADER: &str = "x-gradebox-secret-key";
pub(crate) const EXPIRES_HEADER: &str = "x-gradebox-expires";
pub(crate) const META_PREFIX: &str = "x-gradebox-meta-";

#[derive(Debug, Deserialize)]
struct UploadReceipt {
    key: String,
}

/// Blob store backed by `PUT /v1/objects/{key}`.
#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    client: Arc<GatewayClient>,
}

impl HttpBlobStore {
    pub(crate) fn new(client: Arc<GatewayClient>) -> Self {
        Self { client }
    }

    async fn put(
        &self,
        session: &TransportSession,
        body: Vec<u8>,
        key: &str,
        options: &UploadOptions,
    ) -> Result<String> {
        let url = url_for(&self.client.config.endpoint, &["v1", "objects", key])?;
        let response = self
            .client
            .unary(Method::PUT, url)
            .headers(upload_headers(session, options)?)
            .body(body)
            .send()
            .await?;
        let receipt: UploadReceipt = check(response).await?.json().await?;
        Ok(receipt.key)
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| GatewayError::Config(format!("value not allowed in a header: {:?}", value)))
}

fn upload_headers(session: &TransportSession, options: &UploadOptions) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, header_value(&options.content_type)?);
    headers.insert(
        HeaderName::from_static(ACCESS_KEY_HEADER),
        header_value(&session.access_key)?,
    );
    headers.insert(
        HeaderName::from_static(SECRET_KEY_HEADER),
        header_value(&session.secret_key)?,
    );
    headers.insert(
        HeaderName::from_static(EXPIRES_HEADER),
        header_value(&options.expires_at.to_rfc3339())?,
    );
    for (name, value) in &options.metadata {
        let name = HeaderName::try_from(format!("{}{}", META_PREFIX, name.to_lowercase()))
            .map_err(|_| GatewayError::Config(format!("invalid metadata key: {}", name)))?;
        headers.insert(name, header_value(value)?);
    }
    Ok(headers)
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    #[instrument(skip(self, session, body, options), fields(bytes = body.len()))]
    async fn upload(
        &self,
        session: &TransportSession,
        body: Vec<u8>,
        key: &str,
        options: UploadOptions,
    ) -> TransportResult<String> {
        let stored = self
            .put(session, body, key, &options)
            .await
            .map_err(|e| TransportError::Upload {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        debug!(key = %stored, "object stored");
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gradebox_core::SessionId;
    use std::collections::BTreeMap;

    #[test]
    fn headers_carry_credentials_and_metadata() {
        let session = TransportSession {
            session_id: SessionId::from("s-1"),
            access_key: "AK".to_string(),
            secret_key: "SK".to_string(),
            issued_at: Utc::now(),
        };
        let options = UploadOptions {
            expires_at: Utc::now(),
            content_type: "application/gzip".to_string(),
            metadata: BTreeMap::from([("type".to_string(), "user_upload".to_string())]),
        };

        let headers = upload_headers(&session, &options).unwrap();
        assert_eq!(headers[CONTENT_TYPE], "application/gzip");
        assert_eq!(headers[ACCESS_KEY_HEADER], "AK");
        assert_eq!(headers["x-gradebox-meta-type"], "user_upload");
        assert!(headers.contains_key(EXPIRES_HEADER));
    }

    #[test]
    fn control_characters_are_rejected() {
        let session = TransportSession {
            session_id: SessionId::from("s-1"),
            access_key: "bad\nkey".to_string(),
            secret_key: "SK".to_string(),
            issued_at: Utc::now(),
        };
        let options = UploadOptions {
            expires_at: Utc::now(),
            content_type: "application/gzip".to_string(),
            metadata: BTreeMap::new(),
        };
        assert!(matches!(
            upload_headers(&session, &options),
            Err(GatewayError::Config(_))
        ));
    }
}
