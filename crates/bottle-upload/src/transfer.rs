//! The byte transfer step of an upload.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::UploadResult;
use crate::source::OpenedSource;

/// Sends an opened source to an upload server.
///
/// The returned JSON is what the upload server answered; the pipeline passes
/// it on to the save call. The source is consumed and released when the
/// transfer returns.
#[async_trait]
pub trait Transfer: Send + Sync {
    async fn transfer(
        &self,
        upload_url: &str,
        field: &str,
        source: OpenedSource,
        params: &Map<String, Value>,
    ) -> UploadResult<Value>;
}

#[cfg(feature = "http-transfer")]
pub use http::HttpTransfer;

#[cfg(feature = "http-transfer")]
mod http {
    use async_trait::async_trait;
    use reqwest::multipart::{Form, Part};
    use serde_json::{Map, Value};
    use tracing::debug;

    use super::Transfer;
    use crate::error::{UploadError, UploadResult};
    use crate::source::OpenedSource;

    /// A multipart [`Transfer`] over reqwest.
    ///
    /// Caller parameters are sent as additional text fields.
    #[derive(Debug, Clone, Default)]
    pub struct HttpTransfer {
        client: reqwest::Client,
    }

    impl HttpTransfer {
        pub fn new() -> Self {
            Self::default()
        }

        /// Uses an existing client, e.g. one with a configured timeout.
        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    #[async_trait]
    impl Transfer for HttpTransfer {
        async fn transfer(
            &self,
            upload_url: &str,
            field: &str,
            source: OpenedSource,
            params: &Map<String, Value>,
        ) -> UploadResult<Value> {
            let name = source.name().to_string();
            let size = source.len();
            let part = Part::stream_with_length(source.into_data(), size as u64).file_name(name);
            let mut form = Form::new().part(field.to_string(), part);
            for (key, value) in params {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                form = form.text(key.clone(), text);
            }

            debug!(url = %upload_url, size, "Transferring upload");
            let response = self
                .client
                .post(upload_url)
                .multipart(form)
                .send()
                .await
                .map_err(|e| UploadError::Transfer(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(UploadError::Transfer(format!(
                    "HTTP {} error: {}",
                    status.as_u16(),
                    text
                )));
            }
            response
                .json()
                .await
                .map_err(|e| UploadError::Transfer(e.to_string()))
        }
    }
}
