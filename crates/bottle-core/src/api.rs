//! The platform API seam.
//!
//! The core never talks HTTP itself. Everything that needs the platform goes
//! through an [`Api`] implementation supplied by the application: uploads
//! acquire servers and save media through it, the default return manager
//! sends replies through it, and handlers receive it on their context for
//! follow-up calls.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;

use crate::error::{ApiError, ApiResult};

/// A platform API client.
///
/// `request` takes the method name (e.g. `"messages.send"`) and a JSON object
/// of parameters, and returns the unwrapped response payload. Implementations
/// report platform-level failures as [`ApiError::Upstream`]; see
/// [`unwrap_response`] for the usual envelope handling.
#[async_trait]
pub trait Api: Send + Sync {
    /// Calls `method` with `params`.
    async fn request(&self, method: &str, params: Value) -> ApiResult<Value>;
}

/// A type-erased, shareable API client.
pub type BoxedApi = Arc<dyn Api>;

/// Typed helpers on top of [`Api`].
#[async_trait]
pub trait ApiExt: Api {
    /// Calls `method` and deserializes the payload into `T`.
    async fn request_as<T>(&self, method: &str, params: Value) -> ApiResult<T>
    where
        T: DeserializeOwned + Send,
    {
        let value = self.request(method, params).await?;
        Ok(serde_json::from_value(value)?)
    }
}

impl<A: Api + ?Sized> ApiExt for A {}

/// Unwraps the platform response envelope.
///
/// - `{"response": x}` yields `x`
/// - `{"error": {"error_code": c, "error_msg": m}}` yields [`ApiError::Upstream`]
/// - anything else is returned unchanged
pub fn unwrap_response(body: Value) -> ApiResult<Value> {
    match body {
        Value::Object(mut map) => {
            if let Some(error) = map.remove("error") {
                let code = error.get("error_code").and_then(Value::as_i64).unwrap_or(0);
                let message = error
                    .get("error_msg")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string();
                trace!(code, %message, "API responded with error envelope");
                return Err(ApiError::Upstream { code, message });
            }
            match map.remove("response") {
                Some(response) => Ok(response),
                None => Ok(Value::Object(map)),
            }
        }
        other => Ok(other),
    }
}
