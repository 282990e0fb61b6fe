//! The three-step upload routine and the document convenience API.
//!
//! ```text
//! get upload server ──▶ transfer bytes ──▶ save
//!   (route.server)      (Transfer)        (route.save)
//! ```

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, instrument};

use bottle_core::{ApiError, BoxedApi};

use crate::error::{UploadError, UploadResult};
use crate::source::ByteSource;
use crate::transfer::Transfer;

/// The endpoints and scoping parameters of one kind of upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRoute {
    server_method: String,
    server_params: Map<String, Value>,
    save_method: String,
    field: String,
}

impl UploadRoute {
    /// Creates a route with no scoping parameters and the `file` field.
    pub fn new(server_method: impl Into<String>, save_method: impl Into<String>) -> Self {
        Self {
            server_method: server_method.into(),
            server_params: Map::new(),
            save_method: save_method.into(),
            field: "file".to_string(),
        }
    }

    /// Adds a scoping parameter for the upload server call.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.server_params.insert(key.into(), value.into());
        self
    }

    /// Sets the multipart field the bytes are sent in.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    /// `docs.getUploadServer`, scoped to a group if given.
    pub fn doc(group_id: Option<i64>) -> Self {
        Self::new("docs.getUploadServer", "docs.save").with_group(group_id)
    }

    /// `docs.getWallUploadServer`, scoped to a group if given.
    pub fn doc_wall(group_id: Option<i64>) -> Self {
        Self::new("docs.getWallUploadServer", "docs.save").with_group(group_id)
    }

    /// `docs.getMessagesUploadServer` for a peer; `doc_type` is usually
    /// `doc` or `audio_message`.
    pub fn doc_message(peer_id: i64, doc_type: &str) -> Self {
        Self::new("docs.getMessagesUploadServer", "docs.save")
            .with_param("type", doc_type)
            .with_param("peer_id", peer_id)
    }

    fn with_group(self, group_id: Option<i64>) -> Self {
        match group_id {
            Some(group_id) => self.with_param("group_id", group_id),
            None => self,
        }
    }

    pub fn server_method(&self) -> &str {
        &self.server_method
    }

    pub fn save_method(&self) -> &str {
        &self.save_method
    }
}

/// The result of an upload.
#[derive(Debug, Clone, PartialEq)]
pub enum Uploaded {
    /// `"<type><owner_id>_<id>"`, ready to be attached to a message.
    Attachment(String),
    /// The saved descriptor.
    Raw(Value),
}

impl Uploaded {
    pub fn as_attachment(&self) -> Option<&str> {
        match self {
            Self::Attachment(attachment) => Some(attachment),
            Self::Raw(_) => None,
        }
    }
}

/// Runs uploads through an [`Api`](bottle_core::Api) and a [`Transfer`].
#[derive(Clone)]
pub struct Uploader {
    api: BoxedApi,
    transfer: Arc<dyn Transfer>,
    generate_attachment_strings: bool,
}

impl Uploader {
    /// Creates an uploader that returns attachment strings.
    pub fn new(api: BoxedApi, transfer: Arc<dyn Transfer>) -> Self {
        Self {
            api,
            transfer,
            generate_attachment_strings: true,
        }
    }

    /// Sets whether uploads return attachment strings or raw descriptors.
    pub fn generate_attachment_strings(mut self, enabled: bool) -> Self {
        self.generate_attachment_strings = enabled;
        self
    }

    pub fn generates_attachment_strings(&self) -> bool {
        self.generate_attachment_strings
    }

    /// Uploads `source` along `route`.
    ///
    /// `params` are sent with the transfer and merged into the save call,
    /// where they take precedence over the transfer's response.
    #[instrument(skip_all, fields(server = %route.server_method))]
    pub async fn upload(
        &self,
        route: &UploadRoute,
        source: &ByteSource,
        params: Map<String, Value>,
    ) -> UploadResult<Uploaded> {
        let server = self
            .api
            .request(&route.server_method, Value::Object(route.server_params.clone()))
            .await
            .map_err(UploadError::ServerAcquisition)?;
        let upload_url = server
            .get("upload_url")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                UploadError::ServerAcquisition(ApiError::Other(format!(
                    "{} response lacks upload_url",
                    route.server_method
                )))
            })?;

        let opened = source.open().await?;
        let transferred = self
            .transfer
            .transfer(upload_url, &route.field, opened, &params)
            .await?;
        debug!(upload_url, "Transfer complete");

        let mut save_params = match transferred {
            Value::Object(map) => map,
            other => {
                return Err(UploadError::MalformedResponse(format!(
                    "upload server answered with a non-object: {other}"
                )));
            }
        };
        save_params.extend(params);

        let saved = self
            .api
            .request(&route.save_method, Value::Object(save_params))
            .await
            .map_err(UploadError::Save)?;

        if self.generate_attachment_strings {
            attachment_string(&saved).map(Uploaded::Attachment)
        } else {
            Ok(Uploaded::Raw(descriptor(&saved).cloned().unwrap_or(saved)))
        }
    }
}

impl std::fmt::Debug for Uploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uploader")
            .field("generate_attachment_strings", &self.generate_attachment_strings)
            .finish_non_exhaustive()
    }
}

/// The sub-object keyed by the saved response's `type`.
fn descriptor(saved: &Value) -> Option<&Value> {
    let kind = saved.get("type")?.as_str()?;
    saved.get(kind)
}

fn attachment_string(saved: &Value) -> UploadResult<String> {
    let malformed = |what: &str| UploadError::MalformedResponse(format!("saved descriptor lacks {what}"));

    let kind = saved
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("type"))?;
    let descriptor = saved.get(kind).ok_or_else(|| malformed(kind))?;
    let owner_id = descriptor
        .get("owner_id")
        .and_then(Value::as_i64)
        .ok_or_else(|| malformed("owner_id"))?;
    let id = descriptor
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| malformed("id"))?;
    Ok(format!("{kind}{owner_id}_{id}"))
}

/// Document uploads.
#[derive(Debug, Clone)]
pub struct DocUploader {
    uploader: Uploader,
}

impl DocUploader {
    pub fn new(uploader: Uploader) -> Self {
        Self { uploader }
    }

    /// Uploads a document to the group's or user's documents.
    pub async fn upload_doc(
        &self,
        source: &ByteSource,
        group_id: Option<i64>,
        params: Map<String, Value>,
    ) -> UploadResult<Uploaded> {
        self.uploader
            .upload(&UploadRoute::doc(group_id), source, params)
            .await
    }

    /// Uploads a document for a wall post.
    pub async fn upload_doc_to_wall(
        &self,
        source: &ByteSource,
        group_id: Option<i64>,
        params: Map<String, Value>,
    ) -> UploadResult<Uploaded> {
        self.uploader
            .upload(&UploadRoute::doc_wall(group_id), source, params)
            .await
    }

    /// Uploads a document to be sent to `peer_id`.
    pub async fn upload_doc_to_message(
        &self,
        source: &ByteSource,
        peer_id: i64,
        doc_type: &str,
        params: Map<String, Value>,
    ) -> UploadResult<Uploaded> {
        self.uploader
            .upload(&UploadRoute::doc_message(peer_id, doc_type), source, params)
            .await
    }

    pub fn uploader(&self) -> &Uploader {
        &self.uploader
    }
}
