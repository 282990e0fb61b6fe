//! # Bottle Upload
//!
//! The media upload pipeline of the Bottle bot framework.
//!
//! Every upload takes the same three steps: ask the platform for an upload
//! server, transfer the bytes there, then save the result. [`Uploader`] runs
//! these steps for any [`UploadRoute`]; [`DocUploader`] only picks routes.
//!
//! # Features
//!
//! - `http-transfer`: [`HttpTransfer`], a reqwest multipart [`Transfer`]

pub mod error;
pub mod source;
pub mod transfer;
pub mod uploader;

pub use error::{UploadError, UploadResult};
pub use source::{ByteSource, OpenedSource};
pub use transfer::Transfer;
pub use uploader::{DocUploader, UploadRoute, Uploaded, Uploader};

#[cfg(feature = "http-transfer")]
pub use transfer::HttpTransfer;
