// HTTP client for the external records/auth application
//
// The records app owns authentication, record CRUD and file storage; the
// platform reads job inputs from it and writes job outputs back. All
// calls are synchronous HTTP with JSON bodies except record creation
// with files (multipart) and file download (streamed).

mod auth;
mod client;
mod error;
mod files;
mod health;
mod records;

pub use auth::AuthResponse;
pub use client::RecordsClient;
pub use error::{RecordsError, Result};
pub use files::DownloadOptions;
pub use health::HealthResponse;
pub use records::{BatchRequest, FileAttachment};
