//! The one HTTP helper every tool goes through.

pub mod client;
pub mod content_hash;
pub mod endpoint;
pub mod header_arg;
pub mod response;

pub use client::{CallOptions, DropboxClient, Download};
pub use endpoint::{AuthMode, Endpoint, Pagination, Style};
