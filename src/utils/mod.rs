pub mod dropbox_path;
pub mod redact;
pub mod suggest;
pub mod text;
