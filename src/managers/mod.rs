pub mod composite;
pub mod endpoint;
pub mod local;
