pub mod config;
pub mod http;
pub mod signaling;
pub mod translation;
