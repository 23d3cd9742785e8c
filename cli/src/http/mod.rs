//! Control-plane API client

pub mod api;
pub mod apps;
pub mod client;
pub mod deployments;
pub mod logs;
pub mod machines;
