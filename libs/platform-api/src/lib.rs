//! Platform API wire models
//!
//! Types exchanged with the control-plane REST API.

pub mod models;

pub use models::*;
