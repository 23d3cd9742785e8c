//! deckhand library
//!
//! Recipe execution, log streaming and deployment monitoring against a
//! machines control plane.

pub mod app;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod logstream;
pub mod monitor;
pub mod recipes;
pub mod storage;
pub mod tasks;
pub mod tunnel;
pub mod utils;
