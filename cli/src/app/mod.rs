//! Command wiring: options, context and command handlers

pub mod commands;
pub mod context;
pub mod options;
