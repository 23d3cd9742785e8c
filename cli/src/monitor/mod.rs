//! Deployment monitoring

pub mod deployment;
pub mod presenter;
