//! Recipes: fixed remote operation sequences against an app's machines
//!
//! A [`session::RecipeSession`] holds the tunnel for one invocation and
//! dispatches [`operation::RemoteOperation`]s strictly one at a time. Role
//! ordered recipes live in [`postgres`].

pub mod machines;
pub mod operation;
pub mod phase;
pub mod postgres;
pub mod provision;
pub mod roles;
pub mod session;
pub mod target;
