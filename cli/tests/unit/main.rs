//! Integration tests for deckhand
//!
//! Every test runs against in-memory fakes of the control plane, the tunnel
//! agent and the live log source; nothing here touches the network.

mod test_monitor;
mod test_polling;
mod test_provision;
mod test_recipes;
