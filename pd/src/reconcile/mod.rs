//! Reconciliation engine - converge plugin directories to their specs

mod engine;
pub mod helptags;
mod state;

pub use engine::{CheckoutOptions, Reconciler};
pub use state::PluginState;
