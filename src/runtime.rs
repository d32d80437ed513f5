//! Runtime for executing agent turns
//!
//! Glues the pure turn state machine to its I/O: the session store, the model
//! backend and the tool dispatcher.

mod dispatcher;
mod executor;
pub mod recovery;
pub mod traits;
mod turn;

#[cfg(test)]
pub mod testing;

pub use executor::{AgentConfig, AgentError, AgentRuntime};
pub use traits::*;

/// Runtime with concrete production implementations
pub type ProductionRuntime = AgentRuntime<DatabaseStorage>;
