//! Fleet state management.
//!
//! This module is the single source of truth for live game-server instances.
//! It owns the instance registry and the reserved-port set, and generates the
//! human-readable names instances are addressed by.

mod namegen;
mod state;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use namegen::*;
pub use state::*;
