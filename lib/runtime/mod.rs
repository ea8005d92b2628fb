//! The boundary to the external container runtime.
//!
//! [`DockerCli`] is the only component in the crate that spawns external
//! processes; everything it passes on a command line has been through
//! [`crate::validate`] first. The occupancy poller and the recipe manager
//! live here too since both exist to feed or feed off the runtime.

mod docker;
mod poller;
mod recipes;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use docker::*;
pub use poller::*;
pub use recipes::*;
