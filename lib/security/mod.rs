//! Admission-plane primitives: API key, sessions, CSRF tokens, security
//! headers, and the dashboard TLS material.

mod apikey;
mod csrf;
mod headers;
mod session;
mod tls;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use apikey::*;
pub use csrf::*;
pub use headers::*;
pub use session::*;
pub use tls::*;
