//! `ludocore::error` is a module containing error utilities for the ludocore project.

use std::{
    error::Error,
    fmt::{self, Display},
};

use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a ludocore-related operation.
pub type LudocoreResult<T> = Result<T, LudocoreError>;

/// An error that occurred during a ludocore operation.
#[derive(pretty_error_debug::Debug, Error)]
pub enum LudocoreError {
    /// A request or argument failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Authentication failed (missing or invalid credentials).
    #[error("authentication error: {0}")]
    Auth(String),

    /// The named resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation conflicts with existing state (e.g. a port already in use).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The container runtime reported a failure.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// An image build failed; the message carries the captured build output.
    #[error("build failed: {0}")]
    Build(String),

    /// An admission token failed verification.
    #[error("token error: {0}")]
    Token(#[from] TokenError),

    /// A required subsystem is not available.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// An error that occurred when performing an IO operation.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error from the event-log database.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An error from an outbound HTTP call.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Custom error.
    #[error("Custom error: {0}")]
    Custom(#[from] AnyError),
}

/// The ways an admission token can fail verification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// The token does not have the `payload.signature` shape or is not valid base64/JSON.
    #[error("malformed token")]
    Malformed,

    /// The signature does not match the payload under the current secret.
    #[error("invalid token signature")]
    InvalidSignature,

    /// The embedded expiry is in the past.
    #[error("token expired")]
    Expired,
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LudocoreError {
    /// Creates a new `Err` result.
    pub fn custom(error: impl Into<anyhow::Error>) -> LudocoreError {
        LudocoreError::Custom(AnyError {
            error: error.into(),
        })
    }
}

impl AnyError {
    /// Downcasts the error to a `T`.
    pub fn downcast<T>(&self) -> Option<&T>
    where
        T: Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<T>()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates an `Ok` `LudocoreResult`.
#[allow(non_snake_case)]
pub fn Ok<T>(value: T) -> LudocoreResult<T> {
    Result::Ok(value)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl PartialEq for AnyError {
    fn eq(&self, other: &Self) -> bool {
        self.error.to_string() == other.error.to_string()
    }
}

impl Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error for AnyError {}
