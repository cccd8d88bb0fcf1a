// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the engine.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum RestaticError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Operation not allowed in the current state: {0}")]
    InvalidState(String),

    #[error("Unknown callback '{0}'")]
    CallbackNotFound(String),

    #[error("Callback '{0}' is already registered")]
    CallbackExists(String),

    #[error("Invalid callback name '{0}'")]
    InvalidCallbackName(String),

    #[error("Locking Error: {0}")]
    LockingError(String),

    #[error("Store Error: {0}")]
    StoreError(String),

    #[error("Dispatch Error: {0}")]
    DispatchError(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Internal Error: {0}")]
    Internal(String),
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
// We wrap it in an Arc to allow for cheap, shared cloning.
impl Clone for RestaticError {
    fn clone(&self) -> Self {
        match self {
            RestaticError::Io(e) => RestaticError::Io(Arc::clone(e)),
            RestaticError::Serialization(s) => RestaticError::Serialization(s.clone()),
            RestaticError::InvalidRequest(s) => RestaticError::InvalidRequest(s.clone()),
            RestaticError::InvalidState(s) => RestaticError::InvalidState(s.clone()),
            RestaticError::CallbackNotFound(s) => RestaticError::CallbackNotFound(s.clone()),
            RestaticError::CallbackExists(s) => RestaticError::CallbackExists(s.clone()),
            RestaticError::InvalidCallbackName(s) => RestaticError::InvalidCallbackName(s.clone()),
            RestaticError::LockingError(s) => RestaticError::LockingError(s.clone()),
            RestaticError::StoreError(s) => RestaticError::StoreError(s.clone()),
            RestaticError::DispatchError(s) => RestaticError::DispatchError(s.clone()),
            RestaticError::GenerationFailed(s) => RestaticError::GenerationFailed(s.clone()),
            RestaticError::Internal(s) => RestaticError::Internal(s.clone()),
        }
    }
}

impl PartialEq for RestaticError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RestaticError::Io(e1), RestaticError::Io(e2)) => e1.to_string() == e2.to_string(),
            (RestaticError::Serialization(s1), RestaticError::Serialization(s2)) => s1 == s2,
            (RestaticError::InvalidRequest(s1), RestaticError::InvalidRequest(s2)) => s1 == s2,
            (RestaticError::InvalidState(s1), RestaticError::InvalidState(s2)) => s1 == s2,
            (RestaticError::CallbackNotFound(s1), RestaticError::CallbackNotFound(s2)) => s1 == s2,
            (RestaticError::CallbackExists(s1), RestaticError::CallbackExists(s2)) => s1 == s2,
            (RestaticError::InvalidCallbackName(s1), RestaticError::InvalidCallbackName(s2)) => {
                s1 == s2
            }
            (RestaticError::LockingError(s1), RestaticError::LockingError(s2)) => s1 == s2,
            (RestaticError::StoreError(s1), RestaticError::StoreError(s2)) => s1 == s2,
            (RestaticError::DispatchError(s1), RestaticError::DispatchError(s2)) => s1 == s2,
            (RestaticError::GenerationFailed(s1), RestaticError::GenerationFailed(s2)) => s1 == s2,
            (RestaticError::Internal(s1), RestaticError::Internal(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for RestaticError {
    fn from(e: std::io::Error) -> Self {
        RestaticError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for RestaticError {
    fn from(e: serde_json::Error) -> Self {
        RestaticError::Serialization(e.to_string())
    }
}

impl From<uuid::Error> for RestaticError {
    fn from(e: uuid::Error) -> Self {
        RestaticError::Internal(format!("Failed to generate UUID: {e}"))
    }
}

impl From<std::string::FromUtf8Error> for RestaticError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        RestaticError::Serialization(e.to_string())
    }
}
