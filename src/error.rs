//! Error types for Decibel operations.
//!
//! This module defines [`DecibelError`], the error type returned by every
//! declaration, graph and plan operation, and a [`Result`] type alias.
//!
//! # Error Handling Strategy
//!
//! - Every error is fatal for the plan being built; nothing is retried
//! - Errors surface at the declaration call that caused them
//! - Work unit bodies may return `anyhow::Error` (via `DecibelError::Other`)

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for Decibel operations.
#[derive(Debug, Error)]
pub enum DecibelError {
    /// Adding an ordering edge would close a cycle. The edge was rejected.
    #[error("Adding {from} -> {to} causes a cycle")]
    CycleIntroduced { from: String, to: String },

    /// A named ordering reference does not match any sibling member.
    #[error("Unresolved reference '{reference}' on '{unit}' in runbook '{runbook}'")]
    UnresolvedReference {
        runbook: String,
        unit: String,
        reference: String,
    },

    /// A work unit finished while guard conditions it opened were still open.
    #[error("Work unit '{unit}' finished with {open} guard condition(s) still open")]
    DanglingGuard { unit: String, open: usize },

    /// Malformed declaration or settings for the active mode.
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// The scheduler could not order every node. Edge validation should make
    /// this unreachable.
    #[error("Graph is not acyclic: sorted {sorted} of {nodes} nodes")]
    GraphNotAcyclic { sorted: usize, nodes: usize },

    /// Settings file not found at expected location.
    #[error("Settings not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Failed to parse settings file.
    #[error("Failed to parse settings at {path}: {message}")]
    ConfigParseError { path: PathBuf, message: String },

    /// Plan could not be serialized.
    #[error("Failed to serialize plan: {message}")]
    Serialization { message: String },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapped error for anyhow interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DecibelError {
    /// Shorthand for [`DecibelError::InvalidConfiguration`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }
}

/// Result type alias for Decibel operations.
pub type Result<T> = std::result::Result<T, DecibelError>;
