//! Error types for callscope-core

use thiserror::Error;

/// Main error type for the callscope-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Credential decryption error
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Telephony API error
    #[error("telephony error: {0}")]
    Telephony(String),

    /// Transcription engine error
    #[error("transcription error: {0}")]
    Transcription(String),

    /// LLM error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Discovery run error (fatal, run-level)
    #[error("discovery error: {0}")]
    Discovery(String),

    /// Compliance sync error
    #[error("compliance sync error: {0}")]
    Compliance(String),

    /// Session not found
    #[error("session not found: {0}")]
    SessionNotFound(String),
}

/// Result type alias for callscope-core
pub type Result<T> = std::result::Result<T, Error>;
