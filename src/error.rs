// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use thiserror::Error;

/// Error taxonomy for catalog and guide operations. Callers are expected to
/// catch these at the fetch-and-render boundary and report a status message
/// without touching existing session state.
#[derive(Debug, Error)]
pub enum Error {
    /// Network failure or timeout. The only retryable class.
    #[error("transport error: {0}")]
    Transport(String),

    /// Response bytes that are not valid JSON/XML.
    #[error("decode error: {0}")]
    Decode(String),

    /// Structurally valid response with an unexpected shape.
    #[error("validation error: {0}")]
    Validation(String),

    /// No category, series, or season matches the selection.
    #[error("not found: {0}")]
    NotFound(String),

    /// No guide channel matched above the acceptance threshold.
    #[error("no guide match for {0}")]
    NoCorrelation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        // Decode failures surfaced by reqwest (e.g. response.json()) are
        // classified separately so retry logic never replays them.
        if e.is_decode() {
            Error::Decode(e.to_string())
        } else {
            Error::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::Decode(e.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
