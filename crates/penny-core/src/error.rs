use thiserror::Error;

/// Error taxonomy for the detection core.
///
/// Only configuration is genuinely fatal. "Unknown flow", "numerical
/// degenerate", "malformed packet identifier", and "I/O error" are designed
/// behaviors (auto-track, return undecided, log-and-skip, log-and-continue)
/// rather than failures, and are handled inline where they occur.
#[derive(Debug, Error)]
pub enum PennyError {
    #[error("configuration error: {0}")]
    Configuration(String),
}
