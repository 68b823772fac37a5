use thiserror::Error;

use crate::transport::TransportError;

/// Errors that can terminate a single file's WUP download session.
///
/// The per-file engine surfaces the first error it hits and stops; it never
/// continues streaming after a failure (spec: propagation is fail-fast per
/// file, with the driver aggregating pass/fail counts across files).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EngineError {
    #[error("file is empty")]
    EmptyFile,

    #[error("failed to open file")]
    FileOpen(#[source] std::io::Error),

    #[error("short read from file")]
    ShortRead(#[source] std::io::Error),

    #[error("negotiate failed: status={status:#04x} state={state:#04x}")]
    Negotiate { status: u8, state: u8 },

    #[error("short write to bulk endpoint: expected {expected}, sent {actual}")]
    ShortWrite { expected: usize, actual: usize },

    #[error(
        "checkpoint mismatch: status={status:#04x} device_written={written_bytes} host_cumulative={cumulative}"
    )]
    SyncMismatch {
        status: u8,
        written_bytes: u64,
        cumulative: u64,
    },

    #[error("integrity check rejected: status={status:#04x} state={state:#04x}")]
    IntegrityCheck { status: u8, state: u8 },

    #[error("update start rejected: status={status:#04x} state={state:#04x}")]
    UpdateStart { status: u8, state: u8 },

    #[error("USB transport error")]
    Transport(#[from] TransportError),
}

impl EngineError {
    /// The phase name used in the one-line diagnostic the driver prints,
    /// e.g. `"stream: short write: expected 4096, sent 2048"`.
    pub fn phase(&self) -> &'static str {
        match self {
            EngineError::EmptyFile | EngineError::FileOpen(_) | EngineError::ShortRead(_) => {
                "preflight"
            }
            EngineError::Negotiate { .. } => "negotiate",
            EngineError::ShortWrite { .. } => "stream",
            EngineError::SyncMismatch { .. } => "sync",
            EngineError::IntegrityCheck { .. } => "integrity",
            EngineError::UpdateStart { .. } => "apply",
            EngineError::Transport(_) => "transport",
        }
    }
}

/// Errors from streaming an MD5 digest over a file path.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Md5Error {
    #[error("failed to open file for hashing")]
    FileOpen(#[source] std::io::Error),

    #[error("failed to read file while hashing")]
    Read(#[source] std::io::Error),
}
