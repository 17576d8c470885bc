//! Errors surfaced by the LYRA2 mining API.

/// Failure outcomes of the remote sealer.
///
/// Rejected work submissions are not errors; `submit_work` reports them as
/// `false` without saying why.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Remote mining is disabled on this node
    #[error("not supported")]
    Unsupported,
    /// The sealer has shut down
    #[error("lyra2 stopped")]
    Stopped,
    /// No block template has been installed yet
    #[error("no mining work available yet")]
    NoWorkAvailable,
    /// Request/response plumbing broke while the sealer was still running
    #[error("internal sealer error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
