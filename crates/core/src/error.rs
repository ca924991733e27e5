use thiserror::Error;

/// Typed rejections for engine commands. None of these crash the process;
/// only configuration errors prevent entry into Running.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("no trading configuration loaded")]
    ConfigMissing,

    #[error("a session is already running or paused")]
    AlreadyRunning,

    #[error("historical replay requires the market to be closed")]
    HistoricalRequiresMarketClosed,

    #[error("engine is not running")]
    NotRunning,

    #[error("engine is not paused")]
    NotPaused,

    #[error("broker session expired; re-authenticate before resuming")]
    AuthExpired,

    #[error("no untracked broker position in {0}")]
    UntrackedNotFound(String),
}

/// Brokerage collaborator failures. Auth expiry is separated out because it
/// forces the engine into Paused.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker session expired")]
    AuthExpired,

    #[error("order rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
