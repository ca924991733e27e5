use chrono::NaiveDate;
use optionbot_core::error::EngineError;
use optionbot_core::types::OptionSide;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::events::EngineStatus;

/// Where ticks come from for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineMode {
    /// Real feed, market-hours driven.
    Live,
    /// Recorded-data replay; only permitted while the market is closed.
    Historical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EngineState {
    #[default]
    Stopped,
    Running,
    Paused,
}

type Reply = oneshot::Sender<Result<(), EngineError>>;

/// Commands accepted by the engine actor. Every command serializes through
/// one mpsc channel, so state transitions never race each other.
#[derive(Debug)]
pub enum EngineCommand {
    Start {
        mode: EngineMode,
        contract_expiry: Option<NaiveDate>,
        reply: Reply,
    },
    Pause {
        reply: Reply,
    },
    Resume {
        reply: Reply,
    },
    Stop {
        reply: Reply,
    },
    SetSuspension {
        side: OptionSide,
        suspended: bool,
        reply: Reply,
    },
    /// Operator adoption of a broker position the engine never initiated.
    AdoptUntracked {
        trading_symbol: String,
        reply: Reply,
    },
    GetStatus {
        reply: oneshot::Sender<EngineStatus>,
    },
    /// Broker session expired (token invalid). Forces Paused.
    AuthExpired,
    /// Operator re-authenticated; clears the resume gate.
    AuthRestored,
    /// Terminates the actor itself (stops any active session first).
    Shutdown,
}
