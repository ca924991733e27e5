use anyhow::{Context, Result};
use chrono::NaiveDate;
use optionbot_core::types::OptionSide;
use tokio::sync::{mpsc, oneshot, watch};

use crate::commands::{EngineCommand, EngineMode};
use crate::events::EngineStatus;

/// Clonable handle to a running engine actor.
///
/// Command methods round-trip through the actor and surface its typed
/// rejections (`EngineError`) through `anyhow`, so callers can downcast
/// when they care which rule fired.
#[derive(Clone)]
pub struct EngineHandle {
    command_tx: mpsc::Sender<EngineCommand>,
    status_rx: watch::Receiver<EngineStatus>,
}

impl EngineHandle {
    pub(crate) fn new(
        command_tx: mpsc::Sender<EngineCommand>,
        status_rx: watch::Receiver<EngineStatus>,
    ) -> Self {
        Self {
            command_tx,
            status_rx,
        }
    }

    /// Starts a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the transition or the actor is
    /// gone.
    pub async fn start(&self, mode: EngineMode, contract_expiry: Option<NaiveDate>) -> Result<()> {
        self.round_trip(|reply| EngineCommand::Start {
            mode,
            contract_expiry,
            reply,
        })
        .await
    }

    /// # Errors
    ///
    /// Returns an error if the engine is not running.
    pub async fn pause(&self) -> Result<()> {
        self.round_trip(|reply| EngineCommand::Pause { reply }).await
    }

    /// # Errors
    ///
    /// Returns an error if the engine is not paused, or the pause was forced
    /// by auth expiry and the operator has not re-authenticated.
    pub async fn resume(&self) -> Result<()> {
        self.round_trip(|reply| EngineCommand::Resume { reply })
            .await
    }

    /// Squares off and tears the session down. Idempotent: stopping a
    /// stopped engine is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the actor is gone.
    pub async fn stop(&self) -> Result<()> {
        self.round_trip(|reply| EngineCommand::Stop { reply }).await
    }

    /// # Errors
    ///
    /// Returns an error if no session is active.
    pub async fn set_suspension(&self, side: OptionSide, suspended: bool) -> Result<()> {
        self.round_trip(|reply| EngineCommand::SetSuspension {
            side,
            suspended,
            reply,
        })
        .await
    }

    /// # Errors
    ///
    /// Returns an error if the symbol is not currently untracked.
    pub async fn adopt_untracked(&self, trading_symbol: impl Into<String>) -> Result<()> {
        let trading_symbol = trading_symbol.into();
        self.round_trip(|reply| EngineCommand::AdoptUntracked {
            trading_symbol,
            reply,
        })
        .await
    }

    /// Signals that the broker session expired. Fire-and-forget: the forced
    /// pause happens inside the actor and wins any racing resume.
    pub async fn auth_expired(&self) -> Result<()> {
        self.command_tx
            .send(EngineCommand::AuthExpired)
            .await
            .context("engine actor is gone")
    }

    pub async fn auth_restored(&self) -> Result<()> {
        self.command_tx
            .send(EngineCommand::AuthRestored)
            .await
            .context("engine actor is gone")
    }

    /// Full status round-trip through the actor (includes fresh feed health).
    ///
    /// # Errors
    ///
    /// Returns an error if the actor is gone.
    pub async fn status(&self) -> Result<EngineStatus> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(EngineCommand::GetStatus { reply })
            .await
            .context("engine actor is gone")?;
        rx.await.context("engine actor dropped the reply")
    }

    /// Last published status without a round-trip.
    #[must_use]
    pub fn last_status(&self) -> EngineStatus {
        self.status_rx.borrow().clone()
    }

    /// Stops any active session and terminates the actor.
    pub async fn shutdown(&self) -> Result<()> {
        self.command_tx
            .send(EngineCommand::Shutdown)
            .await
            .context("engine actor is gone")
    }

    async fn round_trip<F>(&self, make: F) -> Result<()>
    where
        F: FnOnce(oneshot::Sender<Result<(), optionbot_core::error::EngineError>>) -> EngineCommand,
    {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(make(reply))
            .await
            .context("engine actor is gone")?;
        rx.await.context("engine actor dropped the reply")??;
        Ok(())
    }
}
