pub mod actor;
pub mod alerts;
pub mod commands;
pub mod events;
pub mod handle;
pub mod monitor;
pub mod reconcile;

pub use actor::EngineActor;
pub use alerts::AlertLog;
pub use commands::{EngineCommand, EngineMode, EngineState};
pub use events::{Alert, AlertKind, EngineStatus, PauseCause, Performance, PositionInfo};
pub use handle::EngineHandle;
pub use monitor::check_exit;
pub use reconcile::{ReconcileOutcome, ReconciledView, Reconciler};
