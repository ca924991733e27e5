pub mod reconnect;
pub mod replay;
pub mod session;
pub mod switch;
pub mod ws;

pub use reconnect::{ConnState, FailureOutcome, ReconnectPolicy, ReconnectTracker};
pub use replay::ReplaySource;
pub use session::SessionMonitor;
pub use switch::{DataAcquisitionSwitch, FeedEvent, FeedHealth, FeedMode, FeedSnapshot};
pub use ws::WsMarketData;
