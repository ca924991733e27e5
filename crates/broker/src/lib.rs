pub mod contracts;
pub mod paper;

pub use contracts::{monthly_expiry, select_contract, strike_for, trading_symbol};
pub use paper::PaperBroker;
