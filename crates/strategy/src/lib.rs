pub mod bars;
pub mod trend;
pub mod triggers;

pub use bars::BarBuilder;
pub use trend::TrendDetector;
pub use triggers::{EntrySignal, EvalContext, TriggerEvaluator};
