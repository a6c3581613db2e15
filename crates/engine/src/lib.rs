pub mod oanda;
pub mod pipeline;
pub mod scheduler;
pub mod slots;

pub use oanda::OandaClient;
pub use pipeline::{EvaluationOutcome, SignalPipeline};
pub use scheduler::{EvaluationScheduler, TickDecision};
pub use slots::{DedupKey, ProcessedSlots};
