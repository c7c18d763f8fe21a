mod fanout;
mod outcome;
mod reconciler;
mod significance;
mod threading;

pub use fanout::Fanout;
pub use outcome::{BatchReport, ItemOutcome};
pub use reconciler::{ReconcileSettings, Reconciler};
pub use significance::SignificanceDetector;
pub use threading::Threader;
