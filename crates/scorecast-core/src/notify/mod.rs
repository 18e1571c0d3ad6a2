pub mod decision;
pub mod dispatch;
pub mod driver;
pub mod engine;
pub mod format;
pub mod settings;

pub use driver::BatchReport;
pub use engine::{GameOutcome, Notifier, NotifierOptions};
