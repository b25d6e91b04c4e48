pub mod monitor;

pub use monitor::{SurvivalMonitor, SurvivalState};
