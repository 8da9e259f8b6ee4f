pub mod memory;
pub mod pagerduty;

pub use memory::MemoryProvider;
pub use pagerduty::{PagerDutyConfig, PagerDutyProvider};
