pub mod alert_scheduler;

pub use alert_scheduler::{AlertScheduler, CycleError, spawn_alert_scheduler};
