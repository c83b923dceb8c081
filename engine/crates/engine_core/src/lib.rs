pub mod tick;

pub use tick::{spawn_tick_thread, JobOutcome, TickConfig, TickJob, TickLoop};
