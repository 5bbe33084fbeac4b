pub mod pool;

pub use pool::{Work, WorkerPool};
