// streamcore-core/src/tasks/mod.rs

pub mod supervisor;

pub use supervisor::{StopSignal, Supervisor};
