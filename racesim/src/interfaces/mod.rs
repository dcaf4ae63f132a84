pub mod control;
pub mod snapshot;
