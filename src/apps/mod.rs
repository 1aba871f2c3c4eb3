pub mod liveness;

pub use liveness::{clear_to_mutate, AssumeStopped, Clearance, ProcessProbe, SystemProbe};
