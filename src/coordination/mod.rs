//! Coordination primitives
//!
//! - gate: named single-slot wait/notify registry used to order manifest and
//!   bundle arrival
//! - dispatch: the serialized main context all loader state lives on

pub mod dispatch;
pub mod gate;

pub use dispatch::{InlineContext, Job, MainContext, SerialDispatcher, run_on_main};
pub use gate::AsyncGate;
