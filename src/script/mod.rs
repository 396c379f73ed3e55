// Script runtime - compiled data model, sequencer state machine, scheduler

pub mod interp;
pub mod op;
pub mod scheduler;
pub mod sequencer;
pub mod value;

pub use interp::ExecError;
pub use op::{BinaryOp, Expr, OpSequence, Operation, UnaryOp};
pub use scheduler::Scheduler;
pub use sequencer::{ClockMode, RunState, Sequencer, SequencerId};
pub use value::Value;
