// mes-engine - runtime core of a music-synchronized scripting engine
// Cooperative scheduler advancing suspended script tasks one tick at a
// time, with ticks sourced from the host frame cadence or from a
// tempo-aware, audio-driven clock

pub mod engine;
pub mod script;
pub mod stage;
pub mod timing;

// Re-export commonly used types for convenience
pub use engine::{Engine, arm_termination_timeout};
pub use script::{
    BinaryOp, ClockMode, ExecError, Expr, OpSequence, Operation, RunState, Scheduler, SequencerId,
    UnaryOp, Value,
};
pub use stage::{NullStage, RecordingStage, StageBackend, StageCall, StageError};
pub use timing::{
    ClockConsumer, ClockEvent, ClockProducer, DEFAULT_PPQ, FrameClock, MidiClock,
    STEPS_PER_QUARTER, TempoChange, TempoMap, WALL_TICKS_PER_STEP, create_clock_channel,
};
