// Timing - tempo-aware tick calculation and the two clock sources

pub mod frame_clock;
pub mod midi_clock;
pub mod tempo_map;

pub use frame_clock::FrameClock;
pub use midi_clock::{ClockConsumer, ClockEvent, ClockProducer, MidiClock, create_clock_channel};
pub use tempo_map::{TempoChange, TempoMap};

/// Ticks per script step in wall-clock mode.
pub const WALL_TICKS_PER_STEP: u32 = 12;

/// Default MIDI resolution (pulses per quarter note).
pub const DEFAULT_PPQ: u32 = 480;

/// Script steps per quarter note in MIDI-synced mode, so
/// `ticks_per_step = ppq / STEPS_PER_QUARTER` (60 at the default PPQ).
pub const STEPS_PER_QUARTER: u32 = 8;
