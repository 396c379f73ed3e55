// Scheduler - owns the sequencer collection and the shared variable store
// One coarse lock spans registration and dispatch; registration is O(1)
// (the compiled body arrives behind an Arc) and never blocks on script size

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{info, warn};

use super::interp::{self, ExecCtx};
use super::op::OpSequence;
use super::sequencer::{ClockMode, RunState, Sequencer, SequencerId};
use super::value::Value;
use crate::stage::StageBackend;
use crate::timing::{DEFAULT_PPQ, STEPS_PER_QUARTER, WALL_TICKS_PER_STEP};

struct SchedulerInner {
    sequencers: Vec<Sequencer>,
    globals: HashMap<String, Value>,
    next_id: SequencerId,
    midi_ppq: u32,
}

/// The dispatch core. Holds every registered sequencer in registration
/// order, the global variable store, and the termination flag. Multiple
/// independent instances may coexist; all state lives in the value.
pub struct Scheduler {
    inner: Mutex<SchedulerInner>,
    stage: Mutex<Box<dyn StageBackend>>,
    terminated: Arc<AtomicBool>,
    midi_ended: AtomicBool,
}

impl Scheduler {
    pub fn new(stage: Box<dyn StageBackend>) -> Self {
        Self {
            inner: Mutex::new(SchedulerInner {
                sequencers: Vec::new(),
                globals: HashMap::new(),
                next_id: 1,
                midi_ppq: DEFAULT_PPQ,
            }),
            stage: Mutex::new(stage),
            terminated: Arc::new(AtomicBool::new(false)),
            midi_ended: AtomicBool::new(false),
        }
    }

    /// Set the MIDI resolution reported by the audio subsystem at load
    /// time. Affects sequencers registered afterwards.
    pub fn set_midi_ppq(&self, ppq: u32) {
        self.inner.lock().unwrap().midi_ppq = ppq.max(1);
    }

    /// The process-wide termination flag, for watchdog threads.
    pub fn termination_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.terminated)
    }

    /// Request termination: no operation executes on any later dispatch.
    pub fn terminate(&self) {
        if !self.terminated.swap(true, Ordering::SeqCst) {
            info!("termination requested");
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// MIDI playback finished: the next dispatch force-clears the waits of
    /// every MIDI-synced sequencer so scripts waiting on ticks that will
    /// never arrive can resume. Wall-clock sequencers are unaffected.
    pub fn notify_midi_playback_ended(&self) {
        if !self.midi_ended.swap(true, Ordering::SeqCst) {
            info!("midi playback ended, pending waits will be released");
        }
    }

    /// Register a new sequencer. Returns immediately regardless of the
    /// op-sequence length; execution starts on the next dispatch.
    pub fn register_sequence(&self, mode: ClockMode, ops: Arc<OpSequence>) -> SequencerId {
        let mut inner = self.inner.lock().unwrap();
        let ticks_per_step = match mode {
            ClockMode::WallClock => WALL_TICKS_PER_STEP,
            ClockMode::MidiSynced => (inner.midi_ppq / STEPS_PER_QUARTER).max(1),
        };
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .sequencers
            .push(Sequencer::new(id, mode, ticks_per_step, ops));
        id
    }

    /// Explicitly cancel one sequencer. Returns false if unknown.
    pub fn cancel(&self, id: SequencerId) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.sequencers.iter_mut().find(|s| s.id == id) {
            Some(seq) => {
                seq.state = RunState::Finished;
                true
            }
            None => false,
        }
    }

    pub fn sequencer_count(&self) -> usize {
        self.inner.lock().unwrap().sequencers.len()
    }

    pub fn active_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .sequencers
            .iter()
            .filter(|s| s.state.is_active())
            .count()
    }

    /// Pending wait ticks of one sequencer (0 if running, None if unknown)
    pub fn wait_ticks(&self, id: SequencerId) -> Option<u64> {
        self.inner
            .lock()
            .unwrap()
            .sequencers
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.state.wait_ticks())
    }

    pub fn run_state(&self, id: SequencerId) -> Option<RunState> {
        self.inner
            .lock()
            .unwrap()
            .sequencers
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.state)
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.inner.lock().unwrap().globals.get(name).cloned()
    }

    pub fn set_global(&self, name: &str, value: Value) {
        self.inner
            .lock()
            .unwrap()
            .globals
            .insert(name.to_string(), value);
    }

    /// Advance every sequencer by one tick, in registration order.
    ///
    /// Per sequencer: termination wins, then a pending wait decrements
    /// (resuming in this dispatch when it reaches zero), then exactly one
    /// operation executes and the program counter advances. Operation
    /// errors are logged and never abort the sequencer.
    pub fn dispatch(&self, tick: u64) {
        let wake_midi = self.midi_ended.swap(false, Ordering::SeqCst);
        let mut inner = self.inner.lock().unwrap();
        let mut stage = self.stage.lock().unwrap();
        let SchedulerInner {
            sequencers,
            globals,
            ..
        } = &mut *inner;

        for seq in sequencers.iter_mut() {
            // re-checked per sequencer so a timeout firing mid-dispatch
            // still stops all remaining side effects
            if self.terminated.load(Ordering::SeqCst) {
                seq.state = RunState::Finished;
                continue;
            }
            match seq.state {
                RunState::Finished => continue,
                RunState::Waiting { .. } => {
                    let resumed = if wake_midi && seq.mode == ClockMode::MidiSynced {
                        seq.force_wake()
                    } else {
                        seq.tick_wait()
                    };
                    if !resumed {
                        continue;
                    }
                }
                RunState::Running => {}
            }
            Self::step(seq, tick, globals, &mut **stage);
        }
    }

    /// Execute the one operation at the program counter.
    fn step(
        seq: &mut Sequencer,
        tick: u64,
        globals: &mut HashMap<String, Value>,
        stage: &mut dyn StageBackend,
    ) {
        let ops = Arc::clone(&seq.ops);
        let Some(op) = ops.get(seq.pc) else {
            seq.state = RunState::Finished;
            return;
        };
        let mut ctx = ExecCtx {
            locals: &mut seq.locals,
            globals,
            stage,
            pending_wait: None,
        };
        match interp::execute(&mut ctx, op) {
            Ok(()) => {
                if let Some(steps) = ctx.pending_wait {
                    seq.begin_wait(steps);
                }
            }
            Err(err) => {
                warn!(
                    "sequencer {}: tick {}, pc {} ({}): {}",
                    seq.id,
                    tick,
                    seq.pc,
                    op.kind(),
                    err
                );
            }
        }
        seq.advance();
    }
}
