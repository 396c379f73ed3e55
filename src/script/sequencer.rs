// Sequencer - one script task's suspension/resumption state machine
// Suspension is state, never a blocked execution context: the scheduler
// inspects and decrements the wait counter on every tick

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::op::OpSequence;
use super::value::Value;

pub type SequencerId = u64;

/// Which clock a sequencer's steps are resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockMode {
    /// Host frame cadence (nominal 60 Hz), 12 ticks per step
    WallClock,
    /// Audio-derived tick notifications, PPQ/8 ticks per step
    MidiSynced,
}

/// Execution state of one sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Waiting { remaining: u64 },
    Finished,
}

impl RunState {
    pub fn is_active(&self) -> bool {
        !matches!(self, RunState::Finished)
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, RunState::Waiting { .. })
    }

    /// Pending wait ticks (0 unless waiting)
    pub fn wait_ticks(&self) -> u64 {
        match self {
            RunState::Waiting { remaining } => *remaining,
            _ => 0,
        }
    }
}

/// One registered script task: program counter, wait counter, locals.
/// Created by registration, mutated only by dispatch.
pub struct Sequencer {
    pub(crate) id: SequencerId,
    pub(crate) ops: Arc<OpSequence>,
    pub(crate) pc: usize,
    pub(crate) state: RunState,
    pub(crate) mode: ClockMode,
    pub(crate) ticks_per_step: u32,
    pub(crate) ever_suspended: bool,
    pub(crate) locals: HashMap<String, Value>,
}

impl Sequencer {
    pub(crate) fn new(
        id: SequencerId,
        mode: ClockMode,
        ticks_per_step: u32,
        ops: Arc<OpSequence>,
    ) -> Self {
        let state = if ops.is_empty() {
            RunState::Finished
        } else {
            RunState::Running
        };
        Self {
            id,
            ops,
            pc: 0,
            state,
            mode,
            ticks_per_step,
            ever_suspended: false,
            locals: HashMap::new(),
        }
    }

    pub fn id(&self) -> SequencerId {
        self.id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn mode(&self) -> ClockMode {
        self.mode
    }

    pub fn ticks_per_step(&self) -> u32 {
        self.ticks_per_step
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Arm a wait of `steps` script steps (steps > 0).
    ///
    /// The counter is `steps * ticks_per_step - 1`: the first decrement
    /// lands on the dispatch after the one that executed the Wait, so the
    /// wait spans exactly `steps * ticks_per_step` dispatches overall.
    /// Saturating: an absurd step count pins the counter at u64::MAX
    /// instead of wrapping.
    pub(crate) fn begin_wait(&mut self, steps: u64) {
        let remaining = steps
            .saturating_mul(self.ticks_per_step as u64)
            .saturating_sub(1);
        self.state = RunState::Waiting { remaining };
        self.ever_suspended = true;
    }

    /// One waiting tick. Returns true when the wait has just cleared and
    /// the sequencer should execute in this same dispatch.
    pub(crate) fn tick_wait(&mut self) -> bool {
        if let RunState::Waiting { remaining } = self.state {
            let remaining = remaining.saturating_sub(1);
            if remaining == 0 {
                self.state = RunState::Running;
                return true;
            }
            self.state = RunState::Waiting { remaining };
        }
        false
    }

    /// Force-clear a pending wait (MIDI playback completion). Returns true
    /// if the sequencer was actually waiting.
    pub(crate) fn force_wake(&mut self) -> bool {
        if self.state.is_waiting() {
            self.state = RunState::Running;
            return true;
        }
        false
    }

    /// Advance past the operation just executed. At end-of-sequence a task
    /// that ever suspended loops back to 0 (perpetual block semantics); one
    /// that never yielded has nothing left to do and finishes.
    pub(crate) fn advance(&mut self) {
        self.pc += 1;
        if self.pc >= self.ops.len() {
            if self.ever_suspended {
                self.pc = 0;
            } else {
                self.state = RunState::Finished;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::op::{Expr, Operation};

    fn sequencer(ops: Vec<Operation>, ticks_per_step: u32) -> Sequencer {
        Sequencer::new(1, ClockMode::WallClock, ticks_per_step, OpSequence::new(ops))
    }

    #[test]
    fn test_empty_sequence_finishes_immediately() {
        let seq = sequencer(vec![], 12);
        assert_eq!(seq.state(), RunState::Finished);
    }

    #[test]
    fn test_wait_arming_off_by_one() {
        let mut seq = sequencer(vec![Operation::Wait(Expr::int(2))], 12);
        seq.begin_wait(2);
        assert_eq!(seq.state().wait_ticks(), 23);

        // 22 decrements leave one tick pending
        for _ in 0..22 {
            assert!(!seq.tick_wait());
        }
        assert_eq!(seq.state().wait_ticks(), 1);

        // the 23rd decrement clears the wait and resumes
        assert!(seq.tick_wait());
        assert_eq!(seq.state(), RunState::Running);
    }

    #[test]
    fn test_single_tick_wait() {
        let mut seq = sequencer(vec![Operation::Wait(Expr::int(1))], 1);
        seq.begin_wait(1);
        assert_eq!(seq.state().wait_ticks(), 0);
        // cleared on the very next dispatch
        assert!(seq.tick_wait());
    }

    #[test]
    fn test_huge_wait_saturates_instead_of_wrapping() {
        let mut seq = sequencer(vec![Operation::Wait(Expr::int(i64::MAX))], 12);
        seq.begin_wait(i64::MAX as u64);
        assert_eq!(seq.state().wait_ticks(), u64::MAX);
        // still a plain wait: decrements normally
        assert!(!seq.tick_wait());
        assert_eq!(seq.state().wait_ticks(), u64::MAX - 1);
    }

    #[test]
    fn test_one_shot_completion() {
        let mut seq = sequencer(
            vec![
                Operation::Print(Expr::str("a")),
                Operation::Print(Expr::str("b")),
            ],
            12,
        );
        seq.advance();
        assert_eq!(seq.state(), RunState::Running);
        seq.advance();
        assert_eq!(seq.state(), RunState::Finished);
    }

    #[test]
    fn test_loop_back_after_suspension() {
        let mut seq = sequencer(vec![Operation::Wait(Expr::int(1))], 12);
        seq.begin_wait(1);
        seq.advance();
        assert_eq!(seq.pc(), 0);
        assert!(seq.state().is_active());
    }

    #[test]
    fn test_force_wake_only_when_waiting() {
        let mut seq = sequencer(vec![Operation::Wait(Expr::int(1))], 12);
        assert!(!seq.force_wake());
        seq.begin_wait(1);
        assert!(seq.force_wake());
        assert_eq!(seq.state(), RunState::Running);
    }
}
