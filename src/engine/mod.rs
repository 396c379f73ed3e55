// Engine - host-facing facade wiring clock sources to the scheduler

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::info;
use ringbuf::traits::Consumer;

use crate::script::Scheduler;
use crate::timing::{ClockConsumer, ClockEvent, FrameClock};

/// Consumer-side runtime loop glue. Owns the frame clock for wall-clock
/// mode and drains the MIDI clock channel for audio-synced mode; both feed
/// the same scheduler.
pub struct Engine {
    scheduler: Arc<Scheduler>,
    clock_rx: ClockConsumer,
    frame_clock: FrameClock,
}

impl Engine {
    pub fn new(scheduler: Arc<Scheduler>, clock_rx: ClockConsumer) -> Self {
        Self {
            scheduler,
            clock_rx,
            frame_clock: FrameClock::new(),
        }
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Drain pending MIDI clock events, dispatching once per delivered
    /// tick so suspended sequencers decrement exactly once per logical
    /// tick. Returns the number of ticks dispatched.
    pub fn pump(&mut self) -> usize {
        let mut dispatched = 0;
        while let Some(event) = self.clock_rx.try_pop() {
            match event {
                ClockEvent::Tick(tick) => {
                    self.scheduler.dispatch(tick);
                    dispatched += 1;
                }
                ClockEvent::PlaybackEnded => {
                    self.scheduler.notify_midi_playback_ended();
                }
            }
        }
        dispatched
    }

    /// Host frame callback (wall-clock mode): one tick per frame.
    pub fn on_frame(&mut self) {
        let tick = self.frame_clock.next_tick();
        self.scheduler.dispatch(tick);
    }
}

/// Watchdog for the external timeout contract: sets `flag` once `after`
/// has elapsed, so the very next dispatch observes termination.
pub fn arm_termination_timeout(
    flag: Arc<AtomicBool>,
    after: Duration,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        thread::sleep(after);
        if !flag.swap(true, Ordering::SeqCst) {
            info!("termination timeout of {:?} elapsed", after);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::op::{Expr, Operation};
    use crate::script::{ClockMode, OpSequence};
    use crate::stage::{RecordingStage, StageCall};
    use crate::timing::{MidiClock, TempoMap, create_clock_channel};

    #[test]
    fn test_pump_dispatches_per_tick() {
        let stage = RecordingStage::new();
        let scheduler = Arc::new(Scheduler::new(Box::new(stage.clone())));
        scheduler.register_sequence(
            ClockMode::MidiSynced,
            OpSequence::new(vec![
                Operation::Print(Expr::str("go")),
                Operation::Wait(Expr::int(1)),
            ]),
        );

        let (tx, rx) = create_clock_channel(1024);
        let mut clock = MidiClock::new(TempoMap::default(), 480, tx);
        let mut engine = Engine::new(Arc::clone(&scheduler), rx);

        clock.on_position(0.01); // ticks 0..=9
        assert_eq!(engine.pump(), 10);
        assert_eq!(stage.calls(), vec![StageCall::Print("go".to_string())]);
    }

    #[test]
    fn test_on_frame_advances_one_tick() {
        let stage = RecordingStage::new();
        let scheduler = Arc::new(Scheduler::new(Box::new(stage.clone())));
        scheduler.register_sequence(
            ClockMode::WallClock,
            OpSequence::new(vec![
                Operation::Print(Expr::str("a")),
                Operation::Print(Expr::str("b")),
            ]),
        );

        let (_tx, rx) = create_clock_channel(8);
        let mut engine = Engine::new(scheduler, rx);
        engine.on_frame();
        assert_eq!(stage.call_count(), 1);
        engine.on_frame();
        assert_eq!(stage.call_count(), 2);
    }

    #[test]
    fn test_termination_watchdog_sets_flag() {
        let stage = RecordingStage::new();
        let scheduler = Arc::new(Scheduler::new(Box::new(stage.clone())));
        let handle =
            arm_termination_timeout(scheduler.termination_flag(), Duration::from_millis(5));
        handle.join().expect("watchdog thread");
        assert!(scheduler.is_terminated());
    }
}
