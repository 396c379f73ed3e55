// MIDI-synced clock - turns playback position reports into a tick stream
// Producer side lives on the audio callback, so the channel is a lock-free
// SPSC ring buffer; every intermediate tick is delivered individually and
// in ascending order, never only the latest

use log::{debug, warn};
use ringbuf::{
    HeapRb,
    traits::{Producer, Split},
};

use super::tempo_map::TempoMap;

/// Events flowing from the audio-side clock producer to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    Tick(u64),
    PlaybackEnded,
}

pub type ClockProducer = ringbuf::HeapProd<ClockEvent>;
pub type ClockConsumer = ringbuf::HeapCons<ClockEvent>;

pub fn create_clock_channel(capacity: usize) -> (ClockProducer, ClockConsumer) {
    let rb = HeapRb::<ClockEvent>::new(capacity);
    rb.split()
}

/// Audio-driven tick producer. Converts elapsed playback seconds to the
/// current musical tick via the tempo map and emits every tick boundary
/// crossed since the previous report.
pub struct MidiClock {
    tempo_map: TempoMap,
    ppq: u32,
    tx: ClockProducer,
    /// Next tick not yet pushed into the channel
    next_tick: u64,
    ended: bool,
    end_pending: bool,
}

impl MidiClock {
    pub fn new(tempo_map: TempoMap, ppq: u32, tx: ClockProducer) -> Self {
        Self {
            tempo_map,
            ppq: ppq.max(1),
            tx,
            next_tick: 0,
            ended: false,
            end_pending: false,
        }
    }

    pub fn ppq(&self) -> u32 {
        self.ppq
    }

    pub fn tempo_map(&self) -> &TempoMap {
        &self.tempo_map
    }

    /// Playback advanced to `elapsed_seconds`. Safe to call with any
    /// callback granularity: recomputes the current tick from elapsed time
    /// and pushes every undelivered tick up to it, ascending.
    pub fn on_position(&mut self, elapsed_seconds: f64) {
        if self.ended {
            self.flush_end();
            return;
        }
        let current = self.tempo_map.tick_at(elapsed_seconds, self.ppq);
        self.deliver_through(current);
    }

    /// Playback finished. No ticks are produced afterwards; the end event
    /// wakes suspended MIDI-synced sequencers on the consumer side.
    pub fn playback_ended(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.end_pending = true;
        self.flush_end();
    }

    fn deliver_through(&mut self, current: u64) {
        while self.next_tick <= current {
            if self.tx.try_push(ClockEvent::Tick(self.next_tick)).is_err() {
                // consumer is behind; the undelivered suffix is retried on
                // the next callback rather than skipped
                debug!(
                    "clock queue full, {} ticks deferred",
                    current - self.next_tick + 1
                );
                return;
            }
            self.next_tick += 1;
        }
    }

    fn flush_end(&mut self) {
        if !self.end_pending {
            return;
        }
        if self.tx.try_push(ClockEvent::PlaybackEnded).is_err() {
            warn!("clock queue full, playback-end notification deferred");
        } else {
            self.end_pending = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::traits::Consumer;

    fn drain(rx: &mut ClockConsumer) -> Vec<ClockEvent> {
        let mut out = Vec::new();
        while let Some(ev) = rx.try_pop() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn test_every_intermediate_tick_delivered() {
        let (tx, mut rx) = create_clock_channel(1024);
        // 120 BPM, 480 PPQ: 960 ticks per second
        let mut clock = MidiClock::new(TempoMap::default(), 480, tx);

        clock.on_position(0.010); // tick 9
        clock.on_position(0.0305); // tick 29, irregular jump

        let ticks: Vec<u64> = drain(&mut rx)
            .into_iter()
            .map(|ev| match ev {
                ClockEvent::Tick(t) => t,
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(ticks, (0..=29).collect::<Vec<u64>>());
    }

    #[test]
    fn test_backpressure_defers_instead_of_skipping() {
        let (tx, mut rx) = create_clock_channel(8);
        let mut clock = MidiClock::new(TempoMap::default(), 480, tx);

        clock.on_position(0.020); // 20 ticks wanted, only 8 fit
        let first = drain(&mut rx);
        assert_eq!(first.len(), 8);

        clock.on_position(0.020); // same position: the suffix is retried
        let second = drain(&mut rx);

        let mut all: Vec<u64> = first
            .into_iter()
            .chain(second)
            .map(|ev| match ev {
                ClockEvent::Tick(t) => t,
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        let expected: Vec<u64> = (0..all.len() as u64).collect();
        assert_eq!(all, expected);
        all.dedup();
        assert_eq!(all.len(), expected.len());
    }

    #[test]
    fn test_no_ticks_after_playback_ended() {
        let (tx, mut rx) = create_clock_channel(1024);
        let mut clock = MidiClock::new(TempoMap::default(), 480, tx);

        clock.on_position(0.005);
        clock.playback_ended();
        clock.on_position(1.0); // late callback, must not produce ticks

        let events = drain(&mut rx);
        assert_eq!(events.last(), Some(&ClockEvent::PlaybackEnded));
        assert_eq!(
            events
                .iter()
                .filter(|e| **e == ClockEvent::PlaybackEnded)
                .count(),
            1
        );
        for ev in &events[..events.len() - 1] {
            assert!(matches!(ev, ClockEvent::Tick(_)));
        }
    }

    #[test]
    fn test_deferred_end_retried() {
        let (tx, mut rx) = create_clock_channel(4);
        let mut clock = MidiClock::new(TempoMap::default(), 480, tx);

        clock.on_position(0.010); // fills the tiny queue
        clock.playback_ended(); // end cannot fit yet
        assert!(drain(&mut rx).iter().all(|e| matches!(e, ClockEvent::Tick(_))));

        clock.on_position(0.020); // retries the deferred end
        assert_eq!(drain(&mut rx), vec![ClockEvent::PlaybackEnded]);
    }
}
