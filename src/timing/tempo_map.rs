// Tempo map - breakpoints mapping musical position to tempo
// tick_at() recomputes from elapsed wall-clock time on every call, so
// irregular audio-buffer callbacks can never accumulate drift

use serde::{Deserialize, Serialize};

/// 300 BPM, the fastest tempo accepted at ingestion
pub const MIN_MICROS_PER_BEAT: u32 = 200_000;
/// 20 BPM, the slowest tempo accepted at ingestion
pub const MAX_MICROS_PER_BEAT: u32 = 3_000_000;
/// 120 BPM, substituted for anything out of range
pub const DEFAULT_MICROS_PER_BEAT: u32 = 500_000;

/// One tempo breakpoint: from `tick` on, a quarter note lasts
/// `micros_per_beat` microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempoChange {
    pub tick: u64,
    pub micros_per_beat: u32,
}

/// Sanitized, ordered tempo breakpoints. The first entry is always at
/// tick 0 (synthesized at 120 BPM when the source omits it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempoMap {
    changes: Vec<TempoChange>,
}

impl TempoMap {
    /// Ingest raw `(tick, micros_per_beat)` pairs from the audio
    /// subsystem. Out-of-range or non-positive tempo values are replaced
    /// with 120 BPM; entries are sorted and deduplicated (last wins).
    pub fn new<I>(raw: I) -> Self
    where
        I: IntoIterator<Item = (u64, i64)>,
    {
        let mut changes: Vec<TempoChange> = raw
            .into_iter()
            .map(|(tick, micros)| TempoChange {
                tick,
                micros_per_beat: sanitize(micros),
            })
            .collect();
        changes.sort_by_key(|c| c.tick);

        let mut deduped: Vec<TempoChange> = Vec::with_capacity(changes.len());
        for change in changes {
            match deduped.last_mut() {
                Some(last) if last.tick == change.tick => *last = change,
                _ => deduped.push(change),
            }
        }
        if deduped.first().is_none_or(|c| c.tick != 0) {
            deduped.insert(
                0,
                TempoChange {
                    tick: 0,
                    micros_per_beat: DEFAULT_MICROS_PER_BEAT,
                },
            );
        }
        Self { changes: deduped }
    }

    /// A single-tempo map
    pub fn constant(micros_per_beat: i64) -> Self {
        Self::new([(0, micros_per_beat)])
    }

    pub fn changes(&self) -> &[TempoChange] {
        &self.changes
    }

    /// Convert elapsed wall-clock seconds to a musical pulse count.
    ///
    /// Pure and restart-idempotent: walks the breakpoints, accumulating
    /// each segment's wall-clock duration, then floors the pulse offset
    /// within the segment containing `elapsed_seconds`. Beyond the last
    /// breakpoint the final tempo extrapolates.
    pub fn tick_at(&self, elapsed_seconds: f64, ppq: u32) -> u64 {
        if !elapsed_seconds.is_finite() || elapsed_seconds <= 0.0 {
            return 0;
        }
        let ppq = ppq.max(1) as f64;

        let mut segment_start_seconds = 0.0;
        for pair in self.changes.windows(2) {
            let (current, next) = (pair[0], pair[1]);
            let segment_ticks = (next.tick - current.tick) as f64;
            let segment_seconds =
                segment_ticks / ppq * current.micros_per_beat as f64 / 1_000_000.0;
            if elapsed_seconds < segment_start_seconds + segment_seconds {
                let into = (elapsed_seconds - segment_start_seconds) * ppq * 1_000_000.0
                    / current.micros_per_beat as f64;
                return current.tick + into.floor() as u64;
            }
            segment_start_seconds += segment_seconds;
        }

        let Some(last) = self.changes.last() else {
            return 0;
        };
        let into = (elapsed_seconds - segment_start_seconds) * ppq * 1_000_000.0
            / last.micros_per_beat as f64;
        last.tick + into.floor() as u64
    }
}

impl Default for TempoMap {
    fn default() -> Self {
        Self::constant(DEFAULT_MICROS_PER_BEAT as i64)
    }
}

fn sanitize(micros: i64) -> u32 {
    if micros < MIN_MICROS_PER_BEAT as i64 || micros > MAX_MICROS_PER_BEAT as i64 {
        DEFAULT_MICROS_PER_BEAT
    } else {
        micros as u32
    }
}
