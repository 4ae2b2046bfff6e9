//! Gap-free playback scheduling
//!
//! Received chunks arrive in bursts. Each one is appended to the tail of the
//! playback timeline instead of being played on arrival, so consecutive
//! chunks never overlap and never leave gaps while audio keeps flowing.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::codec::{self, DecodedAudioBuffer};
use crate::Result;

/// Identifier of a scheduled playback entry
pub type EntryId = u64;

/// Notified from the audio thread when an entry finishes playing
pub type PlaybackNotifier = Arc<dyn Fn(EntryId) + Send + Sync>;

/// Output audio context with its own clock
pub trait AudioOutput {
    /// Current time of the output clock, in seconds
    fn current_time(&self) -> f64;

    /// Play `buffer` starting at `start_time` on the output clock
    ///
    /// # Errors
    ///
    /// Returns error if the output is closed or cannot accept the buffer
    fn schedule(&mut self, id: EntryId, start_time: f64, buffer: &DecodedAudioBuffer)
    -> Result<()>;

    /// Stop a scheduled or playing entry immediately
    fn cancel(&mut self, id: EntryId);

    /// Release the output device
    fn close(&mut self);
}

/// A buffer placed on the playback timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackEntry {
    /// Entry identifier
    pub id: EntryId,

    /// Start on the output clock, in seconds
    pub start_time: f64,

    /// Length in seconds
    pub duration: f64,
}

impl PlaybackEntry {
    /// Time at which the entry stops playing
    #[must_use]
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

/// Tracks the playback timeline and the set of active entries
#[derive(Debug)]
pub struct PlaybackScheduler {
    sample_rate: u32,
    next_playback_time: f64,
    active: BTreeMap<EntryId, PlaybackEntry>,
    next_id: EntryId,
}

impl PlaybackScheduler {
    /// Create a scheduler for payloads recorded at `sample_rate`
    #[must_use]
    pub const fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            next_playback_time: 0.0,
            active: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Decode a base64 payload and append it to the timeline
    ///
    /// # Errors
    ///
    /// Returns error if the payload cannot be decoded or the output rejects it
    pub fn enqueue(&mut self, output: &mut dyn AudioOutput, payload: &str) -> Result<PlaybackEntry> {
        let buffer = codec::decode_payload(payload, self.sample_rate)?;
        self.schedule(output, &buffer)
    }

    /// Append a decoded buffer to the timeline
    ///
    /// # Errors
    ///
    /// Returns error if the output rejects the buffer
    pub fn schedule(
        &mut self,
        output: &mut dyn AudioOutput,
        buffer: &DecodedAudioBuffer,
    ) -> Result<PlaybackEntry> {
        let start_time = self.next_playback_time.max(output.current_time());
        let id = self.next_id;
        self.next_id += 1;

        output.schedule(id, start_time, buffer)?;

        let entry = PlaybackEntry {
            id,
            start_time,
            duration: buffer.duration(),
        };
        self.active.insert(id, entry);
        self.next_playback_time = entry.end_time();

        tracing::trace!(
            id,
            start_time,
            duration = entry.duration,
            active = self.active.len(),
            "scheduled audio chunk"
        );

        Ok(entry)
    }

    /// Remove an entry that finished playing
    ///
    /// Returns false if the entry was not active (already cancelled).
    pub fn complete(&mut self, id: EntryId) -> bool {
        self.active.remove(&id).is_some()
    }

    /// Stop every active entry and restart the timeline
    ///
    /// Returns the number of entries that were cut off.
    pub fn interrupt(&mut self, output: &mut dyn AudioOutput) -> usize {
        let cancelled = self.active.len();
        for id in self.active.keys() {
            output.cancel(*id);
        }
        self.reset();

        if cancelled > 0 {
            tracing::debug!(cancelled, "playback interrupted");
        }
        cancelled
    }

    /// Forget every entry and reset the timeline without touching an output
    pub fn reset(&mut self) {
        self.active.clear();
        self.next_playback_time = 0.0;
    }

    /// Time at which the next chunk will start if the clock has not passed it
    #[must_use]
    pub const fn next_playback_time(&self) -> f64 {
        self.next_playback_time
    }

    /// Number of scheduled or playing entries
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct ManualOutput {
        now: f64,
        scheduled: Vec<(EntryId, f64)>,
        cancelled: Vec<EntryId>,
    }

    impl AudioOutput for ManualOutput {
        fn current_time(&self) -> f64 {
            self.now
        }

        fn schedule(&mut self, id: EntryId, start_time: f64, _: &DecodedAudioBuffer) -> Result<()> {
            self.scheduled.push((id, start_time));
            Ok(())
        }

        fn cancel(&mut self, id: EntryId) {
            self.cancelled.push(id);
        }

        fn close(&mut self) {}
    }

    fn half_second() -> DecodedAudioBuffer {
        DecodedAudioBuffer::new(vec![0.0; 12_000], 24_000)
    }

    #[test]
    fn first_chunk_starts_at_clock() {
        let mut output = ManualOutput {
            now: 3.0,
            ..ManualOutput::default()
        };
        let mut scheduler = PlaybackScheduler::new(24_000);

        let entry = scheduler.schedule(&mut output, &half_second()).unwrap();

        assert!((entry.start_time - 3.0).abs() < f64::EPSILON);
        assert!((scheduler.next_playback_time() - 3.5).abs() < f64::EPSILON);
    }

    #[test]
    fn burst_is_appended_to_tail() {
        let mut output = ManualOutput::default();
        let mut scheduler = PlaybackScheduler::new(24_000);

        let a = scheduler.schedule(&mut output, &half_second()).unwrap();
        let b = scheduler.schedule(&mut output, &half_second()).unwrap();

        assert!((b.start_time - a.end_time()).abs() < f64::EPSILON);
        assert_eq!(scheduler.active_count(), 2);
    }

    #[test]
    fn late_chunk_starts_at_clock_not_stale_tail() {
        let mut output = ManualOutput::default();
        let mut scheduler = PlaybackScheduler::new(24_000);

        scheduler.schedule(&mut output, &half_second()).unwrap();
        output.now = 10.0;
        let late = scheduler.schedule(&mut output, &half_second()).unwrap();

        assert!((late.start_time - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn complete_removes_entry_once() {
        let mut output = ManualOutput::default();
        let mut scheduler = PlaybackScheduler::new(24_000);
        let entry = scheduler.schedule(&mut output, &half_second()).unwrap();

        assert!(scheduler.complete(entry.id));
        assert!(!scheduler.complete(entry.id));
        assert_eq!(scheduler.active_count(), 0);
    }

    #[test]
    fn interrupt_cancels_everything() {
        let mut output = ManualOutput::default();
        let mut scheduler = PlaybackScheduler::new(24_000);
        for _ in 0..4 {
            scheduler.schedule(&mut output, &half_second()).unwrap();
        }

        assert_eq!(scheduler.interrupt(&mut output), 4);
        assert_eq!(output.cancelled, vec![0, 1, 2, 3]);
        assert_eq!(scheduler.active_count(), 0);
        assert!(scheduler.next_playback_time().abs() < f64::EPSILON);
    }
}
