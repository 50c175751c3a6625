//! Rodio-backed audio sink with a playback-position counter.
//!
//! A dedicated OS thread owns the rodio output stream (it is !Send); PCM
//! arrives over a channel and flows through a counting source that advances
//! a shared played-samples counter as the device consumes it. That counter
//! is what turns "absolute sample index" into "milliseconds from now" for
//! the event scheduler.
//!
//! `close` flushes: playback stops, the counters rewind to zero, and the
//! next `write` opens a fresh stream epoch. Only a device failure makes the
//! sink permanently unavailable.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use rodio::{OutputStream, Sink, Source};
use tracing::{debug, error};

use crate::sink::{AudioSink, SinkError};

pub struct PlaybackSink {
    state: Arc<PlaybackState>,
    tx: Sender<SinkMsg>,
}

struct PlaybackState {
    sample_rate: u32,
    /// Samples handed to the device so far (stream position of the writer).
    written: AtomicU64,
    /// Samples the device has consumed so far. Shared with every queued
    /// [`CountingSource`].
    played: Arc<AtomicU64>,
    failed: AtomicBool,
}

enum SinkMsg {
    Pcm(Vec<i16>),
    Flush,
}

impl PlaybackSink {
    /// Open the default output device. The playback thread outlives errors:
    /// on device failure the sink reports `Unavailable` instead of blocking
    /// writers.
    pub fn new(sample_rate: u32) -> Arc<Self> {
        let state = Arc::new(PlaybackState {
            sample_rate,
            written: AtomicU64::new(0),
            played: Arc::new(AtomicU64::new(0)),
            failed: AtomicBool::new(false),
        });

        let (tx, rx) = mpsc::channel();
        {
            let state = state.clone();
            std::thread::Builder::new()
                .name("parlo-playback".into())
                .spawn(move || playback_thread(rx, &state))
                .expect("failed to spawn playback thread");
        }

        Arc::new(Self { state, tx })
    }

    /// Queue rendered PCM for playback. Returns the stream position of the
    /// first queued sample, which is what progress events should carry.
    pub fn write(&self, samples: &[i16]) -> Result<u64, SinkError> {
        if self.state.failed.load(Ordering::Relaxed) {
            return Err(SinkError::Unavailable);
        }
        let position = self.state.written.load(Ordering::Relaxed);
        self.tx
            .send(SinkMsg::Pcm(samples.to_vec()))
            .map_err(|_| SinkError::Unavailable)?;
        Ok(position)
    }

    /// Stream position of the next sample to be written.
    pub fn position(&self) -> u64 {
        self.state.written.load(Ordering::Relaxed)
    }

    pub fn sample_rate(&self) -> u32 {
        self.state.sample_rate
    }
}

impl AudioSink for PlaybackSink {
    fn is_busy(&self) -> bool {
        !self.state.failed.load(Ordering::Relaxed)
            && self.state.written.load(Ordering::Relaxed) > self.state.played.load(Ordering::Relaxed)
    }

    fn remaining_time_until(&self, sample: u64) -> Result<Duration, SinkError> {
        if self.state.failed.load(Ordering::Relaxed) {
            return Err(SinkError::Unavailable);
        }
        Ok(remaining_duration(
            sample,
            self.state.played.load(Ordering::Relaxed),
            self.state.sample_rate,
        ))
    }

    fn close(&self) {
        debug!("flushing playback sink");
        let _ = self.tx.send(SinkMsg::Flush);
    }
}

fn remaining_duration(sample: u64, played: u64, sample_rate: u32) -> Duration {
    if sample <= played {
        Duration::ZERO
    } else {
        Duration::from_millis((sample - played) * 1000 / u64::from(sample_rate))
    }
}

fn playback_thread(rx: Receiver<SinkMsg>, state: &PlaybackState) {
    let (_stream, handle) = match OutputStream::try_default() {
        Ok(pair) => pair,
        Err(e) => {
            error!("failed to open audio output: {e}");
            state.failed.store(true, Ordering::Relaxed);
            // drain so writers see Unavailable instead of a dead channel
            while rx.recv().is_ok() {}
            return;
        }
    };
    let mut sink = match Sink::try_new(&handle) {
        Ok(sink) => sink,
        Err(e) => {
            error!("failed to create playback sink: {e}");
            state.failed.store(true, Ordering::Relaxed);
            while rx.recv().is_ok() {}
            return;
        }
    };

    loop {
        match rx.recv() {
            Ok(SinkMsg::Pcm(samples)) => {
                state.written.fetch_add(samples.len() as u64, Ordering::Relaxed);
                sink.append(CountingSource::new(
                    samples,
                    state.played.clone(),
                    state.sample_rate,
                ));
            }
            Ok(SinkMsg::Flush) => {
                sink.stop();
                match Sink::try_new(&handle) {
                    Ok(fresh) => sink = fresh,
                    Err(e) => {
                        error!("failed to reopen playback sink: {e}");
                        state.failed.store(true, Ordering::Relaxed);
                        while rx.recv().is_ok() {}
                        return;
                    }
                }
                // fresh stream epoch: sample indices restart at zero
                state.written.store(0, Ordering::Relaxed);
                state.played.store(0, Ordering::Relaxed);
            }
            Err(_) => {
                // every handle dropped
                sink.stop();
                return;
            }
        }
    }
}

/// Mono i16 source that advances the shared played counter per sample.
struct CountingSource {
    samples: std::vec::IntoIter<i16>,
    played: Arc<AtomicU64>,
    sample_rate: u32,
}

impl CountingSource {
    fn new(samples: Vec<i16>, played: Arc<AtomicU64>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into_iter(),
            played,
            sample_rate,
        }
    }
}

impl Iterator for CountingSource {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        let sample = self.samples.next();
        if sample.is_some() {
            self.played.fetch_add(1, Ordering::Relaxed);
        }
        sample
    }
}

impl Source for CountingSource {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.samples.len())
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_is_zero_for_already_played_samples() {
        assert_eq!(remaining_duration(0, 0, 16_000), Duration::ZERO);
        assert_eq!(remaining_duration(100, 100, 16_000), Duration::ZERO);
        assert_eq!(remaining_duration(50, 8_000, 16_000), Duration::ZERO);
    }

    #[test]
    fn remaining_converts_sample_gap_to_wall_time() {
        // 8000 samples ahead at 16 kHz = 500 ms
        assert_eq!(
            remaining_duration(8_000, 0, 16_000),
            Duration::from_millis(500)
        );
        assert_eq!(
            remaining_duration(24_000, 8_000, 16_000),
            Duration::from_millis(1_000)
        );
    }

    #[test]
    fn counting_source_advances_the_shared_counter() {
        let played = Arc::new(AtomicU64::new(0));
        let source = CountingSource::new(vec![1, 2, 3, 4], played.clone(), 16_000);

        let consumed: Vec<i16> = source.collect();
        assert_eq!(consumed, vec![1, 2, 3, 4]);
        assert_eq!(played.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn counting_source_reports_mono_format() {
        let source = CountingSource::new(vec![0; 8], Arc::new(AtomicU64::new(0)), 22_050);
        assert_eq!(source.channels(), 1);
        assert_eq!(source.sample_rate(), 22_050);
        assert_eq!(source.current_frame_len(), Some(8));
    }
}
