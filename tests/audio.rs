//! Audio pipeline integration tests
//!
//! Tests codec and scheduling behavior without requiring audio hardware

use std::io::Cursor;

use beacon_live::audio::{
    AudioBackend, CaptureSpec, DecodedAudioBuffer, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE,
    PlaybackScheduler, decode_pcm, encode_frame, samples_to_wav,
};

mod common;
use common::FakeAudio;

/// Generate sine wave audio samples
fn generate_sine_samples(frequency: f32, count: usize, amplitude: f32) -> Vec<f32> {
    (0..count)
        .map(|i| {
            let t = i as f32 / INPUT_SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Deterministic sequence of chunk lengths between 1 and 4800 samples
fn chunk_lengths(count: usize) -> Vec<usize> {
    let mut seed: u32 = 0x2545_f491;
    (0..count)
        .map(|_| {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (seed >> 16) as usize % 4800 + 1
        })
        .collect()
}

#[test]
fn test_frame_round_trip_matches_rounded_samples() {
    let samples = generate_sine_samples(440.0, 4096, 0.9);

    let blob = encode_frame(&samples);
    let decoded = decode_pcm(&blob.data).unwrap();

    assert_eq!(decoded.len(), samples.len());
    for (original, pcm) in samples.iter().zip(&decoded) {
        assert_eq!(i32::from(*pcm), (original * 32768.0).round() as i32);
    }
}

#[test]
fn test_empty_frame_round_trip() {
    let blob = encode_frame(&[]);

    assert!(blob.data.is_empty());
    assert!(decode_pcm(&blob.data).unwrap().is_empty());
}

#[test]
fn test_scheduled_entries_never_overlap() {
    let audio = FakeAudio::new();
    let mut output = audio.open_output(OUTPUT_SAMPLE_RATE, std::sync::Arc::new(|_: u64| {})).unwrap();
    let mut scheduler = PlaybackScheduler::new(OUTPUT_SAMPLE_RATE);

    let mut clock = 0.0;
    for (i, len) in chunk_lengths(64).into_iter().enumerate() {
        // The clock occasionally jumps past the tail, as after a network stall
        if i % 7 == 0 {
            clock += 0.5;
            audio.set_time(clock);
        }
        let buffer = DecodedAudioBuffer::new(vec![0.0; len], OUTPUT_SAMPLE_RATE);
        scheduler.schedule(output.as_mut(), &buffer).unwrap();
    }

    let scheduled = audio.scheduled();
    assert_eq!(scheduled.len(), 64);
    for pair in scheduled.windows(2) {
        let (_, start, duration) = pair[0];
        assert!(
            pair[1].1 >= start + duration - 1e-9,
            "entry {} starts before entry {} ends",
            pair[1].0,
            pair[0].0
        );
    }
}

#[test]
fn test_interrupt_resets_regardless_of_backlog() {
    let audio = FakeAudio::new();
    let mut output = audio.open_output(OUTPUT_SAMPLE_RATE, std::sync::Arc::new(|_: u64| {})).unwrap();
    let mut scheduler = PlaybackScheduler::new(OUTPUT_SAMPLE_RATE);

    for len in chunk_lengths(20) {
        let payload = encode_frame(&vec![0.1; len]).data;
        scheduler.enqueue(output.as_mut(), &payload).unwrap();
    }
    assert_eq!(scheduler.active_count(), 20);

    assert_eq!(scheduler.interrupt(output.as_mut()), 20);
    assert_eq!(scheduler.active_count(), 0);
    assert!(scheduler.next_playback_time().abs() < f64::EPSILON);
    assert_eq!(audio.cancelled().len(), 20);

    // Timeline restarts from the clock on the next chunk
    audio.set_time(4.0);
    let next = scheduler
        .enqueue(output.as_mut(), &encode_frame(&[0.0; 240]).data)
        .unwrap();
    assert!((next.start_time - 4.0).abs() < f64::EPSILON);
}

#[test]
fn test_fake_microphone_round_trip() {
    let audio = FakeAudio::new();
    let mut microphone = audio.open_microphone(&CaptureSpec::default()).unwrap();
    let captured = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = std::sync::Arc::clone(&captured);

    microphone
        .connect(Box::new(move |samples: &[f32]| sink.lock().unwrap().extend_from_slice(samples)))
        .unwrap();
    audio.feed(&[0.1, 0.2, 0.3]);
    microphone.disconnect();
    audio.feed(&[0.4]);
    microphone.stop();

    assert_eq!(*captured.lock().unwrap(), vec![0.1, 0.2, 0.3]);
    assert_eq!(audio.microphones_stopped(), 1);
}

#[test]
fn test_samples_to_wav_reads_back() {
    let samples = generate_sine_samples(440.0, 1600, 0.5);

    let wav = samples_to_wav(&samples, INPUT_SAMPLE_RATE).unwrap();
    let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();

    assert_eq!(reader.spec().sample_rate, INPUT_SAMPLE_RATE);
    assert_eq!(reader.spec().channels, 1);
    assert_eq!(reader.spec().bits_per_sample, 16);
    assert_eq!(reader.len(), 1600);
}
