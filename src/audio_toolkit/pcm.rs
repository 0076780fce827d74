//! Raw PCM conversion for the speech pipeline.
//!
//! The remote voice emits headerless s16le mono PCM at a fixed 24 kHz; the
//! format is a contract of the service, never negotiated per payload.

use crate::error::AudioError;
use anyhow::Result;
use hound::{WavSpec, WavWriter};
use log::debug;
use std::path::Path;

/// Sample rate of every buffer in the pipeline.
pub const SAMPLE_RATE: u32 = 24_000;

/// Mono audio throughout.
pub const CHANNELS: u16 = 1;

const BYTES_PER_SAMPLE: usize = 2;

/// Decode s16le PCM bytes into normalized f32 samples in [-1.0, 1.0].
///
/// An odd byte count means a truncated or corrupt payload and fails rather
/// than silently dropping the trailing byte.
pub fn decode_to_samples(bytes: &[u8]) -> Result<Vec<f32>, AudioError> {
    if bytes.len() % BYTES_PER_SAMPLE != 0 {
        return Err(AudioError::MalformedPayload(format!(
            "odd byte length {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect())
}

/// Encode f32 samples back into s16le PCM bytes.
pub fn encode_from_samples(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Save samples as a 16-bit mono WAV file at the pipeline sample rate.
pub fn save_wav_file<P: AsRef<Path>>(file_path: P, samples: &[f32]) -> Result<()> {
    let spec = WavSpec {
        channels: CHANNELS,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(file_path.as_ref(), spec)?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        writer.write_sample(value)?;
    }
    writer.finalize()?;

    debug!("Saved WAV file: {:?}", file_path.as_ref());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_known_sample() {
        // Little-endian 0x4000 = 16384 decodes to exactly 0.5.
        let samples = decode_to_samples(&[0x00, 0x40]).unwrap();
        assert_eq!(samples, vec![0.5]);
    }

    #[test]
    fn test_decode_frame_count() {
        let bytes = vec![0u8; 480];
        let samples = decode_to_samples(&bytes).unwrap();
        assert_eq!(samples.len(), 240);
        assert!(samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_decode_extremes_stay_normalized() {
        // i16::MIN and i16::MAX.
        let bytes = [0x00, 0x80, 0xff, 0x7f];
        let samples = decode_to_samples(&bytes).unwrap();
        assert_eq!(samples[0], -1.0);
        assert!(samples[1] < 1.0 && samples[1] > 0.999);
    }

    #[test]
    fn test_odd_length_is_malformed() {
        match decode_to_samples(&[0x00, 0x40, 0x7f]) {
            Err(AudioError::MalformedPayload(_)) => {}
            other => panic!("expected malformed payload error, got {:?}", other),
        }
    }

    #[test]
    fn test_round_trip_within_tolerance() {
        let original = vec![0.0f32, 0.25, -0.25, 0.5, -1.0, 0.999];
        let decoded = decode_to_samples(&encode_from_samples(&original)).unwrap();
        assert_eq!(decoded.len(), original.len());
        for (a, b) in original.iter().zip(decoded.iter()) {
            assert!((a - b).abs() < 1.0 / 32768.0 * 2.0, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_save_wav_file_writes_expected_spec() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reply.wav");
        let samples = vec![0.0f32, 0.5, -0.5];

        save_wav_file(&path, &samples).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, SAMPLE_RATE);
        assert_eq!(spec.channels, CHANNELS);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.duration(), 3);
    }
}
