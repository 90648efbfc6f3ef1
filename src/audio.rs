//! PCM audio framing helpers

use crate::{Error, Result};

/// Sample rate for synthesized speech (16kHz mono)
pub const SAMPLE_RATE: u32 = 16_000;

/// Bytes per sample (16-bit signed PCM)
pub const BYTES_PER_SAMPLE: u32 = 2;

/// Wrap raw 16-bit mono PCM bytes in a WAV container
///
/// # Errors
///
/// Returns error if the PCM byte length is odd or WAV encoding fails
pub fn pcm_to_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>> {
    if pcm.len() % 2 != 0 {
        return Err(Error::Audio(format!(
            "pcm byte length {} is not sample-aligned",
            pcm.len()
        )));
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for frame in pcm.chunks_exact(2) {
            let sample = i16::from_le_bytes([frame[0], frame[1]]);
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Duration of a raw PCM byte buffer in seconds
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn pcm_duration_secs(byte_len: usize, sample_rate: u32) -> f64 {
    byte_len as f64 / f64::from(sample_rate * BYTES_PER_SAMPLE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_container_has_riff_header() {
        let pcm: Vec<u8> = vec![0; 3200];
        let wav = pcm_to_wav(&pcm, SAMPLE_RATE).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert!(wav.len() > pcm.len());
    }

    #[test]
    fn odd_pcm_length_rejected() {
        let result = pcm_to_wav(&[0u8; 3], SAMPLE_RATE);
        assert!(matches!(result, Err(Error::Audio(_))));
    }

    #[test]
    fn duration_matches_sample_math() {
        // one second of 16kHz mono s16le
        let secs = pcm_duration_secs(32_000, SAMPLE_RATE);
        assert!((secs - 1.0).abs() < f64::EPSILON);
    }
}
