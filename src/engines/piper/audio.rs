use super::model::PiperError;

/// Size of the canonical RIFF/WAVE header written by [`wav_header`].
pub const WAV_HEADER_LEN: usize = 44;

const WAVE_FORMAT_IEEE_FLOAT: u16 = 3;
const FLOAT_BITS_PER_SAMPLE: u16 = 32;

/// Container for packaged audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    /// RIFF/WAVE with an IEEE-float format chunk.
    #[default]
    Wav,
    /// Headerless little-endian f32 samples, for streaming to a device.
    RawPcm,
}

/// Audio ready for a playback collaborator.
#[derive(Debug, Clone)]
pub struct PackagedAudio {
    pub format: AudioFormat,
    pub sample_rate: u32,
    pub channels: u16,
    pub bytes: Vec<u8>,
}

impl PackagedAudio {
    /// The sample payload without any container header.
    pub fn pcm_bytes(&self) -> &[u8] {
        match self.format {
            AudioFormat::Wav => &self.bytes[WAV_HEADER_LEN.min(self.bytes.len())..],
            AudioFormat::RawPcm => &self.bytes,
        }
    }
}

/// Build a canonical 44-byte float WAV header for `num_samples` samples.
///
/// `num_samples` counts individual samples across all channels.
pub fn wav_header(
    num_samples: usize,
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
) -> Result<[u8; WAV_HEADER_LEN], PiperError> {
    if channels == 0 {
        return Err(PiperError::Config("channel count must be positive".to_string()));
    }
    if sample_rate == 0 {
        return Err(PiperError::Config("sample rate must be positive".to_string()));
    }
    if bits_per_sample == 0 || bits_per_sample % 8 != 0 {
        return Err(PiperError::Config(format!(
            "unsupported bits per sample: {bits_per_sample}"
        )));
    }

    let bytes_per_sample = u32::from(bits_per_sample / 8);
    let data_size = u32::try_from(num_samples)
        .ok()
        .and_then(|n| n.checked_mul(bytes_per_sample))
        .filter(|size| *size <= u32::MAX - 36)
        .ok_or_else(|| PiperError::Config(format!("{num_samples} samples exceed WAV limits")))?;
    let byte_rate = sample_rate
        .checked_mul(u32::from(channels))
        .and_then(|r| r.checked_mul(bytes_per_sample))
        .ok_or_else(|| {
            PiperError::Config(format!(
                "byte rate for {sample_rate} Hz x {channels} channel(s) exceeds WAV limits"
            ))
        })?;
    let block_align = channels * (bits_per_sample / 8);

    let mut header = [0u8; WAV_HEADER_LEN];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36 + data_size).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&WAVE_FORMAT_IEEE_FLOAT.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bits_per_sample.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());
    Ok(header)
}

/// Wrap f32 samples in the requested container.
pub fn package(
    samples: &[f32],
    sample_rate: u32,
    channels: u16,
    format: AudioFormat,
) -> Result<PackagedAudio, PiperError> {
    // Validates the parameters for both formats.
    let header = wav_header(samples.len(), sample_rate, channels, FLOAT_BITS_PER_SAMPLE)?;

    let header_len = match format {
        AudioFormat::Wav => WAV_HEADER_LEN,
        AudioFormat::RawPcm => 0,
    };
    let mut bytes = Vec::with_capacity(header_len + samples.len() * 4);
    if format == AudioFormat::Wav {
        bytes.extend_from_slice(&header);
    }
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }

    Ok(PackagedAudio {
        format,
        sample_rate,
        channels,
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    fn u16_at(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes(bytes[offset..offset + 2].try_into().unwrap())
    }

    #[test]
    fn header_sizes_follow_sample_count() {
        for k in [0usize, 1, 1000, 22050] {
            let samples = vec![0.25f32; k];
            let audio = package(&samples, 22050, 1, AudioFormat::Wav).unwrap();
            let bytes = &audio.bytes;
            assert_eq!(bytes.len(), WAV_HEADER_LEN + 4 * k);
            assert_eq!(u32_at(bytes, 4) as usize, 36 + 4 * k, "ChunkSize");
            assert_eq!(u32_at(bytes, 40) as usize, 4 * k, "Subchunk2Size");
        }
    }

    #[test]
    fn header_fields_describe_float_audio() {
        let header = wav_header(10, 16000, 2, 32).unwrap();
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(&header[8..16], b"WAVEfmt ");
        assert_eq!(u32_at(&header, 16), 16);
        assert_eq!(u16_at(&header, 20), 3);
        assert_eq!(u16_at(&header, 22), 2);
        assert_eq!(u32_at(&header, 24), 16000);
        assert_eq!(u32_at(&header, 28), 16000 * 2 * 4);
        assert_eq!(u16_at(&header, 32), 8);
        assert_eq!(u16_at(&header, 34), 32);
        assert_eq!(&header[36..40], b"data");
    }

    #[test]
    fn wav_is_readable_by_hound() {
        let samples = [0.0f32, 0.5, -0.5, 1.0, -1.0];
        let audio = package(&samples, 24000, 1, AudioFormat::Wav).unwrap();
        let mut reader = hound::WavReader::new(Cursor::new(audio.bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 24000);
        assert_eq!(spec.bits_per_sample, 32);
        assert_eq!(spec.sample_format, hound::SampleFormat::Float);
        let decoded: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn raw_mode_has_no_header() {
        let samples = [0.5f32, -0.25];
        let audio = package(&samples, 22050, 1, AudioFormat::RawPcm).unwrap();
        assert_eq!(audio.bytes.len(), 8);
        assert_eq!(&audio.bytes[0..4], &0.5f32.to_le_bytes());
        assert_eq!(audio.pcm_bytes(), audio.bytes.as_slice());
    }

    #[test]
    fn pcm_bytes_skip_wav_header() {
        let audio = package(&[0.5f32], 22050, 1, AudioFormat::Wav).unwrap();
        assert_eq!(audio.pcm_bytes(), &0.5f32.to_le_bytes());
    }

    #[test]
    fn rejects_byte_rate_overflow() {
        assert!(matches!(
            wav_header(1, 2_000_000_000, 1, 32),
            Err(PiperError::Config(_))
        ));
        assert!(package(&[0.0], u32::MAX, 2, AudioFormat::RawPcm).is_err());
        assert!(wav_header(1, 192_000, 2, 32).is_ok());
    }

    #[test]
    fn rejects_degenerate_parameters() {
        assert!(package(&[0.0], 0, 1, AudioFormat::Wav).is_err());
        assert!(package(&[0.0], 22050, 0, AudioFormat::RawPcm).is_err());
        assert!(wav_header(1, 22050, 1, 12).is_err());
    }
}
