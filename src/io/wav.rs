//! WAV serialization.

/// Converts a sample to PCM16, clamping to `[-1, 1]` first.
pub(crate) fn sample_to_i16(x: f64) -> i16 {
    (x.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

/// Write a 16-bit value. WAV files are little endian.
#[inline]
fn write16(out: &mut Vec<u8>, x: u16) {
    out.extend_from_slice(&x.to_le_bytes());
}

/// Write a 32-bit value.
#[inline]
fn write32(out: &mut Vec<u8>, x: u32) {
    out.extend_from_slice(&x.to_le_bytes());
}

/// Serializes mono samples as a 16-bit PCM WAV image: the standard
/// 44-byte RIFF/WAVE header followed by the data chunk. Samples are
/// clamped to `[-1, 1]`.
#[must_use]
pub fn write_wav16(samples: &[f64], sample_rate: u32) -> Vec<u8> {
    const CHANNELS: u16 = 1;
    const BITS_PER_SAMPLE: u16 = 16;
    const BYTES_PER_FRAME: u32 = 2;

    let data_len = samples.len() as u32 * BYTES_PER_FRAME;
    let mut out = Vec::with_capacity(44 + data_len as usize);

    out.extend_from_slice(b"RIFF");
    write32(&mut out, data_len + 36);
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    // length of the fmt block
    write32(&mut out, 16);
    // format 1 = WAVE_FORMAT_PCM
    write16(&mut out, 1);
    write16(&mut out, CHANNELS);
    write32(&mut out, sample_rate);
    // data rate in bytes per second
    write32(&mut out, sample_rate * BYTES_PER_FRAME);
    // frame length in bytes
    write16(&mut out, BYTES_PER_FRAME as u16);
    write16(&mut out, BITS_PER_SAMPLE);

    out.extend_from_slice(b"data");
    write32(&mut out, data_len);

    for &sample in samples {
        write16(&mut out, sample_to_i16(sample) as u16);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_exactly_44_bytes() {
        let bytes = write_wav16(&[0.0; 10], 44_100);
        assert_eq!(bytes.len(), 44 + 20);
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[36..40], b"data");

        // data chunk size
        let data_len = u32::from_le_bytes(bytes[40..44].try_into().unwrap());
        assert_eq!(data_len, 20);
    }

    #[test]
    fn samples_clamp_and_round() {
        assert_eq!(sample_to_i16(0.0), 0);
        assert_eq!(sample_to_i16(1.0), 32_767);
        assert_eq!(sample_to_i16(-1.0), -32_767);
        assert_eq!(sample_to_i16(2.0), 32_767);
        assert_eq!(sample_to_i16(0.5), 16_384);
    }

    #[test]
    fn hound_reads_back_what_we_wrote() {
        let samples = [0.0, 0.25, -0.5, 1.0, -1.5];
        let bytes = write_wav16(&samples, 48_000);

        let reader =
            hound::WavReader::new(std::io::Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 48_000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, hound::SampleFormat::Int);

        let decoded: Vec<i16> =
            reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, vec![0, 8192, -16_384, 32_767, -32_767]);
    }
}
