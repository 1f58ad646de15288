//! Float to 16-bit linear PCM conversion.

/// Encode float samples in `[-1.0, 1.0]` as 16-bit little-endian signed PCM.
///
/// Samples are clamped before scaling. Positive values scale by 32767 and
/// negative values by 32768, matching the asymmetric range of signed 16-bit
/// PCM. Non-finite input encodes as silence. The output is always exactly
/// twice the input length in bytes.
pub fn encode_pcm(samples: &[f32]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let s = if sample.is_finite() {
            sample.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let value = if s < 0.0 {
            (s * 32768.0) as i16
        } else {
            (s * 32767.0) as i16
        };
        frame.extend_from_slice(&value.to_le_bytes());
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_length_is_two_bytes_per_sample() {
        assert_eq!(encode_pcm(&[]).len(), 0);
        assert_eq!(encode_pcm(&[0.0; 4096]).len(), 8192);
    }

    #[test]
    fn test_silence_encodes_as_zero_bytes() {
        let frame = encode_pcm(&[0.0; 8]);
        assert!(frame.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_full_scale_extremes() {
        assert_eq!(encode_pcm(&[1.0]), i16::MAX.to_le_bytes().to_vec());
        assert_eq!(encode_pcm(&[-1.0]), i16::MIN.to_le_bytes().to_vec());
    }

    #[test]
    fn test_out_of_range_samples_are_clamped() {
        assert_eq!(encode_pcm(&[2.5]), encode_pcm(&[1.0]));
        assert_eq!(encode_pcm(&[-7.0]), encode_pcm(&[-1.0]));
    }

    #[test]
    fn test_non_finite_samples_encode_as_silence() {
        assert_eq!(encode_pcm(&[f32::NAN]), vec![0, 0]);
        assert_eq!(encode_pcm(&[f32::INFINITY]), vec![0, 0]);
        assert_eq!(encode_pcm(&[f32::NEG_INFINITY]), vec![0, 0]);
    }

    #[test]
    fn test_half_scale_values() {
        let frame = encode_pcm(&[0.5, -0.5]);
        let pos = i16::from_le_bytes([frame[0], frame[1]]);
        let neg = i16::from_le_bytes([frame[2], frame[3]]);
        assert_eq!(pos, (0.5f32 * 32767.0) as i16);
        assert_eq!(neg, (-0.5f32 * 32768.0) as i16);
    }

    #[test]
    fn test_little_endian_byte_order() {
        // 1/32767 scales to exactly 1 -> bytes [1, 0].
        let frame = encode_pcm(&[1.0 / 32767.0]);
        assert_eq!(frame, vec![1, 0]);
    }
}
