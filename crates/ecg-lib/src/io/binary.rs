use crate::error::FormatError;
use crate::signal::{SampleMatrix, SamplingContext};
use log::debug;

/// Decode interleaved little-endian `i16` frames into millivolts.
///
/// `unit_scale` is the device resolution in µV per LSB, so each raw value is multiplied
/// by `unit_scale / 1000`. Trailing bytes that do not complete a frame of `lead_count`
/// samples are dropped.
pub fn load_binary(
    bytes: &[u8],
    lead_count: usize,
    sampling_rate_hz: u32,
    unit_scale: f64,
) -> Result<(SampleMatrix, SamplingContext), FormatError> {
    if lead_count < 1 {
        return Err(FormatError::InvalidLeadCount(lead_count));
    }
    if bytes.is_empty() {
        return Err(FormatError::Empty);
    }
    let context = SamplingContext::new(sampling_rate_hz, lead_count, unit_scale)?;

    let frame_bytes = 2 * lead_count;
    let frames = bytes.len() / frame_bytes;
    if frames == 0 {
        return Err(FormatError::NoCompleteFrame {
            len: bytes.len(),
            lead_count,
        });
    }
    let usable = frames * frame_bytes;
    if usable < bytes.len() {
        debug!(
            "discarding {} trailing byte(s) that do not form a complete frame",
            bytes.len() - usable
        );
    }

    let factor = unit_scale / 1000.0;
    let data = bytes[..usable]
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f64 * factor)
        .collect();
    let matrix = SampleMatrix::from_flat(data, lead_count)?;
    Ok((matrix, context))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(values: &[i16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn sample_count_drops_incomplete_frames() {
        for lead_count in 1..=4usize {
            for extra in 0..(2 * lead_count) {
                let frames = 5;
                let bytes = vec![0u8; frames * 2 * lead_count + extra];
                let (matrix, ctx) = load_binary(&bytes, lead_count, 200, 1.0).expect("decode");
                assert_eq!(matrix.sample_count(), bytes.len() / (2 * lead_count));
                assert_eq!(matrix.lead_count(), lead_count);
                assert_eq!(ctx.lead_count, lead_count);
            }
        }
    }

    #[test]
    fn unit_scale_of_1000_keeps_raw_values() {
        let raw = [0i16, 1, -1, 1200, -32768, 32767];
        let (matrix, _) = load_binary(&encode(&raw), 3, 250, 1000.0).expect("decode");
        let decoded: Vec<f64> = matrix.rows().flatten().copied().collect();
        let expected: Vec<f64> = raw.iter().map(|&v| v as f64).collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn interleaved_frames_map_to_leads() {
        let raw = [10i16, 20, 30, 11, 21, 31];
        let (matrix, _) = load_binary(&encode(&raw), 3, 200, 1.0).expect("decode");
        assert_eq!(matrix.sample_count(), 2);
        let lead = matrix.lead(1).expect("lead 1");
        assert!((lead[0] - 0.020).abs() < 1e-12);
        assert!((lead[1] - 0.021).abs() < 1e-12);
    }

    #[test]
    fn rejects_empty_and_zero_leads() {
        assert_eq!(load_binary(&[], 1, 200, 1.0), Err(FormatError::Empty));
        assert_eq!(
            load_binary(&[0, 0], 0, 200, 1.0),
            Err(FormatError::InvalidLeadCount(0))
        );
        assert_eq!(
            load_binary(&[0, 0, 0], 2, 200, 1.0),
            Err(FormatError::NoCompleteFrame {
                len: 3,
                lead_count: 2
            })
        );
        assert_eq!(
            load_binary(&[0, 0], 1, 0, 1.0),
            Err(FormatError::InvalidSamplingRate)
        );
    }
}
