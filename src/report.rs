//! Report sizing and output frame construction.

use crate::consts;
use crate::error::{Error, Result};
use log::warn;

/// Fixed report layout of a device, supplied at session construction.
///
/// The transport cannot introspect report descriptors, so the caller must
/// know these values in advance.
///
/// *   `has_report_ids`: when true, byte 0 of every input report is the report
///     ID and the input length includes that byte.
/// *   `input_len`: default number of bytes requested per read (1-65).
/// *   `output_len`: number of data bytes per output report, excluding the
///     report ID prefix added by `write`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportShape {
    has_report_ids: bool,
    input_len: u8,
    output_len: u8,
}

impl Default for ReportShape {
    fn default() -> Self {
        ReportShape {
            has_report_ids: false,
            input_len: consts::DEFAULT_INPUT_REPORT_LEN,
            output_len: consts::DEFAULT_OUTPUT_REPORT_LEN,
        }
    }
}

impl ReportShape {
    /// Creates a report shape. An input length of 0 or above 65 falls back to 65.
    pub fn new(has_report_ids: bool, input_len: u8, output_len: u8) -> Self {
        let input_len = if (1..=consts::MAX_INPUT_REPORT_LEN).contains(&input_len) {
            input_len
        } else {
            warn!(
                "Input report length {} out of range (1-{}), using {}",
                input_len,
                consts::MAX_INPUT_REPORT_LEN,
                consts::MAX_INPUT_REPORT_LEN
            );
            consts::MAX_INPUT_REPORT_LEN
        };
        ReportShape {
            has_report_ids,
            input_len,
            output_len,
        }
    }

    #[inline]
    pub fn has_report_ids(&self) -> bool {
        self.has_report_ids
    }

    #[inline]
    pub fn input_len(&self) -> usize {
        self.input_len as usize
    }

    #[inline]
    pub fn output_len(&self) -> usize {
        self.output_len as usize
    }

    /// Total size of a frame handed to the transport: report ID + output data.
    #[inline]
    pub fn frame_len(&self) -> usize {
        self.output_len() + 1
    }

    /// Resolves a requested read length; 0 selects the default input length.
    #[inline]
    pub(crate) fn read_len(&self, requested: usize) -> usize {
        if requested == 0 {
            self.input_len()
        } else {
            requested
        }
    }

    /// Builds an output frame: `report_id`, then `data`, zero-padded to `frame_len`.
    pub fn build_output_frame(&self, report_id: u8, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() > self.output_len() {
            return Err(Error::OperationTooLarge {
                max: self.output_len(),
                actual: data.len(),
            });
        }
        let mut frame = vec![0u8; self.frame_len()];
        frame[0] = report_id;
        frame[1..=data.len()].copy_from_slice(data);
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_len_out_of_range_falls_back_to_max() {
        assert_eq!(ReportShape::new(false, 0, 8).input_len(), 65);
        assert_eq!(ReportShape::new(false, 200, 8).input_len(), 65);
        assert_eq!(ReportShape::new(true, 9, 8).input_len(), 9);
        assert_eq!(ReportShape::new(true, 65, 8).input_len(), 65);
    }

    #[test]
    fn read_len_zero_uses_default() {
        let shape = ReportShape::new(false, 32, 32);
        assert_eq!(shape.read_len(0), 32);
        assert_eq!(shape.read_len(10), 10);
    }

    #[test]
    fn output_frame_is_prefixed_and_padded() {
        let shape = ReportShape::default();
        let frame = shape.build_output_frame(0, &[0x01, 0x02]).unwrap();
        assert_eq!(frame.len(), 66);
        assert_eq!(&frame[..3], &[0x00, 0x01, 0x02]);
        assert!(frame[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn output_frame_carries_report_id() {
        let shape = ReportShape::new(true, 9, 8);
        let frame = shape.build_output_frame(0x05, &[0xAA; 8]).unwrap();
        assert_eq!(frame.len(), 9);
        assert_eq!(frame[0], 0x05);
        assert_eq!(&frame[1..], &[0xAA; 8]);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let shape = ReportShape::new(false, 8, 8);
        match shape.build_output_frame(0, &[0u8; 9]) {
            Err(Error::OperationTooLarge { max, actual }) => {
                assert_eq!(max, 8);
                assert_eq!(actual, 9);
            }
            other => panic!("expected OperationTooLarge, got {:?}", other),
        }
    }
}
