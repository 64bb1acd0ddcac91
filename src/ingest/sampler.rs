//! Every-Nth-frame sampling over a `FrameSource`.

use std::iter::FusedIterator;

use anyhow::Result;

use super::FrameSource;
use crate::error::BirdcountError;
use crate::frame::Frame;

/// One frame selected by the sampler.
pub struct SampledFrame {
    pub frame: Frame,
    /// Zero-based index in decode order.
    pub decode_index: u64,
    /// Zero-based index among sampled frames.
    pub sample_index: u64,
    /// Source position captured right after this frame was read, rounded to
    /// the nearest millisecond. Zero when the source reports no position.
    pub timestamp_ms: i64,
}

/// Lazy iterator yielding decode indices `0, k, 2k, …`.
///
/// Frames between samples are decoded and dropped immediately. The sequence
/// ends for good when the source is exhausted or fails to decode.
pub struct FrameSampler<'a> {
    source: &'a mut dyn FrameSource,
    interval: u64,
    decode_index: u64,
    sample_index: u64,
    finished: bool,
}

impl<'a> FrameSampler<'a> {
    pub fn new(source: &'a mut dyn FrameSource, interval: u64) -> Result<Self> {
        if interval == 0 {
            return Err(BirdcountError::InvalidFrameInterval.into());
        }
        Ok(Self {
            source,
            interval,
            decode_index: 0,
            sample_index: 0,
            finished: false,
        })
    }

    /// Frames decoded so far, sampled or not.
    pub fn frames_decoded(&self) -> u64 {
        self.decode_index
    }
}

impl Iterator for FrameSampler<'_> {
    type Item = SampledFrame;

    fn next(&mut self) -> Option<SampledFrame> {
        while !self.finished {
            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    self.finished = true;
                    break;
                }
                Err(e) => {
                    log::warn!(
                        "sampler: {} stopped producing frames after {} decoded: {:#}",
                        self.source.describe(),
                        self.decode_index,
                        e
                    );
                    self.finished = true;
                    break;
                }
            };

            let decode_index = self.decode_index;
            self.decode_index += 1;
            if decode_index % self.interval != 0 {
                continue;
            }

            let timestamp_ms = self
                .source
                .position_ms()
                .map(|ms| ms.round() as i64)
                .unwrap_or(0);
            let sample_index = self.sample_index;
            self.sample_index += 1;

            return Some(SampledFrame {
                frame,
                decode_index,
                sample_index,
                timestamp_ms,
            });
        }
        None
    }
}

impl FusedIterator for FrameSampler<'_> {}
