//! Local file frame source using FFmpeg.
//!
//! Packets of the best video stream are decoded and scaled to RGB24 in memory.
//! Frame positions come from the decoded frame's best-effort timestamp, or
//! from the decode index and average frame rate when a frame has none.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use super::{position_from_index, FrameSource};
use crate::frame::Frame;

pub(crate) struct FfmpegFileSource {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    time_base: f64,
    start_ts: i64,
    frame_count: Option<u64>,
    frame_rate: f64,
    decoded_frames: u64,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    last_position_ms: Option<f64>,
    eof_sent: bool,
}

impl FfmpegFileSource {
    pub(crate) fn open(path: &str) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open file input '{}' with ffmpeg", path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();
        let time_base = f64::from(input_stream.time_base());
        let start_ts = input_stream.start_time().max(0);
        let frame_count = estimate_frame_count(&input_stream);
        let frame_rate = f64::from(input_stream.avg_frame_rate());
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            input,
            stream_index,
            time_base,
            start_ts,
            frame_count,
            frame_rate,
            decoded_frames: 0,
            decoder,
            scaler,
            last_position_ms: None,
            eof_sent: false,
        })
    }

    fn next_video_packet(&mut self) -> Option<ffmpeg::Packet> {
        for (stream, packet) in self.input.packets() {
            if stream.index() == self.stream_index {
                return Some(packet);
            }
        }
        None
    }

    fn convert(&mut self, decoded: &ffmpeg::frame::Video) -> Result<Frame> {
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(decoded, &mut rgb_frame)
            .context("scale frame to RGB")?;
        let index = self.decoded_frames;
        self.decoded_frames += 1;
        self.last_position_ms = match decoded.timestamp().or_else(|| decoded.pts()) {
            Some(ts) => Some((ts - self.start_ts).max(0) as f64 * self.time_base * 1000.0),
            None => position_from_index(index, self.frame_rate),
        };
        let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
        Frame::from_rgb(pixels, width, height)
    }
}

impl FrameSource for FfmpegFileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return self.convert(&decoded).map(Some);
            }
            if self.eof_sent {
                return Ok(None);
            }
            match self.next_video_packet() {
                Some(packet) => self
                    .decoder
                    .send_packet(&packet)
                    .context("send packet to ffmpeg decoder")?,
                None => {
                    self.decoder.send_eof().context("flush ffmpeg decoder")?;
                    self.eof_sent = true;
                }
            }
        }
    }

    fn position_ms(&self) -> Option<f64> {
        self.last_position_ms
    }

    fn frame_count_hint(&self) -> Option<u64> {
        self.frame_count
    }

    fn describe(&self) -> String {
        format!("ffmpeg stream #{}", self.stream_index)
    }
}

fn estimate_frame_count(stream: &ffmpeg::format::stream::Stream<'_>) -> Option<u64> {
    if stream.frames() > 0 {
        return Some(stream.frames() as u64);
    }
    let duration_s = stream.duration() as f64 * f64::from(stream.time_base());
    let fps = f64::from(stream.avg_frame_rate());
    if duration_s > 0.0 && fps > 0.0 {
        Some((duration_s * fps).round() as u64)
    } else {
        None
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let len = row_bytes * height as usize;
        let pixels = data
            .get(..len)
            .context("ffmpeg frame buffer is shorter than its dimensions")?;
        return Ok((pixels.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
