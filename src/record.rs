//! Still-image capture and MJPG/AVI video recording.
//!
//! Stills are written at half resolution with the detected/suspected split
//! in the file name, so the remote side can reconcile an image with the
//! count it was taken under. Video goes into a minimal RIFF/AVI container
//! with one MJPG stream and an idx1 index.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::frame::Frame;

const JPEG_QUALITY: u8 = 90;
const STILL_SCALE_PERCENT: u32 = 50;

/// Create the output directory if missing. A failure is logged and
/// swallowed; saving will fail later with a clearer error.
pub fn ensure_output_dir(dir: &Path) {
    if let Err(err) = std::fs::create_dir_all(dir) {
        log::warn!("failed to create output dir {}: {}", dir.display(), err);
    }
}

/// File name for a captured still: timestamp plus the count split.
pub fn image_file_name(date: &str, time: &str, detected: usize, suspected: usize) -> String {
    format!("{}_{}-count:{}-{}.jpg", date, time, detected, suspected)
}

/// Encode a frame as JPEG.
pub fn encode_jpeg(frame: &Frame) -> Result<Vec<u8>> {
    let img = RgbImage::from_raw(frame.width, frame.height, frame.pixels.clone())
        .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY)
        .encode_image(&img)
        .context("encode jpeg")?;
    Ok(buffer)
}

/// Save an annotated still at half resolution. Returns the full path.
pub fn save_annotated_image(dir: &Path, name: &str, frame: &Frame) -> Result<PathBuf> {
    let reduced = frame.clone().rescaled(STILL_SCALE_PERCENT);
    let jpeg = encode_jpeg(&reduced)?;
    let path = dir.join(name);
    std::fs::write(&path, &jpeg).with_context(|| format!("write still {}", path.display()))?;
    Ok(path)
}

/// Streaming MJPG/AVI writer.
///
/// Frames are appended as `00dc` chunks; `finish` patches the sizes and
/// frame counts left as placeholders and writes the idx1 index. Dropping
/// the writer without `finish` leaves a file most players reject.
pub struct AviWriter {
    writer: BufWriter<File>,
    fps: u32,
    width: u32,
    height: u32,
    frame_count: u32,
    // Byte offsets of header fields patched on finish.
    riff_size_at: u64,
    total_frames_at: u64,
    stream_length_at: u64,
    movi_size_at: u64,
    movi_start: u64,
    index: Vec<(u32, u32)>,
}

impl AviWriter {
    pub fn new(path: &Path, width: u32, height: u32, fps: u32) -> Result<Self> {
        let fps = fps.max(1);
        let file = File::create(path)
            .with_context(|| format!("create avi file {}", path.display()))?;
        let mut avi = Self {
            writer: BufWriter::new(file),
            fps,
            width,
            height,
            frame_count: 0,
            riff_size_at: 0,
            total_frames_at: 0,
            stream_length_at: 0,
            movi_size_at: 0,
            movi_start: 0,
            index: Vec::new(),
        };
        avi.write_headers()?;
        Ok(avi)
    }

    fn write_headers(&mut self) -> Result<()> {
        self.writer.write_all(b"RIFF")?;
        self.riff_size_at = self.writer.stream_position()?;
        write_u32(&mut self.writer, 0)?;
        self.writer.write_all(b"AVI ")?;

        // hdrl list: avih + one strl (strh + strf).
        // avih chunk=8+56, strl list=8+(4+64+48), hdrl payload=4+64+124.
        self.writer.write_all(b"LIST")?;
        write_u32(&mut self.writer, 4 + 64 + 124)?;
        self.writer.write_all(b"hdrl")?;

        self.writer.write_all(b"avih")?;
        write_u32(&mut self.writer, 56)?;
        write_u32(&mut self.writer, 1_000_000 / self.fps)?; // microseconds per frame
        write_u32(&mut self.writer, self.width * self.height * 3 * self.fps)?;
        write_u32(&mut self.writer, 0)?; // padding granularity
        write_u32(&mut self.writer, 0x10)?; // AVIF_HASINDEX
        self.total_frames_at = self.writer.stream_position()?;
        write_u32(&mut self.writer, 0)?; // total frames, patched
        write_u32(&mut self.writer, 0)?; // initial frames
        write_u32(&mut self.writer, 1)?; // streams
        write_u32(&mut self.writer, self.width * self.height * 3)?;
        write_u32(&mut self.writer, self.width)?;
        write_u32(&mut self.writer, self.height)?;
        for _ in 0..4 {
            write_u32(&mut self.writer, 0)?; // reserved
        }

        self.writer.write_all(b"LIST")?;
        write_u32(&mut self.writer, 4 + 64 + 48)?;
        self.writer.write_all(b"strl")?;

        self.writer.write_all(b"strh")?;
        write_u32(&mut self.writer, 56)?;
        self.writer.write_all(b"vids")?;
        self.writer.write_all(b"MJPG")?;
        write_u32(&mut self.writer, 0)?; // flags
        write_u16(&mut self.writer, 0)?; // priority
        write_u16(&mut self.writer, 0)?; // language
        write_u32(&mut self.writer, 0)?; // initial frames
        write_u32(&mut self.writer, 1)?; // scale
        write_u32(&mut self.writer, self.fps)?; // rate
        write_u32(&mut self.writer, 0)?; // start
        self.stream_length_at = self.writer.stream_position()?;
        write_u32(&mut self.writer, 0)?; // length in frames, patched
        write_u32(&mut self.writer, self.width * self.height * 3)?;
        write_u32(&mut self.writer, 0xFFFF_FFFF)?; // quality: driver default
        write_u32(&mut self.writer, 0)?; // sample size
        for _ in 0..4 {
            write_u16(&mut self.writer, 0)?; // rcFrame
        }

        self.writer.write_all(b"strf")?;
        write_u32(&mut self.writer, 40)?;
        write_u32(&mut self.writer, 40)?; // biSize
        write_u32(&mut self.writer, self.width)?;
        write_u32(&mut self.writer, self.height)?;
        write_u16(&mut self.writer, 1)?; // planes
        write_u16(&mut self.writer, 24)?; // bit count
        self.writer.write_all(b"MJPG")?;
        write_u32(&mut self.writer, self.width * self.height * 3)?;
        write_u32(&mut self.writer, 0)?;
        write_u32(&mut self.writer, 0)?;
        write_u32(&mut self.writer, 0)?;
        write_u32(&mut self.writer, 0)?;

        self.writer.write_all(b"LIST")?;
        self.movi_size_at = self.writer.stream_position()?;
        write_u32(&mut self.writer, 0)?; // movi size, patched
        self.movi_start = self.writer.stream_position()?;
        self.writer.write_all(b"movi")?;
        Ok(())
    }

    /// Append one JPEG-encoded frame.
    pub fn write_frame(&mut self, jpeg: &[u8]) -> Result<()> {
        let offset = self.writer.stream_position()? - self.movi_start;
        self.writer.write_all(b"00dc")?;
        write_u32(&mut self.writer, jpeg.len() as u32)?;
        self.writer.write_all(jpeg)?;
        if jpeg.len() % 2 == 1 {
            self.writer.write_all(&[0])?;
        }
        self.index.push((offset as u32, jpeg.len() as u32));
        self.frame_count += 1;
        Ok(())
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Write the index, patch the placeholder sizes, and flush.
    pub fn finish(mut self) -> Result<()> {
        let movi_end = self.writer.stream_position()?;

        self.writer.write_all(b"idx1")?;
        write_u32(&mut self.writer, self.index.len() as u32 * 16)?;
        for (offset, size) in &self.index {
            self.writer.write_all(b"00dc")?;
            write_u32(&mut self.writer, 0x10)?; // AVIIF_KEYFRAME
            write_u32(&mut self.writer, *offset)?;
            write_u32(&mut self.writer, *size)?;
        }
        let file_end = self.writer.stream_position()?;

        self.writer.seek(SeekFrom::Start(self.riff_size_at))?;
        write_u32(&mut self.writer, (file_end - 8) as u32)?;
        self.writer.seek(SeekFrom::Start(self.total_frames_at))?;
        write_u32(&mut self.writer, self.frame_count)?;
        self.writer.seek(SeekFrom::Start(self.stream_length_at))?;
        write_u32(&mut self.writer, self.frame_count)?;
        self.writer.seek(SeekFrom::Start(self.movi_size_at))?;
        write_u32(&mut self.writer, (movi_end - self.movi_start) as u32)?;

        self.writer.flush().context("flush avi file")?;
        Ok(())
    }
}

fn write_u32<W: Write>(writer: &mut W, value: u32) -> Result<()> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_u16<W: Write>(writer: &mut W, value: u16) -> Result<()> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn solid_frame(width: u32, height: u32, value: u8) -> Frame {
        Frame::new(vec![value; (width * height * 3) as usize], width, height, 0).unwrap()
    }

    #[test]
    fn image_file_name_carries_count_split() {
        let name = image_file_name("2024-03-01", "12:30:05", 3, 1);
        assert_eq!(name, "2024-03-01_12:30:05-count:3-1.jpg");
    }

    #[test]
    fn save_annotated_image_halves_resolution() -> Result<()> {
        let dir = tempdir()?;
        let frame = solid_frame(64, 48, 120);
        let path = save_annotated_image(dir.path(), "still.jpg", &frame)?;
        let saved = image::open(&path)?;
        assert_eq!(saved.width(), 32);
        assert_eq!(saved.height(), 24);
        Ok(())
    }

    #[test]
    fn avi_writer_produces_indexed_mjpg_container() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("out.avi");
        let mut avi = AviWriter::new(&path, 32, 24, 12)?;
        for value in [40u8, 200] {
            let jpeg = encode_jpeg(&solid_frame(32, 24, value))?;
            avi.write_frame(&jpeg)?;
        }
        assert_eq!(avi.frame_count(), 2);
        avi.finish()?;

        let bytes = std::fs::read(&path)?;
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"AVI ");
        let riff_size = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        assert_eq!(riff_size as usize, bytes.len() - 8);
        let contains = |needle: &[u8]| bytes.windows(needle.len()).any(|w| w == needle);
        assert!(contains(b"movi"));
        assert!(contains(b"MJPG"));
        assert!(contains(b"idx1"));
        Ok(())
    }
}
