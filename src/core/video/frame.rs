use super::error::{VideoError, VideoResult};
use crate::frame_extractor::colorspace;
use image::{ImageOutputFormat, RgbImage};
use std::io::Cursor;

/// 帧数据结构
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>, // RGB 格式
    pub timestamp_ms: f64,
    pub frame_number: u64,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        data: Vec<u8>,
        timestamp_ms: f64,
        frame_number: u64,
    ) -> Self {
        Self {
            width,
            height,
            data,
            timestamp_ms,
            frame_number,
        }
    }

    /// Solid-colour frame, mostly useful for synthetic streams.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], timestamp_ms: f64, frame_number: u64) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Self::new(width, height, data, timestamp_ms, frame_number)
    }

    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub fn is_valid(&self) -> bool {
        self.data.len() == self.pixel_count() * 3
    }

    /// CIE L*u*v*，每通道 8 位
    pub fn to_luv(&self) -> Vec<u8> {
        colorspace::rgb_to_luv(&self.data)
    }

    pub fn to_gray(&self) -> Vec<u8> {
        self.data
            .chunks_exact(3)
            .map(|rgb| {
                ((rgb[0] as u32 * 299 + rgb[1] as u32 * 587 + rgb[2] as u32 * 114) / 1000) as u8
            })
            .collect()
    }

    pub fn to_rgb_image(&self) -> VideoResult<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            VideoError::Decode(format!(
                "frame {} has {} bytes, expected {}x{}x3",
                self.frame_number,
                self.data.len(),
                self.width,
                self.height
            ))
        })
    }

    pub fn encode_jpeg(&self, quality: u8) -> VideoResult<Vec<u8>> {
        let img = self.to_rgb_image()?;
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageOutputFormat::Jpeg(quality))?;
        Ok(buffer.into_inner())
    }
}
