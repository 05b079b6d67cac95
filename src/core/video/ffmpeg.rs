//! FFmpeg CLI backed decoder
//!
//! Frames come out of `ffmpeg -f rawvideo -pix_fmt rgb24` on a pipe, metadata
//! from `ffprobe -print_format json`.

use super::decoder::{validate_video_file, DecoderFactory, VideoDecoder, VideoInfo};
use super::error::{VideoError, VideoResult};
use super::frame::Frame;
use log::{debug, info, warn};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

#[derive(Debug, Clone)]
pub struct FfmpegTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl FfmpegTools {
    /// 在 PATH 中查找 ffmpeg / ffprobe
    pub fn locate() -> VideoResult<Self> {
        let ffmpeg = which::which("ffmpeg")
            .map_err(|e| VideoError::ToolMissing(format!("ffmpeg: {}", e)))?;
        let ffprobe = which::which("ffprobe")
            .map_err(|e| VideoError::ToolMissing(format!("ffprobe: {}", e)))?;
        Ok(Self { ffmpeg, ffprobe })
    }

    pub fn probe(&self, path: &Path) -> VideoResult<VideoInfo> {
        validate_video_file(path)?;

        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_streams",
                "-show_format",
            ])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()?;

        if !output.status.success() {
            return Err(VideoError::invalid_video(path, "ffprobe could not read the file"));
        }

        let json_str = String::from_utf8_lossy(&output.stdout);
        let val: serde_json::Value = serde_json::from_str(&json_str)?;
        parse_probe_json(path, &val)
    }
}

fn parse_rate(rate: &str) -> Option<f64> {
    let fps = match rate.split_once('/') {
        Some((n, d)) => {
            let num: f64 = n.trim().parse().ok()?;
            let den: f64 = d.trim().parse().ok()?;
            if den > 0.0 {
                num / den
            } else {
                return None;
            }
        }
        None => rate.trim().parse().ok()?,
    };
    (fps > 0.0).then_some(fps)
}

/// Display rotation in degrees, normalised to `0..360`.
fn stream_rotation(stream: &serde_json::Value) -> i64 {
    let from_side_data = stream["side_data_list"].as_array().and_then(|list| {
        list.iter().find_map(|entry| {
            let rotation = &entry["rotation"];
            rotation
                .as_i64()
                .or_else(|| rotation.as_f64().map(|r| r.round() as i64))
                .or_else(|| rotation.as_str().and_then(|r| r.trim().parse().ok()))
        })
    });
    let rotation = from_side_data
        .or_else(|| {
            stream["tags"]["rotate"]
                .as_str()
                .and_then(|r| r.trim().parse::<i64>().ok())
        })
        .unwrap_or(0);
    rotation.rem_euclid(360)
}

fn parse_probe_json(path: &Path, val: &serde_json::Value) -> VideoResult<VideoInfo> {
    let stream = val["streams"]
        .as_array()
        .and_then(|streams| streams.iter().find(|s| s["codec_type"] == "video"))
        .ok_or_else(|| VideoError::invalid_video(path, "no video stream"))?;

    let coded_width = stream["width"].as_u64().unwrap_or(0) as u32;
    let coded_height = stream["height"].as_u64().unwrap_or(0) as u32;
    if coded_width == 0 || coded_height == 0 {
        return Err(VideoError::invalid_video(path, "video stream has no dimensions"));
    }
    // ffmpeg autorotates, so the piped frames use the display orientation
    let (width, height) = if stream_rotation(stream) % 180 == 90 {
        (coded_height, coded_width)
    } else {
        (coded_width, coded_height)
    };

    let fps = stream["avg_frame_rate"]
        .as_str()
        .and_then(parse_rate)
        .or_else(|| stream["r_frame_rate"].as_str().and_then(parse_rate))
        .ok_or_else(|| VideoError::invalid_video(path, "unknown frame rate"))?;

    let duration_secs = val["format"]["duration"]
        .as_str()
        .or_else(|| stream["duration"].as_str())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(VideoInfo {
        width,
        height,
        fps,
        duration_ms: duration_secs * 1000.0,
    })
}

pub struct FfmpegDecoderFactory {
    tools: FfmpegTools,
    /// 解码时缩放到该宽度（保持宽高比，高度取偶数）
    decode_width: Option<u32>,
}

impl FfmpegDecoderFactory {
    pub fn new() -> VideoResult<Self> {
        Ok(Self {
            tools: FfmpegTools::locate()?,
            decode_width: None,
        })
    }

    pub fn with_tools(tools: FfmpegTools) -> Self {
        Self {
            tools,
            decode_width: None,
        }
    }

    pub fn with_decode_width(mut self, width: Option<u32>) -> Self {
        self.decode_width = width;
        self
    }

    pub fn tools(&self) -> &FfmpegTools {
        &self.tools
    }
}

fn scaled_dimensions(info: &VideoInfo, target_width: Option<u32>) -> (u32, u32) {
    match target_width {
        Some(w) if w > 0 && w < info.width => {
            let h = (info.height as u64 * w as u64 / info.width as u64) as u32;
            (w & !1, (h & !1).max(2))
        }
        _ => (info.width, info.height),
    }
}

impl DecoderFactory for FfmpegDecoderFactory {
    fn probe(&self, path: &Path) -> VideoResult<VideoInfo> {
        self.tools.probe(path)
    }

    fn open(&self, path: &Path) -> VideoResult<Box<dyn VideoDecoder>> {
        let probed = self.tools.probe(path)?;
        let (width, height) = scaled_dimensions(&probed, self.decode_width);
        let info = VideoInfo {
            width,
            height,
            ..probed
        };

        let mut cmd = Command::new(&self.tools.ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error", "-i"]).arg(path);
        if (width, height) != (probed.width, probed.height) {
            cmd.arg("-vf").arg(format!("scale={}:{}", width, height));
        }
        cmd.args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|e| VideoError::Decode(format!("failed to spawn ffmpeg: {}", e)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VideoError::Decode("failed to open ffmpeg stdout".into()))?;

        info!(
            "🎬 FfmpegDecoder: opened {:?} ({}x{} @ {:.2}fps, {:.1}s)",
            path,
            width,
            height,
            info.fps,
            info.duration_ms / 1000.0
        );

        Ok(Box::new(FfmpegDecoder {
            path: path.to_path_buf(),
            info,
            child: Some(child),
            stdout: Some(BufReader::new(stdout)),
            frame_number: 0,
        }))
    }
}

pub struct FfmpegDecoder {
    path: PathBuf,
    info: VideoInfo,
    child: Option<Child>,
    stdout: Option<BufReader<ChildStdout>>,
    frame_number: u64,
}

/// 读满缓冲区或遇到 EOF，返回实际读取字节数
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl FfmpegDecoder {
    fn finish(&mut self) -> VideoResult<()> {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let status = child.wait()?;
            if !status.success() && self.frame_number == 0 {
                return Err(VideoError::invalid_video(
                    &self.path,
                    format!("ffmpeg exited with {}", status),
                ));
            }
        }
        Ok(())
    }
}

impl VideoDecoder for FfmpegDecoder {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> VideoResult<Option<Frame>> {
        let Some(reader) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let frame_bytes = self.info.frame_bytes();
        let mut buf: Vec<u8> = Vec::new();
        buf.try_reserve_exact(frame_bytes).map_err(|e| {
            VideoError::ResourceExhausted(format!("frame buffer of {} bytes: {}", frame_bytes, e))
        })?;
        buf.resize(frame_bytes, 0);

        let filled = read_full(reader, &mut buf)?;
        if filled < frame_bytes {
            if filled > 0 {
                warn!(
                    "⚠️ FfmpegDecoder: dropping truncated trailing frame ({} of {} bytes)",
                    filled, frame_bytes
                );
            }
            self.finish()?;
            debug!(
                "FfmpegDecoder: {:?} exhausted after {} frames",
                self.path, self.frame_number
            );
            return Ok(None);
        }

        let timestamp_ms = self.frame_number as f64 * 1000.0 / self.info.fps;
        let frame = Frame::new(
            self.info.width,
            self.info.height,
            buf,
            timestamp_ms,
            self.frame_number,
        );
        self.frame_number += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            debug!("FfmpegDecoder: killed ffmpeg for {:?}", self.path);
        }
    }
}

impl Drop for FfmpegDecoder {
    fn drop(&mut self) {
        self.release();
        info!("🗑️ FfmpegDecoder: released {:?}", self.path);
    }
}
