//! 图片序列输入
//!
//! 单张图片或目录 (按文件名排序), 以固定帧率生成时间戳

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};

use super::FrameSource;
use crate::detection::Frame;
use crate::error::{Result, SentinelError};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

pub struct ImageSequenceSource {
    root: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    next_index: u64,
    frame_interval: Duration,
    jpeg_quality: u8,
}

impl ImageSequenceSource {
    pub fn open(path: impl AsRef<Path>, fps: f64, jpeg_quality: u8) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        let unavailable = |reason: String| {
            SentinelError::SourceUnavailable(format!("{}: {}", root.display(), reason))
        };

        let metadata = fs::metadata(&root).map_err(|e| unavailable(e.to_string()))?;
        let files = if metadata.is_dir() {
            let mut files: Vec<PathBuf> = fs::read_dir(&root)
                .map_err(|e| unavailable(e.to_string()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_image(p))
                .collect();
            files.sort();
            files
        } else {
            vec![root.clone()]
        };
        if files.is_empty() {
            return Err(unavailable("no images found".to_string()));
        }

        let fps = if fps.is_finite() && fps >= 0.01 { fps } else { 30.0 };
        info!("🖼️ 图片序列: {} ({} 帧, {:.1} FPS)", root.display(), files.len(), fps);

        Ok(Self {
            root,
            files,
            cursor: 0,
            next_index: 0,
            frame_interval: Duration::from_secs_f64(1.0 / fps),
            jpeg_quality,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        while let Some(path) = self.files.get(self.cursor) {
            self.cursor += 1;
            let image = match image::open(path) {
                Ok(image) => image.to_rgb8(),
                Err(e) => {
                    // 单张坏图跳过, 不终止回放
                    warn!("⚠️ 跳过无法解码的图片 {}: {}", path.display(), e);
                    continue;
                }
            };
            let index = self.next_index;
            self.next_index += 1;
            let timestamp = self.frame_interval.mul_f64(index as f64);
            return Frame::from_image(index, timestamp, image, self.jpeg_quality).map(Some);
        }
        Ok(None)
    }

    fn describe(&self) -> String {
        format!("images:{}", self.root.display())
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
