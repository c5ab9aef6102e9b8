//! 检测器接口 (Detector)
//! 职责: 输入一帧 → 返回 (检测框, 类别, 置信度) 列表
//!
//! 模型推理本身在本库之外实现, 这里只定义接口并提供回放实现。

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use log::info;
use serde::Deserialize;

use super::types::{BBox, Frame};
use crate::error::Result;

/// 目标检测器 Trait
///
/// 帧以共享引用传入, 实现不能修改帧数据
pub trait Detector: Send {
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<Vec<BBox>>;

    fn name(&self) -> &str {
        "detector"
    }
}

/// 空检测器: 永远不返回检测结果
#[derive(Debug, Default)]
pub struct NullDetector;

impl Detector for NullDetector {
    fn detect(&mut self, _frame: &Frame) -> anyhow::Result<Vec<BBox>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "null"
    }
}

#[derive(Deserialize)]
struct ReplayLine {
    frame: u64,
    #[serde(default)]
    boxes: Vec<BBox>,
}

/// 回放检测器: 从 JSON Lines 文件读取预先计算的检测结果
///
/// 每行格式: `{"frame": 12, "boxes": [{"x1":..,"y1":..,"x2":..,"y2":..,"label":"person","confidence":0.9}]}`
#[derive(Debug, Default)]
pub struct ReplayDetector {
    frames: HashMap<u64, Vec<BBox>>,
}

impl ReplayDetector {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let detector = Self::from_reader(file)?;
        info!(
            "✅ 回放检测结果已加载: {} ({} 帧)",
            path.as_ref().display(),
            detector.frames.len()
        );
        Ok(detector)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let mut frames: HashMap<u64, Vec<BBox>> = HashMap::new();
        for line in BufReader::new(reader).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed: ReplayLine = serde_json::from_str(&line)?;
            frames.entry(parsed.frame).or_default().extend(parsed.boxes);
        }
        Ok(Self { frames })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl Detector for ReplayDetector {
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<Vec<BBox>> {
        Ok(self.frames.get(&frame.index).cloned().unwrap_or_default())
    }

    fn name(&self) -> &str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::time::Duration;

    fn frame(index: u64) -> Frame {
        Frame::from_image(index, Duration::ZERO, RgbImage::new(8, 8), 80).unwrap()
    }

    #[test]
    fn test_replay() {
        let data = r#"
{"frame": 0, "boxes": [{"x1": 1, "y1": 2, "x2": 3, "y2": 4, "label": "person", "confidence": 0.9}]}

{"frame": 2, "boxes": [{"x1": 5, "y1": 5, "x2": 9, "y2": 9, "label": "knife", "confidence": 0.5}]}
{"frame": 2, "boxes": [{"x1": 0, "y1": 0, "x2": 9, "y2": 9, "label": "person", "confidence": 0.8}]}
"#;
        let mut detector = ReplayDetector::from_reader(data.as_bytes()).unwrap();
        assert_eq!(detector.frame_count(), 2);

        assert_eq!(detector.detect(&frame(0)).unwrap().len(), 1);
        assert!(detector.detect(&frame(1)).unwrap().is_empty());
        let boxes = detector.detect(&frame(2)).unwrap();
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].label, "knife");
    }

    #[test]
    fn test_replay_bad_line() {
        assert!(ReplayDetector::from_reader("not json".as_bytes()).is_err());
    }

    #[test]
    fn test_null() {
        assert!(NullDetector.detect(&frame(0)).unwrap().is_empty());
    }
}
