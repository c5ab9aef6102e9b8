use std::sync::Arc;
use std::time::Duration;

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// 检测系统数据结构定义
/// Data structures for the detection system

// ========== 几何类型 ==========

/// 二维点 (质心坐标)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// 欧氏距离
    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// 检测框 (Detection bounding box)
///
/// 每帧由检测器重新生成,不跨帧保存
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub label: String,
    pub confidence: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, label: &str, confidence: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            label: label.to_string(),
            confidence,
        }
    }

    /// 获取中心点
    pub fn centroid(&self) -> Point {
        Point::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

// ========== 视频帧 ==========

/// 视频帧 (采集 → 检测 → 发布)
///
/// `encoded` 为JPEG编码后的数据,直接用于网络转发;
/// `image` 为解码后的RGB像素,供检测器与制服过滤器读取。
#[derive(Clone)]
pub struct Frame {
    /// 帧序号 (从0开始)
    pub index: u64,
    /// 相对于数据源起点的时间戳
    pub timestamp: Duration,
    pub image: Arc<RgbImage>,
    pub encoded: Arc<Vec<u8>>,
}

impl Frame {
    /// RGB图像 → JPEG编码帧
    pub fn from_image(
        index: u64,
        timestamp: Duration,
        image: RgbImage,
        jpeg_quality: u8,
    ) -> crate::Result<Self> {
        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, jpeg_quality.clamp(1, 100))
            .encode_image(&image)?;
        Ok(Self {
            index,
            timestamp,
            image: Arc::new(image),
            encoded: Arc::new(encoded),
        })
    }

    /// 网络收到的编码数据 → 帧 (保留原始字节用于再次转发)
    pub fn from_encoded(index: u64, timestamp: Duration, encoded: Vec<u8>) -> crate::Result<Self> {
        let image = image::load_from_memory(&encoded)?.to_rgb8();
        Ok(Self {
            index,
            timestamp,
            image: Arc::new(image),
            encoded: Arc::new(encoded),
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("index", &self.index)
            .field("timestamp", &self.timestamp)
            .field("size", &format_args!("{}x{}", self.width(), self.height()))
            .field("encoded_bytes", &self.encoded.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centroid() {
        let bbox = BBox::new(10.0, 20.0, 30.0, 60.0, "person", 0.9);
        assert_eq!(bbox.centroid(), Point::new(20.0, 40.0));
        assert_eq!(bbox.width(), 20.0);
        assert_eq!(bbox.height(), 40.0);
    }

    #[test]
    fn test_frame_encode_decode() {
        let image = RgbImage::from_pixel(32, 24, image::Rgb([200, 10, 10]));
        let frame = Frame::from_image(3, Duration::from_millis(100), image, 80).unwrap();
        assert_eq!(frame.index, 3);
        assert!(!frame.encoded.is_empty());

        let decoded =
            Frame::from_encoded(4, Duration::ZERO, frame.encoded.as_ref().clone()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
        assert_eq!(decoded.encoded, frame.encoded);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(Frame::from_encoded(0, Duration::ZERO, vec![1, 2, 3, 4]).is_err());
    }

    #[test]
    fn test_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
    }
}
