/// 视频输入系统 (Video Input System)
///
/// 为流水线线程提供带时间戳的帧
/// - ImageSequenceSource: 单张图片或图片目录 (按文件名排序回放)
/// - RemoteSource:        局域网帧服务 (长度前缀协议)
/// - Camera:              需要外部采集后端, 此处不可用
pub mod image_dir;
pub mod remote;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::SentinelConfig;
use crate::detection::Frame;
use crate::error::{Result, SentinelError};
use crate::transport::ShutdownHandle;

pub use image_dir::ImageSequenceSource;
pub use remote::RemoteSource;

/// 帧数据源
pub trait FrameSource: Send {
    /// 读取下一帧; `Ok(None)` 表示数据源结束
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn describe(&self) -> String;

    /// 可能无限期阻塞的数据源返回关闭句柄, 停止时用来打断读取
    fn interrupt_handle(&self) -> Option<ShutdownHandle> {
        None
    }
}

/// 输入源描述
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputSource {
    Camera(u32),
    File(PathBuf),
    Remote(String),
}

impl FromStr for InputSource {
    type Err = SentinelError;

    /// 支持 `camera:0`, `0`, `tcp://host:port`, 其他视为文件路径
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SentinelError::rejected("source", s, "empty source"));
        }
        if let Some(index) = s.strip_prefix("camera:") {
            return index
                .parse()
                .map(InputSource::Camera)
                .map_err(|_| SentinelError::rejected("source", s, "bad camera index"));
        }
        if let Ok(index) = s.parse::<u32>() {
            return Ok(InputSource::Camera(index));
        }
        if let Some(addr) = s.strip_prefix("tcp://") {
            if addr.is_empty() {
                return Err(SentinelError::rejected("source", s, "missing address"));
            }
            return Ok(InputSource::Remote(addr.to_string()));
        }
        Ok(InputSource::File(PathBuf::from(s)))
    }
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Camera(index) => write!(f, "camera:{}", index),
            InputSource::File(path) => write!(f, "{}", path.display()),
            InputSource::Remote(addr) => write!(f, "tcp://{}", addr),
        }
    }
}

/// 打开输入源
pub fn open_source(source: &InputSource, config: &SentinelConfig) -> Result<Box<dyn FrameSource>> {
    match source {
        InputSource::Camera(index) => Err(SentinelError::SourceUnavailable(format!(
            "camera {} requires an external capture backend",
            index
        ))),
        InputSource::File(path) => Ok(Box::new(ImageSequenceSource::open(
            path,
            config.pipeline.source_fps,
            config.pipeline.jpeg_quality,
        )?)),
        InputSource::Remote(addr) => Ok(Box::new(RemoteSource::connect(
            addr,
            config.transport.max_frame_bytes,
        )?)),
    }
}
