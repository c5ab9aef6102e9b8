//! 错误类型定义
//! Error taxonomy shared by tracker, alert engine, transport and pipeline

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SentinelError>;

#[derive(Debug, Error)]
pub enum SentinelError {
    /// 检测器失败: 当前帧按无检测处理,流水线继续
    #[error("detection failed on frame {frame}: {reason}")]
    DetectionFailure { frame: u64, reason: String },

    /// 视频源打开或读取失败: 本次运行终止
    #[error("video source unavailable: {0}")]
    SourceUnavailable(String),

    /// 单个客户端连接断开,不影响其他客户端
    #[error("transport disconnected: {0}")]
    TransportDisconnect(String),

    /// 长度前缀或负载不一致,关闭该连接
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// 参数非法,保留原值
    #[error("config rejected: {field} = {value} ({reason})")]
    ConfigRejected {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl SentinelError {
    pub fn rejected(field: &'static str, value: impl ToString, reason: &'static str) -> Self {
        Self::ConfigRejected {
            field,
            value: value.to_string(),
            reason,
        }
    }
}
