#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod alarm; // 声音告警接口
pub mod alert; // 告警引擎
pub mod config; // 系统配置参数
pub mod detection; // 智能检测系统
pub mod error; // 错误类型
pub mod input; // 视频输入系统
pub mod logging; // 日志初始化
pub mod pipeline; // 视频处理流水线
pub mod transport; // 帧网络转发

pub use crate::alarm::{AlarmPattern, AlarmRequest, AlarmSink, LogAlarm};
pub use crate::alert::{AlertEngine, AlertEvent, AlertOutcome, CrowdLevel};
pub use crate::config::{AlertConfig, ConfigHandle, SentinelConfig};
pub use crate::detection::{BBox, CentroidTracker, Detector, Frame, Point, Track, Tracker};
pub use crate::error::{Result, SentinelError};
pub use crate::input::{FrameSource, InputSource};
pub use crate::pipeline::{Command, Controller, Snapshot};
pub use crate::transport::{FrameClient, FrameServer};
