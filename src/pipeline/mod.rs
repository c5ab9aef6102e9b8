/// 视频处理流水线 (Video Processing Pipeline)
///
/// 单一流水线线程独占跟踪与告警状态, 读者只读取发布的快照:
/// - Orchestrator: 每帧 采集 → 检测 → 跟踪 → 告警 → 发布
/// - Controller:   操作员接口 (启动/停止/参数/工作人员标记/查询)
/// - Snapshot:     不可变快照, 指针替换发布
/// - Command:      文本控制台指令
pub mod command;
pub mod controller;
pub mod orchestrator;
pub mod snapshot;

pub use command::{Command, USAGE};
pub use controller::Controller;
pub use orchestrator::{FrameProcessor, PipelineMessage, RunContext, RunExit, RECORD_TARGET};
pub use snapshot::{Snapshot, SnapshotCell, SnapshotRecord, TrackView};
