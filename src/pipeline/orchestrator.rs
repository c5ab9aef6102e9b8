//! 流水线线程 (Pipeline Orchestrator)
//!
//! 每帧一次迭代: 采集 → 检测 → 跟踪 → 告警 → 发布/转发
//! 跟踪与告警状态只在本线程内修改; 运行结束后随 `FrameProcessor`
//! 交还给控制端, 下次启动继续使用。

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, warn};

use super::snapshot::{Snapshot, SnapshotCell, SnapshotRecord, TrackView};
use crate::alarm::{AlarmRequest, AlarmSink};
use crate::alert::{AlertEngine, AlertEvent};
use crate::config::{AlertConfig, ConfigHandle, DetectionConfig};
use crate::detection::{
    detect_shapes, partition_staff, split_detections, BBox, CentroidTracker, Detector, Frame,
    Tracker,
};
use crate::error::SentinelError;
use crate::input::FrameSource;
use crate::transport::FrameServer;

/// 等待帧时间戳时的最长单次休眠, 保证停止请求及时生效
const PACING_SLICE: Duration = Duration::from_millis(50);

pub const RECORD_TARGET: &str = "sentinel::record";

// ========== 单帧处理 ==========

/// 帧处理器: 持有检测器、跟踪器、告警引擎与历史记录
pub struct FrameProcessor {
    detector: Box<dyn Detector>,
    alarm: Box<dyn AlarmSink>,
    tracker: CentroidTracker,
    alerts: AlertEngine,
    history: VecDeque<SnapshotRecord>,
    history_len: usize,
    /// 最近一帧的告警时刻; 跨运行保持单调
    last_now: Option<Instant>,
}

impl FrameProcessor {
    pub fn new(
        detector: Box<dyn Detector>,
        alarm: Box<dyn AlarmSink>,
        max_disappeared: u32,
        history_len: usize,
    ) -> Self {
        Self {
            detector,
            alarm,
            tracker: CentroidTracker::new(max_disappeared),
            alerts: AlertEngine::new(),
            history: VecDeque::with_capacity(history_len),
            history_len: history_len.max(1),
            last_now: None,
        }
    }

    /// 新一轮运行的起点: 不早于上一轮最后一帧的告警时刻
    ///
    /// 非实时回放时虚拟时间会超前于系统时钟
    pub fn resume_time(&self) -> Instant {
        let wall = Instant::now();
        self.last_now.map_or(wall, |last| last.max(wall))
    }

    pub fn tracker(&self) -> &CentroidTracker {
        &self.tracker
    }

    pub fn alerts(&self) -> &AlertEngine {
        &self.alerts
    }

    pub fn detector_name(&self) -> &str {
        self.detector.name()
    }

    pub fn history(&self) -> impl Iterator<Item = &SnapshotRecord> {
        self.history.iter()
    }

    /// 设置/清除工作人员标记, 返回轨迹是否存在
    pub fn set_worker(&mut self, id: u64, is_worker: bool) -> bool {
        let found = self.tracker.set_worker(id, is_worker);
        if found {
            info!(
                "👷 轨迹 #{} {}",
                id,
                if is_worker { "标记为工作人员" } else { "取消工作人员标记" }
            );
        } else {
            warn!("⚠️ 轨迹 #{} 不存在", id);
        }
        found
    }

    /// 处理一帧并生成快照
    pub fn process(
        &mut self,
        frame: &Frame,
        now: Instant,
        alert: &AlertConfig,
        detection: &DetectionConfig,
    ) -> Snapshot {
        let now = self.last_now.map_or(now, |last| now.max(last));
        self.last_now = Some(now);

        // 1. 检测 (失败或 panic 均按无检测处理)
        let detected = panic::catch_unwind(AssertUnwindSafe(|| self.detector.detect(frame)));
        let boxes = match detected {
            Ok(Ok(boxes)) => boxes,
            Ok(Err(e)) => detection_failed(frame, format!("{:#}", e)),
            Err(payload) => detection_failed(
                frame,
                format!("detector panicked: {}", panic_message(payload.as_ref())),
            ),
        };

        // 2. 分拣 + 形状检测 + 安保过滤
        let mut split = split_detections(boxes, detection.person_conf_threshold);
        if detection.shape_detection {
            split.weapons.extend(detect_shapes(&frame.image));
        }
        let (visitors, staff_count) = partition_staff(&frame.image, split.persons, detection);

        // 3. 跟踪
        self.tracker.set_max_disappeared(alert.max_disappeared_frames);
        self.tracker.update(&visitors, now);

        // 4. 告警
        let outcome = self
            .alerts
            .evaluate(self.tracker.tracks(), &split.weapons, now, alert);
        for event in &outcome.events {
            let message = event.message();
            match event {
                AlertEvent::CrowdDanger { .. } | AlertEvent::WeaponDetected { .. } => {
                    warn!("{}", message)
                }
                _ => info!("{}", message),
            }
            if let Some(pattern) = event.alarm() {
                self.alarm.sound(AlarmRequest { pattern, message });
            }
        }

        // 5. 记录
        let record = SnapshotRecord {
            timestamp: chrono::Local::now().to_rfc3339(),
            frame_index: frame.index,
            person_count: visitors.len(),
            weapon_active: outcome.weapon_active,
            weapon_labels: outcome.weapon_labels.clone(),
            crowd_state: outcome.crowd_level,
        };
        match serde_json::to_string(&record) {
            Ok(json) => info!(target: RECORD_TARGET, "{}", json),
            Err(e) => warn!("⚠️ 记录序列化失败: {}", e),
        }
        self.history.push_back(record);
        while self.history.len() > self.history_len {
            self.history.pop_front();
        }

        Snapshot {
            running: true,
            source: None,
            last_error: None,
            frame_index: frame.index,
            person_count: visitors.len(),
            staff_count,
            qualifying_count: outcome.qualifying,
            crowd_state: outcome.crowd_level,
            weapon_active: outcome.weapon_active,
            weapon_labels: outcome.weapon_labels,
            tracks: self
                .tracker
                .tracks()
                .values()
                .map(|t| TrackView::from_track(t, now))
                .collect(),
            history: self.history.iter().cloned().collect(),
            frame: Some(frame.clone()),
        }
    }

    /// 当前状态视图 (未运行时供查询)
    pub fn idle_snapshot(&self, previous: &Snapshot) -> Snapshot {
        let now = self.resume_time();
        Snapshot {
            running: false,
            tracks: self
                .tracker
                .tracks()
                .values()
                .map(|t| TrackView::from_track(t, now))
                .collect(),
            history: self.history.iter().cloned().collect(),
            ..previous.clone()
        }
    }

    /// 清空轨迹 (ID计数器与告警状态保留)
    pub fn reset_tracks(&mut self) {
        self.tracker.reset();
    }
}

fn detection_failed(frame: &Frame, reason: String) -> Vec<BBox> {
    let err = SentinelError::DetectionFailure {
        frame: frame.index,
        reason,
    };
    error!("❌ {}", err);
    Vec::new()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ========== 运行循环 ==========

/// 控制端 → 流水线线程
#[derive(Clone, Debug)]
pub enum PipelineMessage {
    /// 结果经 `reply` 返回; 超过 `deadline` 的请求不生效, 回复 false
    SetWorker {
        id: u64,
        is_worker: bool,
        reply: Sender<bool>,
        deadline: Instant,
    },
}

/// 运行结束原因
#[derive(Clone, Debug, PartialEq)]
pub enum RunExit {
    /// 操作员停止
    Stopped,
    /// 数据源结束
    EndOfStream,
    /// 数据源故障
    Failed(String),
}

pub struct RunContext {
    pub source: Box<dyn FrameSource>,
    pub config: ConfigHandle,
    pub detection: DetectionConfig,
    pub snapshot: Arc<SnapshotCell>,
    pub server: Option<Arc<FrameServer>>,
    pub stop: Arc<AtomicBool>,
    pub messages: Receiver<PipelineMessage>,
    /// 按帧时间戳实时回放; 关闭时使用虚拟时间, 不休眠
    pub paced: bool,
}

/// 流水线线程主体
///
/// 循环内的 panic 被捕获并作为故障结束, 处理器总能交还给控制端
pub fn run(mut processor: FrameProcessor, mut ctx: RunContext) -> (FrameProcessor, RunExit) {
    let exit = match panic::catch_unwind(AssertUnwindSafe(|| run_loop(&mut processor, &mut ctx))) {
        Ok(exit) => exit,
        Err(payload) => {
            let reason = format!("pipeline panicked: {}", panic_message(payload.as_ref()));
            error!("❌ {}", reason);
            RunExit::Failed(reason)
        }
    };

    let last_error = match &exit {
        RunExit::Failed(reason) => Some(reason.clone()),
        _ => None,
    };
    ctx.snapshot.modify(|s| {
        s.running = false;
        s.last_error = last_error;
    });

    (processor, exit)
}

fn run_loop(processor: &mut FrameProcessor, ctx: &mut RunContext) -> RunExit {
    let source_name = ctx.source.describe();
    info!(
        "▶️ 流水线启动: 源={} 检测器={}",
        source_name,
        processor.detector_name()
    );

    let run_start = processor.resume_time();
    let mut first_timestamp: Option<Duration> = None;
    let mut frames = 0u64;

    let exit = loop {
        if ctx.stop.load(Ordering::SeqCst) {
            break RunExit::Stopped;
        }

        // 操作员指令在帧之间生效
        apply_messages(processor, &ctx.messages);

        let frame = match ctx.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break RunExit::EndOfStream,
            // 停止时连接被主动关闭
            Err(_) if ctx.stop.load(Ordering::SeqCst) => break RunExit::Stopped,
            Err(e) => {
                error!("❌ 数据源故障: {}", e);
                break RunExit::Failed(e.to_string());
            }
        };

        // 时间戳驱动的节奏控制
        let base = *first_timestamp.get_or_insert(frame.timestamp);
        let target = run_start + frame.timestamp.saturating_sub(base);
        if ctx.paced && !sleep_until(target, &ctx.stop, || apply_messages(processor, &ctx.messages))
        {
            break RunExit::Stopped;
        }

        // 每帧读取一次参数快照
        let alert = ctx.config.current();
        let mut snapshot = processor.process(&frame, target, &alert, &ctx.detection);
        snapshot.source = Some(source_name.clone());

        if let Some(server) = &ctx.server {
            if let Err(e) = server.broadcast(&frame.encoded) {
                debug!("转发失败: {}", e);
            }
        }

        ctx.snapshot.publish(snapshot);
        frames += 1;
    };

    info!("⏹️ 流水线结束: {:?}, 共处理 {} 帧", exit, frames);
    exit
}

fn apply_messages(processor: &mut FrameProcessor, messages: &Receiver<PipelineMessage>) {
    for message in messages.try_iter() {
        match message {
            PipelineMessage::SetWorker {
                id,
                is_worker,
                reply,
                deadline,
            } => {
                if Instant::now() > deadline {
                    debug!("工作人员标记请求已过期: #{}", id);
                    let _ = reply.send(false);
                    continue;
                }
                let found = processor.set_worker(id, is_worker);
                let _ = reply.send(found);
            }
        }
    }
}

/// 休眠到目标时刻, 期间持续处理操作员指令; 收到停止请求返回 false
fn sleep_until(target: Instant, stop: &AtomicBool, mut on_tick: impl FnMut()) -> bool {
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        on_tick();
        let now = Instant::now();
        if now >= target {
            return true;
        }
        std::thread::sleep((target - now).min(PACING_SLICE));
    }
}
