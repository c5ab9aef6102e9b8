//! 操作员接口 (Operator Controller)
//!
//! 启动/停止流水线, 修改告警参数, 标记工作人员, 查询状态。
//! 流水线未运行时, 跟踪与告警状态保存在控制端; 运行时由流水线线程独占。

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender};
use log::{info, warn};

use super::command::{Command, USAGE};
use super::orchestrator::{self, FrameProcessor, PipelineMessage, RunContext, RunExit};
use super::snapshot::{Snapshot, SnapshotCell};
use crate::alarm::AlarmSink;
use crate::config::{AlertConfig, ConfigHandle, SentinelConfig};
use crate::detection::Detector;
use crate::error::{Result, SentinelError};
use crate::input::{open_source, InputSource};
use crate::transport::{FrameServer, ShutdownHandle};

/// 运行中标记工作人员时等待流水线确认的上限
const WORKER_REPLY_TIMEOUT: Duration = Duration::from_secs(2);

struct ActiveRun {
    source: InputSource,
    stop: Arc<AtomicBool>,
    /// 阻塞型数据源 (远程) 的关闭句柄
    interrupt: Option<ShutdownHandle>,
    messages: Sender<PipelineMessage>,
    handle: JoinHandle<(FrameProcessor, RunExit)>,
}

pub struct Controller {
    settings: SentinelConfig,
    config: ConfigHandle,
    snapshot: Arc<SnapshotCell>,
    server: Option<Arc<FrameServer>>,
    /// 空闲时持有; 运行时移交给流水线线程
    processor: Option<FrameProcessor>,
    active: Option<ActiveRun>,
    paced: bool,
}

impl Controller {
    pub fn new(
        settings: SentinelConfig,
        detector: Box<dyn Detector>,
        alarm: Box<dyn AlarmSink>,
    ) -> Result<Self> {
        let config = ConfigHandle::new(settings.alert.clone())?;
        let processor = FrameProcessor::new(
            detector,
            alarm,
            settings.alert.max_disappeared_frames,
            settings.pipeline.history_len,
        );
        Ok(Self {
            settings,
            config,
            snapshot: Arc::new(SnapshotCell::new()),
            server: None,
            processor: Some(processor),
            active: None,
            paced: true,
        })
    }

    /// 关闭实时节奏 (离线批量处理)
    pub fn set_paced(&mut self, paced: bool) {
        self.paced = paced;
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// 启动帧转发服务
    pub fn serve(&mut self) -> Result<SocketAddr> {
        if let Some(server) = &self.server {
            return Ok(server.local_addr());
        }
        let server = FrameServer::bind(&self.settings.transport)?;
        let addr = server.local_addr();
        self.server = Some(Arc::new(server));
        Ok(addr)
    }

    pub fn server(&self) -> Option<&FrameServer> {
        self.server.as_deref()
    }

    // ========== 运行控制 ==========

    /// 在指定输入源上启动流水线 (已在运行时先停止)
    pub fn start(&mut self, source: &InputSource) -> Result<()> {
        if self.active.is_some() {
            self.stop();
        }

        let opened = match open_source(source, &self.settings) {
            Ok(opened) => opened,
            Err(e) => {
                warn!("❌ 无法打开输入源 {}: {}", source, e);
                let reason = e.to_string();
                self.snapshot.modify(|s| {
                    s.running = false;
                    s.last_error = Some(reason);
                });
                return Err(e);
            }
        };
        let processor = self.processor.take().ok_or_else(|| {
            SentinelError::SourceUnavailable("pipeline state unavailable".to_string())
        })?;

        let interrupt = opened.interrupt_handle();
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = crossbeam_channel::unbounded();
        let ctx = RunContext {
            source: opened,
            config: self.config.clone(),
            detection: self.settings.detection.clone(),
            snapshot: self.snapshot.clone(),
            server: self.server.clone(),
            stop: stop.clone(),
            messages: rx,
            paced: self.paced,
        };

        let name = source.to_string();
        self.snapshot.modify(|s| {
            s.running = true;
            s.source = Some(name);
            s.last_error = None;
        });

        let handle = std::thread::spawn(move || orchestrator::run(processor, ctx));
        self.active = Some(ActiveRun {
            source: source.clone(),
            stop,
            interrupt,
            messages: tx,
            handle,
        });
        info!("✅ 已启动: {}", source);
        Ok(())
    }

    /// 停止流水线, 释放输入源; 返回结束原因
    pub fn stop(&mut self) -> Option<RunExit> {
        let active = self.active.take()?;
        active.stop.store(true, Ordering::SeqCst);
        // 打断阻塞中的读取, 流水线线程随后检查停止标志
        if let Some(interrupt) = &active.interrupt {
            interrupt.shutdown();
        }
        let exit = self.reclaim(active);
        info!("⏹️ 已停止: {:?}", exit);
        Some(exit)
    }

    /// 等待当前运行自然结束 (数据源结束或故障)
    pub fn wait(&mut self) -> Option<RunExit> {
        let active = self.active.take()?;
        Some(self.reclaim(active))
    }

    pub fn is_running(&mut self) -> bool {
        self.poll();
        self.active.is_some()
    }

    pub fn current_source(&self) -> Option<&InputSource> {
        self.active.as_ref().map(|a| &a.source)
    }

    /// 回收已自行结束的运行
    fn poll(&mut self) {
        let finished = self
            .active
            .as_ref()
            .map_or(false, |a| a.handle.is_finished());
        if finished {
            if let Some(active) = self.active.take() {
                self.reclaim(active);
            }
        }
    }

    fn reclaim(&mut self, active: ActiveRun) -> RunExit {
        match active.handle.join() {
            Ok((processor, exit)) => {
                self.snapshot
                    .publish(processor.idle_snapshot(&self.snapshot.load()));
                self.processor = Some(processor);
                exit
            }
            Err(_) => {
                // run 内部已捕获 panic; 到这里说明处理器随线程一起丢失
                let reason = "pipeline thread panicked".to_string();
                warn!("❌ {}", reason);
                let error = reason.clone();
                self.snapshot.modify(|s| {
                    s.running = false;
                    s.last_error = Some(error);
                });
                RunExit::Failed(reason)
            }
        }
    }

    // ========== 参数 ==========

    pub fn set_crowd_threshold(&self, value: i64) -> Result<Arc<AlertConfig>> {
        report("人群阈值", self.config.set_crowd_danger_threshold(value))
    }

    pub fn set_dwell_seconds(&self, value: i64) -> Result<Arc<AlertConfig>> {
        report("停留时间", self.config.set_dwell_seconds(value))
    }

    pub fn set_max_disappeared(&self, value: i64) -> Result<Arc<AlertConfig>> {
        report("最大丢失帧", self.config.set_max_disappeared_frames(value))
    }

    pub fn set_weapon_debounce(&self, value: f64) -> Result<Arc<AlertConfig>> {
        report("武器告警间隔", self.config.set_weapon_debounce_seconds(value))
    }

    // ========== 工作人员标记 ==========

    pub fn tag_worker(&mut self, id: u64) -> bool {
        self.set_worker(id, true)
    }

    pub fn untag_worker(&mut self, id: u64) -> bool {
        self.set_worker(id, false)
    }

    /// 运行中由流水线线程在帧之间执行并回复结果; 运行已结束则直接修改空闲状态
    fn set_worker(&mut self, id: u64, is_worker: bool) -> bool {
        self.poll();
        let answer = self
            .active
            .as_ref()
            .map(|active| request_worker(&active.messages, id, is_worker));
        match answer {
            Some(Some(found)) => return found,
            Some(None) => {
                // 流水线线程已退出, 先回收处理器
                if let Some(active) = self.active.take() {
                    self.reclaim(active);
                }
            }
            None => {}
        }

        match self.processor.as_mut() {
            Some(processor) => {
                let found = processor.set_worker(id, is_worker);
                if found {
                    let idle = processor.idle_snapshot(&self.snapshot.load());
                    self.snapshot.publish(idle);
                }
                found
            }
            None => false,
        }
    }

    // ========== 查询 ==========

    pub fn state(&mut self) -> Arc<Snapshot> {
        self.poll();
        self.snapshot.load()
    }

    pub fn snapshot_cell(&self) -> Arc<SnapshotCell> {
        self.snapshot.clone()
    }

    /// 执行一条文本指令, 返回给操作员的回复
    pub fn execute(&mut self, command: Command) -> Result<String> {
        let reply = match command {
            Command::Threshold(n) => {
                let c = self.set_crowd_threshold(n)?;
                format!("人群阈值 = {}", c.crowd_danger_threshold)
            }
            Command::Dwell(n) => {
                let c = self.set_dwell_seconds(n)?;
                format!("停留时间 = {}s", c.dwell_seconds)
            }
            Command::Disappear(n) => {
                let c = self.set_max_disappeared(n)?;
                format!("最大丢失帧 = {}", c.max_disappeared_frames)
            }
            Command::Debounce(s) => {
                let c = self.set_weapon_debounce(s)?;
                format!("武器告警间隔 = {:.1}s", c.weapon_debounce_seconds)
            }
            Command::Worker(id) => worker_reply(id, self.tag_worker(id), "已标记为工作人员"),
            Command::Unworker(id) => worker_reply(id, self.untag_worker(id), "已取消工作人员标记"),
            Command::Start(source) => {
                self.start(&source)?;
                format!("已启动: {}", source)
            }
            Command::Stop => match self.stop() {
                Some(exit) => format!("已停止: {:?}", exit),
                None => "未在运行".to_string(),
            },
            Command::Status => self.state().summary(),
            Command::Help => USAGE.to_string(),
            Command::Quit => {
                self.shutdown();
                "bye".to_string()
            }
        };
        Ok(reply)
    }

    /// 停止流水线并关闭转发服务
    pub fn shutdown(&mut self) {
        self.stop();
        if let Some(server) = self.server.take() {
            server.shutdown();
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn report(name: &str, result: Result<Arc<AlertConfig>>) -> Result<Arc<AlertConfig>> {
    match &result {
        Ok(_) => info!("⚙️ {} 已更新", name),
        Err(e) => warn!("⚠️ {} 未修改: {}", name, e),
    }
    result
}

/// 向流水线线程发送标记请求; `None` 表示运行已结束
fn request_worker(messages: &Sender<PipelineMessage>, id: u64, is_worker: bool) -> Option<bool> {
    let (reply, answer) = crossbeam_channel::bounded(1);
    let deadline = Instant::now() + WORKER_REPLY_TIMEOUT;
    let request = PipelineMessage::SetWorker {
        id,
        is_worker,
        reply,
        deadline,
    };
    if messages.send(request).is_err() {
        return None;
    }
    match answer.recv_deadline(deadline) {
        Ok(found) => Some(found),
        Err(RecvTimeoutError::Timeout) => {
            // 过期请求不会延后生效
            warn!("⚠️ 流水线未及时响应, 轨迹 #{} 未修改", id);
            Some(false)
        }
        Err(RecvTimeoutError::Disconnected) => None,
    }
}

fn worker_reply(id: u64, found: bool, action: &str) -> String {
    if found {
        format!("轨迹 #{} {}", id, action)
    } else {
        format!("轨迹 #{} 不存在", id)
    }
}
