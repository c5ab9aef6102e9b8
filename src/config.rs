//! 系统配置 - 通过JSON文件调整参数,运行时可原子替换告警参数

use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SentinelError};

// ========== 告警参数 ==========

/// 去抖间隔上限 (一天)
const MAX_DEBOUNCE_SECONDS: f64 = 86_400.0;

/// 告警引擎参数 (运行时可修改)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub crowd_danger_threshold: u32,  // 人群危险阈值 (人数)
    pub dwell_seconds: u64,           // 停留时间 (秒)
    pub max_disappeared_frames: u32,  // 最大丢失帧数
    pub weapon_debounce_seconds: f64, // 武器告警去抖间隔 (秒)
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            crowd_danger_threshold: 50,
            dwell_seconds: 10,
            max_disappeared_frames: 40,
            weapon_debounce_seconds: 3.0,
        }
    }
}

impl AlertConfig {
    pub fn dwell(&self) -> Duration {
        Duration::from_secs(self.dwell_seconds)
    }

    /// 未经校验的取值不会 panic: 负数和 NaN 按 0 处理, 溢出按无限长处理
    pub fn weapon_debounce(&self) -> Duration {
        Duration::try_from_secs_f64(self.weapon_debounce_seconds.max(0.0)).unwrap_or(Duration::MAX)
    }

    /// 校验所有参数必须为正数
    pub fn validate(&self) -> Result<()> {
        if self.crowd_danger_threshold == 0 {
            return Err(SentinelError::rejected(
                "crowd_danger_threshold",
                self.crowd_danger_threshold,
                "must be positive",
            ));
        }
        if self.dwell_seconds == 0 {
            return Err(SentinelError::rejected(
                "dwell_seconds",
                self.dwell_seconds,
                "must be positive",
            ));
        }
        if self.max_disappeared_frames == 0 {
            return Err(SentinelError::rejected(
                "max_disappeared_frames",
                self.max_disappeared_frames,
                "must be positive",
            ));
        }
        let debounce = self.weapon_debounce_seconds;
        if !(debounce > 0.0 && debounce <= MAX_DEBOUNCE_SECONDS) {
            return Err(SentinelError::rejected(
                "weapon_debounce_seconds",
                self.weapon_debounce_seconds,
                "must be a positive number",
            ));
        }
        Ok(())
    }
}

// ========== 检测参数 ==========

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub person_conf_threshold: f32, // 行人置信度阈值
    pub staff_filter: bool,         // 深色制服过滤 (安保人员不计数)
    pub staff_dark_ratio: f32,      // 深色像素占比阈值
    pub staff_dark_value: u8,       // HSV明度上限 (0-255)
    pub shape_detection: bool,      // 轮廓形状检测 (细长物体/链条)
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            person_conf_threshold: 0.4,
            staff_filter: false,
            staff_dark_ratio: 0.15,
            staff_dark_value: 50,
            shape_detection: false,
        }
    }
}

// ========== 网络转发参数 ==========

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub bind: String,          // 监听地址
    pub queue_capacity: usize, // 每个客户端发送队列长度 (帧)
    pub write_timeout_ms: u64, // 单次写超时
    pub max_frame_bytes: u32,  // 单帧最大字节数
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8485".to_string(),
            queue_capacity: 4,
            write_timeout_ms: 2000,
            max_frame_bytes: 32 * 1024 * 1024,
        }
    }
}

impl TransportConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms.max(1))
    }
}

// ========== 流水线参数 ==========

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub history_len: usize, // 快照历史记录条数
    pub source_fps: f64,    // 图片序列回放帧率
    pub jpeg_quality: u8,   // 转发帧JPEG质量
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            history_len: 100,
            source_fps: 30.0,
            jpeg_quality: 80,
        }
    }
}

// ========== 总配置 ==========

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    pub alert: AlertConfig,
    pub detection: DetectionConfig,
    pub transport: TransportConfig,
    pub pipeline: PipelineConfig,
}

impl SentinelConfig {
    /// 从JSON文件加载配置
    ///
    /// 文件不存在时写入默认配置; 解析失败或告警参数非法时回退默认值
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str::<SentinelConfig>(&json) {
                Ok(config) => match config.alert.validate() {
                    Ok(()) => {
                        info!("✅ 配置已从 {} 加载", path.display());
                        config
                    }
                    Err(e) => {
                        warn!("⚠️  配置参数非法: {}, 告警参数使用默认值", e);
                        Self {
                            alert: AlertConfig::default(),
                            ..config
                        }
                    }
                },
                Err(e) => {
                    warn!("⚠️  配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    warn!("❌ 保存配置失败: {}", e);
                }
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        info!("💾 配置已保存到 {}", path.as_ref().display());
        Ok(())
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️  当前配置:");
        info!("  人群危险阈值: {}", self.alert.crowd_danger_threshold);
        info!("  停留时间: {}s", self.alert.dwell_seconds);
        info!("  最大丢失帧: {}", self.alert.max_disappeared_frames);
        info!("  武器告警间隔: {:.1}s", self.alert.weapon_debounce_seconds);
        info!("  行人置信度: {:.2}", self.detection.person_conf_threshold);
        info!("  制服过滤: {}", self.detection.staff_filter);
        info!("  形状检测: {}", self.detection.shape_detection);
        info!("  转发地址: {}", self.transport.bind);
    }
}

// ========== 运行时配置句柄 ==========

/// 告警参数句柄
///
/// 读者拿到的是不可变快照 `Arc<AlertConfig>`,写者整体替换指针,
/// 因此一次评估中不会看到半更新的参数。
#[derive(Clone, Debug)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Arc<AlertConfig>>>,
}

impl ConfigHandle {
    pub fn new(config: AlertConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        })
    }

    /// 当前参数快照
    pub fn current(&self) -> Arc<AlertConfig> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// 修改参数: 校验失败时保留原值
    pub fn update(&self, apply: impl FnOnce(&mut AlertConfig)) -> Result<Arc<AlertConfig>> {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let mut next = AlertConfig::clone(&guard);
        apply(&mut next);
        next.validate()?;
        let next = Arc::new(next);
        *guard = Arc::clone(&next);
        Ok(next)
    }

    pub fn set_crowd_danger_threshold(&self, value: i64) -> Result<Arc<AlertConfig>> {
        let value = positive_u32("crowd_danger_threshold", value)?;
        self.update(|c| c.crowd_danger_threshold = value)
    }

    pub fn set_dwell_seconds(&self, value: i64) -> Result<Arc<AlertConfig>> {
        if value <= 0 {
            return Err(SentinelError::rejected("dwell_seconds", value, "must be positive"));
        }
        self.update(|c| c.dwell_seconds = value as u64)
    }

    pub fn set_max_disappeared_frames(&self, value: i64) -> Result<Arc<AlertConfig>> {
        let value = positive_u32("max_disappeared_frames", value)?;
        self.update(|c| c.max_disappeared_frames = value)
    }

    pub fn set_weapon_debounce_seconds(&self, value: f64) -> Result<Arc<AlertConfig>> {
        self.update(|c| c.weapon_debounce_seconds = value)
    }
}

fn positive_u32(field: &'static str, value: i64) -> Result<u32> {
    if value <= 0 {
        return Err(SentinelError::rejected(field, value, "must be positive"));
    }
    u32::try_from(value).map_err(|_| SentinelError::rejected(field, value, "out of range"))
}
