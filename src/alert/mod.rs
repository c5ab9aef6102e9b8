/// 告警引擎 (Alert Engine)
///
/// 输入: 当前轨迹集合 + 当前帧危险物品检测
/// 输出: 人群告警等级, 武器告警状态, 本帧产生的事件
/// - crowd:  人群状态机 (停留时间 + 持续时间)
/// - weapon: 武器状态机 (按帧触发 + 去抖)
pub mod crowd;
pub mod weapon;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

pub use crowd::{CrowdAlertState, CrowdLevel};
pub use weapon::WeaponAlertState;

use crate::alarm::AlarmPattern;
use crate::config::AlertConfig;
use crate::detection::{BBox, Track};

// ========== 告警事件 ==========

#[derive(Clone, Debug, PartialEq)]
pub enum AlertEvent {
    /// 进入 Warning (每次进入只发一次)
    CrowdWarning { qualifying: usize },
    /// 进入 Danger, 附带告警音
    CrowdDanger {
        qualifying: usize,
        alarm: AlarmPattern,
    },
    /// 回落到 Normal
    CrowdCleared { qualifying: usize },
    /// 武器告警 (受去抖限制)
    WeaponDetected {
        labels: Vec<String>,
        alarm: AlarmPattern,
    },
}

impl AlertEvent {
    /// 需要播放的告警音
    pub fn alarm(&self) -> Option<AlarmPattern> {
        match self {
            AlertEvent::CrowdDanger { alarm, .. } | AlertEvent::WeaponDetected { alarm, .. } => {
                Some(*alarm)
            }
            _ => None,
        }
    }

    /// 日志文本
    pub fn message(&self) -> String {
        match self {
            AlertEvent::CrowdWarning { qualifying } => {
                format!("⚠️ 人群聚集: {} 人, 进入监视", qualifying)
            }
            AlertEvent::CrowdDanger { qualifying, .. } => {
                format!("🚨 人群告警激活: {} 人持续聚集", qualifying)
            }
            AlertEvent::CrowdCleared { qualifying } => {
                format!("✅ 人群告警解除: {} 人, 恢复正常", qualifying)
            }
            AlertEvent::WeaponDetected { labels, .. } => {
                let text = if labels.is_empty() {
                    "DANGEROUS OBJECT".to_string()
                } else {
                    labels.join(", ")
                };
                format!("🚨 紧急 - 检测到危险物品: {}", text)
            }
        }
    }
}

/// 单帧评估结果
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AlertOutcome {
    pub crowd_level: CrowdLevel,
    pub qualifying: usize,
    pub weapon_active: bool,
    pub weapon_labels: Vec<String>,
    pub events: Vec<AlertEvent>,
}

// ========== 告警引擎 ==========

#[derive(Debug, Default)]
pub struct AlertEngine {
    crowd: CrowdAlertState,
    weapon: WeaponAlertState,
}

impl AlertEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn crowd_state(&self) -> &CrowdAlertState {
        &self.crowd
    }

    pub fn weapon_state(&self) -> &WeaponAlertState {
        &self.weapon
    }

    /// 评估一帧
    pub fn evaluate(
        &mut self,
        tracks: &BTreeMap<u64, Track>,
        weapons: &[BBox],
        now: Instant,
        config: &AlertConfig,
    ) -> AlertOutcome {
        let mut events = Vec::new();
        let qualifying = qualifying_count(tracks, now, config.dwell());

        self.crowd.step(
            qualifying,
            config.crowd_danger_threshold as usize,
            config.dwell(),
            now,
            &mut events,
        );
        self.weapon
            .step(weapons, config.weapon_debounce(), now, &mut events);

        AlertOutcome {
            crowd_level: self.crowd.level,
            qualifying,
            weapon_active: self.weapon.active,
            weapon_labels: self.weapon.current_labels.iter().cloned().collect(),
            events,
        }
    }
}

/// 合格轨迹数: 非工作人员且在场时长 ≥ 停留时间
pub fn qualifying_count(tracks: &BTreeMap<u64, Track>, now: Instant, dwell: Duration) -> usize {
    tracks
        .values()
        .filter(|t| !t.is_worker && t.dwell(now) >= dwell)
        .count()
}
