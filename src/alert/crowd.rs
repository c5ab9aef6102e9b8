//! 人群告警状态机
//!
//! Normal → Warning: 合格人数 ≥ 阈值时立即进入
//! Warning → Danger: 持续 Warning 达到停留时间
//! Warning/Danger → Normal: 合格人数 < 阈值时立即回落

use std::time::{Duration, Instant};

use serde::Serialize;

use super::AlertEvent;
use crate::alarm::AlarmPattern;

/// 人群告警等级
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum CrowdLevel {
    #[default]
    Normal,
    Warning,
    Danger,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CrowdAlertState {
    pub level: CrowdLevel,
    pub warning_started_at: Option<Instant>,
}

impl CrowdAlertState {
    pub(crate) fn step(
        &mut self,
        qualifying: usize,
        threshold: usize,
        dwell: Duration,
        now: Instant,
        events: &mut Vec<AlertEvent>,
    ) {
        if qualifying >= threshold {
            match self.level {
                CrowdLevel::Normal => {
                    self.level = CrowdLevel::Warning;
                    self.warning_started_at = Some(now);
                    events.push(AlertEvent::CrowdWarning { qualifying });
                }
                CrowdLevel::Warning => {
                    let started = *self.warning_started_at.get_or_insert(now);
                    if now.saturating_duration_since(started) >= dwell {
                        self.level = CrowdLevel::Danger;
                        events.push(AlertEvent::CrowdDanger {
                            qualifying,
                            alarm: AlarmPattern::CrowdDanger,
                        });
                    }
                }
                CrowdLevel::Danger => {}
            }
        } else if self.level != CrowdLevel::Normal {
            self.level = CrowdLevel::Normal;
            self.warning_started_at = None;
            events.push(AlertEvent::CrowdCleared { qualifying });
        }
    }
}
