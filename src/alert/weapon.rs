//! 武器告警状态机
//!
//! `active` 只反映当前帧; 日志与告警音受去抖间隔限制

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use super::AlertEvent;
use crate::alarm::AlarmPattern;
use crate::detection::BBox;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct WeaponAlertState {
    pub active: bool,
    pub last_emitted_at: Option<Instant>,
    pub current_labels: BTreeSet<String>,
}

impl WeaponAlertState {
    pub(crate) fn step(
        &mut self,
        weapons: &[BBox],
        debounce: Duration,
        now: Instant,
        events: &mut Vec<AlertEvent>,
    ) {
        self.active = !weapons.is_empty();
        if !self.active {
            // last_emitted_at 保留, 短时间内重新出现不会立即再次告警
            self.current_labels.clear();
            return;
        }

        self.current_labels = weapons.iter().map(|b| b.label.clone()).collect();

        let due = self
            .last_emitted_at
            .map_or(true, |last| now.saturating_duration_since(last) >= debounce);
        if due {
            self.last_emitted_at = Some(now);
            events.push(AlertEvent::WeaponDetected {
                labels: self.current_labels.iter().cloned().collect(),
                alarm: AlarmPattern::WeaponEmergency,
            });
        }
    }
}
