//! 声音告警接口
//!
//! 告警引擎只产生告警请求, 实际播放由外部实现 `AlarmSink`

use std::time::Duration;

use crossbeam_channel::Sender;
use log::warn;
use serde::Serialize;

/// 单个提示音
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tone {
    pub frequency_hz: u32,
    pub duration: Duration,
    /// 播放后的静音间隔
    pub gap_after: Duration,
}

/// 告警音型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AlarmPattern {
    /// 人群危险: 800Hz 单音 0.5s
    CrowdDanger,
    /// 武器告警: 5 声急促音, 频率递增
    WeaponEmergency,
}

impl AlarmPattern {
    pub fn tones(&self) -> Vec<Tone> {
        match self {
            AlarmPattern::CrowdDanger => vec![Tone {
                frequency_hz: 800,
                duration: Duration::from_millis(500),
                gap_after: Duration::ZERO,
            }],
            AlarmPattern::WeaponEmergency => (0..5)
                .map(|i| Tone {
                    frequency_hz: 1200 + i * 100,
                    duration: Duration::from_millis(200),
                    gap_after: Duration::from_millis(100),
                })
                .collect(),
        }
    }

    /// 整段音型时长
    pub fn total_duration(&self) -> Duration {
        self.tones().iter().map(|t| t.duration + t.gap_after).sum()
    }
}

/// 告警请求
#[derive(Clone, Debug, PartialEq)]
pub struct AlarmRequest {
    pub pattern: AlarmPattern,
    pub message: String,
}

/// 告警输出 Trait
pub trait AlarmSink: Send {
    fn sound(&mut self, request: AlarmRequest);
}

/// 默认实现: 只写日志
#[derive(Debug, Default)]
pub struct LogAlarm;

impl AlarmSink for LogAlarm {
    fn sound(&mut self, request: AlarmRequest) {
        warn!(
            "🔊 告警音 {:?} ({} 声, {:?}): {}",
            request.pattern,
            request.pattern.tones().len(),
            request.pattern.total_duration(),
            request.message
        );
    }
}

/// 转发到通道, 由外部播放线程消费
#[derive(Debug, Clone)]
pub struct ChannelAlarm {
    tx: Sender<AlarmRequest>,
}

impl ChannelAlarm {
    pub fn new(tx: Sender<AlarmRequest>) -> Self {
        Self { tx }
    }
}

impl AlarmSink for ChannelAlarm {
    fn sound(&mut self, request: AlarmRequest) {
        // 播放端跟不上时丢弃, 不阻塞流水线
        if self.tx.try_send(request).is_err() {
            warn!("⚠️ 告警通道已满或已关闭, 丢弃告警");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns() {
        let crowd = AlarmPattern::CrowdDanger.tones();
        assert_eq!(crowd.len(), 1);
        assert_eq!(crowd[0].frequency_hz, 800);

        let weapon = AlarmPattern::WeaponEmergency.tones();
        let freqs: Vec<u32> = weapon.iter().map(|t| t.frequency_hz).collect();
        assert_eq!(freqs, vec![1200, 1300, 1400, 1500, 1600]);
        assert_eq!(
            AlarmPattern::WeaponEmergency.total_duration(),
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn test_channel_alarm_never_blocks() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut sink = ChannelAlarm::new(tx);
        for _ in 0..3 {
            sink.sound(AlarmRequest {
                pattern: AlarmPattern::CrowdDanger,
                message: "test".to_string(),
            });
        }
        assert_eq!(rx.len(), 1);
    }
}
