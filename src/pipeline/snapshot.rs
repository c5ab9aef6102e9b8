//! 发布快照 (Published Snapshot)
//!
//! 流水线线程每帧生成一份不可变快照, 读者只做指针克隆;
//! 锁只在替换指针时持有。

use std::sync::{Arc, RwLock};
use std::time::Instant;

use serde::Serialize;

use crate::alert::CrowdLevel;
use crate::detection::{Frame, Track};

/// 轨迹视图 (供操作员查询)
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackView {
    pub id: u64,
    pub x: f32,
    pub y: f32,
    pub dwell_secs: f64,
    pub disappeared: u32,
    pub is_worker: bool,
}

impl TrackView {
    pub fn from_track(track: &Track, now: Instant) -> Self {
        Self {
            id: track.id,
            x: track.centroid.x,
            y: track.centroid.y,
            dwell_secs: track.dwell(now).as_secs_f64(),
            disappeared: track.disappeared,
            is_worker: track.is_worker,
        }
    }
}

/// 单帧日志记录, 以 JSON 写入 `sentinel::record`
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SnapshotRecord {
    pub timestamp: String,
    pub frame_index: u64,
    pub person_count: usize,
    pub weapon_active: bool,
    pub weapon_labels: Vec<String>,
    pub crowd_state: CrowdLevel,
}

#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub running: bool,
    pub source: Option<String>,
    pub last_error: Option<String>,
    pub frame_index: u64,
    /// 本帧访客人数 (已排除安保人员)
    pub person_count: usize,
    pub staff_count: usize,
    pub qualifying_count: usize,
    pub crowd_state: CrowdLevel,
    pub weapon_active: bool,
    pub weapon_labels: Vec<String>,
    pub tracks: Vec<TrackView>,
    /// 最近的记录 (旧 → 新)
    pub history: Vec<SnapshotRecord>,
    pub frame: Option<Frame>,
}

impl Snapshot {
    pub fn track_ids(&self) -> Vec<u64> {
        self.tracks.iter().map(|t| t.id).collect()
    }

    /// 单行状态摘要
    pub fn summary(&self) -> String {
        let workers = self.tracks.iter().filter(|t| t.is_worker).count();
        format!(
            "{} | 帧 {} | 人数 {} (安保 {}) | 合格 {} | 人群 {:?} | 武器 {} | 轨迹 {:?} (工作人员 {})",
            if self.running { "运行中" } else { "已停止" },
            self.frame_index,
            self.person_count,
            self.staff_count,
            self.qualifying_count,
            self.crowd_state,
            if self.weapon_active {
                self.weapon_labels.join(",")
            } else {
                "-".to_string()
            },
            self.track_ids(),
            workers,
        )
    }
}

/// 快照单元: `Arc` 指针替换
#[derive(Debug, Default)]
pub struct SnapshotCell {
    inner: RwLock<Arc<Snapshot>>,
}

impl SnapshotCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> Arc<Snapshot> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn publish(&self, snapshot: Snapshot) {
        let next = Arc::new(snapshot);
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = next;
    }

    /// 基于当前快照修改后发布 (用于运行状态切换)
    pub fn modify(&self, apply: impl FnOnce(&mut Snapshot)) {
        let mut next = Snapshot::clone(&self.load());
        apply(&mut next);
        self.publish(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readers_keep_old_snapshot() {
        let cell = SnapshotCell::new();
        let before = cell.load();
        cell.publish(Snapshot {
            frame_index: 7,
            person_count: 3,
            ..Snapshot::default()
        });
        assert_eq!(before.frame_index, 0);
        assert_eq!(cell.load().frame_index, 7);

        cell.modify(|s| s.running = true);
        let now = cell.load();
        assert!(now.running);
        assert_eq!(now.person_count, 3);
    }

    #[test]
    fn test_record_json() {
        let record = SnapshotRecord {
            timestamp: "2024-01-01T00:00:00+00:00".to_string(),
            frame_index: 1,
            person_count: 4,
            weapon_active: true,
            weapon_labels: vec!["KNIFE".to_string()],
            crowd_state: CrowdLevel::Warning,
        };
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["person_count"], 4);
        assert_eq!(json["crowd_state"], "Warning");
        assert_eq!(json["weapon_labels"][0], "KNIFE");
    }
}
