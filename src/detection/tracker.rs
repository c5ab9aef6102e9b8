//! 多目标跟踪 (质心跟踪器)
//! Centroid-based multi-object tracking
//!
//! 匹配策略为贪心最近邻: 所有 (轨迹, 检测质心) 对按距离升序排列,
//! 依次取两端都未被占用的配对。这不是全局最优分配 (如匈牙利算法),
//! 轨迹交叉时可能交换ID; 也不设距离上限, 数量相等时远处的检测
//! 同样会被匹配。距离相同的配对按迭代顺序决定, 结果只是近似的。

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use log::debug;

use super::types::{BBox, Point};

// ========== 公共数据结构 ==========

/// 跟踪对象
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    /// 唯一跟踪ID (单调递增,永不复用)
    pub id: u64,

    /// 当前质心
    pub centroid: Point,

    /// 连续丢失帧数
    pub disappeared: u32,

    /// 首次出现时间
    pub first_seen: Instant,

    /// 工作人员标记 (仅由操作员设置/清除)
    pub is_worker: bool,
}

impl Track {
    /// 在场时长
    pub fn dwell(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.first_seen)
    }
}

// ========== 跟踪器统一接口 ==========

/// 多目标跟踪器 Trait
pub trait Tracker {
    /// 更新跟踪器
    ///
    /// # 参数
    /// - `detections`: 当前帧的行人检测框
    /// - `now`: 当前帧时间
    ///
    /// # 返回
    /// 当前所有活跃轨迹的 ID → 质心
    fn update(&mut self, detections: &[BBox], now: Instant) -> BTreeMap<u64, Point>;

    /// 清除所有轨迹 (ID计数器不回退)
    fn reset(&mut self);

    /// 获取当前跟踪数量
    fn track_count(&self) -> usize;
}

// ========== 质心跟踪器 ==========

pub struct CentroidTracker {
    next_id: u64,
    tracks: BTreeMap<u64, Track>,
    max_disappeared: u32,
}

impl CentroidTracker {
    pub fn new(max_disappeared: u32) -> Self {
        Self {
            next_id: 0,
            tracks: BTreeMap::new(),
            max_disappeared,
        }
    }

    /// 运行时修改最大丢失帧数,下一次 update 生效
    pub fn set_max_disappeared(&mut self, max_disappeared: u32) {
        self.max_disappeared = max_disappeared;
    }

    pub fn max_disappeared(&self) -> u32 {
        self.max_disappeared
    }

    pub fn tracks(&self) -> &BTreeMap<u64, Track> {
        &self.tracks
    }

    pub fn get(&self, id: u64) -> Option<&Track> {
        self.tracks.get(&id)
    }

    /// 设置/清除工作人员标记, 返回该ID是否存在
    pub fn set_worker(&mut self, id: u64, is_worker: bool) -> bool {
        match self.tracks.get_mut(&id) {
            Some(track) => {
                track.is_worker = is_worker;
                true
            }
            None => false,
        }
    }

    pub fn centroids(&self) -> BTreeMap<u64, Point> {
        self.tracks
            .iter()
            .map(|(id, track)| (*id, track.centroid))
            .collect()
    }

    fn register(&mut self, centroid: Point, now: Instant) {
        let id = self.next_id;
        self.next_id += 1;
        self.tracks.insert(
            id,
            Track {
                id,
                centroid,
                disappeared: 0,
                first_seen: now,
                is_worker: false,
            },
        );
        debug!("➕ 新轨迹 #{} @ ({:.0}, {:.0})", id, centroid.x, centroid.y);
    }

    /// 丢失帧数+1, 超过阈值时删除
    fn age(&mut self, id: u64) {
        let expired = match self.tracks.get_mut(&id) {
            Some(track) => {
                track.disappeared += 1;
                track.disappeared > self.max_disappeared
            }
            None => false,
        };
        if expired {
            self.tracks.remove(&id);
            debug!("➖ 轨迹 #{} 已移除", id);
        }
    }
}

impl Default for CentroidTracker {
    fn default() -> Self {
        Self::new(40)
    }
}

impl Tracker for CentroidTracker {
    fn update(&mut self, detections: &[BBox], now: Instant) -> BTreeMap<u64, Point> {
        let inputs: Vec<Point> = detections.iter().map(BBox::centroid).collect();

        // 无检测: 所有轨迹老化
        if inputs.is_empty() {
            let ids: Vec<u64> = self.tracks.keys().copied().collect();
            for id in ids {
                self.age(id);
            }
            return self.centroids();
        }

        // 无轨迹: 全部注册
        if self.tracks.is_empty() {
            for centroid in inputs {
                self.register(centroid, now);
            }
            return self.centroids();
        }

        // 距离矩阵 (展开为配对列表)
        let ids: Vec<u64> = self.tracks.keys().copied().collect();
        let mut pairs = Vec::with_capacity(ids.len() * inputs.len());
        for (row, id) in ids.iter().enumerate() {
            let centroid = self.tracks[id].centroid;
            for (col, input) in inputs.iter().enumerate() {
                pairs.push((centroid.distance(input), row, col));
            }
        }
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        // 贪心分配
        let mut used_rows = vec![false; ids.len()];
        let mut used_cols = vec![false; inputs.len()];
        for (_, row, col) in pairs {
            if used_rows[row] || used_cols[col] {
                continue;
            }
            if let Some(track) = self.tracks.get_mut(&ids[row]) {
                track.centroid = inputs[col];
                track.disappeared = 0;
            }
            used_rows[row] = true;
            used_cols[col] = true;
        }

        for (row, id) in ids.iter().enumerate() {
            if !used_rows[row] {
                self.age(*id);
            }
        }
        for (col, centroid) in inputs.into_iter().enumerate() {
            if !used_cols[col] {
                self.register(centroid, now);
            }
        }

        self.centroids()
    }

    fn reset(&mut self) {
        self.tracks.clear();
    }

    fn track_count(&self) -> usize {
        self.tracks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn person(cx: f32, cy: f32) -> BBox {
        BBox::new(cx - 10.0, cy - 20.0, cx + 10.0, cy + 20.0, "person", 0.9)
    }

    #[test]
    fn test_register_on_empty() {
        let mut tracker = CentroidTracker::new(5);
        let now = Instant::now();
        let objects = tracker.update(&[person(10.0, 10.0), person(100.0, 100.0)], now);

        assert_eq!(objects.len(), 2);
        assert_eq!(objects[&0], Point::new(10.0, 10.0));
        assert_eq!(objects[&1], Point::new(100.0, 100.0));
        assert!(tracker.tracks().values().all(|t| t.first_seen == now));
    }

    #[test]
    fn test_match_updates_centroid() {
        let mut tracker = CentroidTracker::new(5);
        let t0 = Instant::now();
        tracker.update(&[person(10.0, 10.0), person(100.0, 100.0)], t0);
        // 一帧丢失
        tracker.update(&[person(12.0, 11.0)], t0 + Duration::from_millis(33));
        assert_eq!(tracker.get(1).unwrap().disappeared, 1);

        let t2 = t0 + Duration::from_millis(66);
        let objects = tracker.update(&[person(104.0, 98.0), person(14.0, 12.0)], t2);

        assert_eq!(objects.len(), 2);
        assert_eq!(objects[&0], Point::new(14.0, 12.0));
        assert_eq!(objects[&1], Point::new(104.0, 98.0));
        // 重新匹配后丢失计数清零, 首次出现时间不变
        assert_eq!(tracker.get(1).unwrap().disappeared, 0);
        assert_eq!(tracker.get(1).unwrap().first_seen, t0);
    }

    #[test]
    fn test_deregister_after_max_disappeared() {
        let max = 3;
        let mut tracker = CentroidTracker::new(max);
        let now = Instant::now();
        tracker.update(&[person(50.0, 50.0)], now);

        // 连续 max 帧未匹配仍保留
        for _ in 0..max {
            tracker.update(&[], now);
            assert_eq!(tracker.track_count(), 1);
        }
        // 第 max+1 帧删除
        tracker.update(&[], now);
        assert_eq!(tracker.track_count(), 0);
    }

    #[test]
    fn test_empty_detections_do_not_register() {
        let mut tracker = CentroidTracker::new(2);
        let objects = tracker.update(&[], Instant::now());
        assert!(objects.is_empty());
        assert_eq!(tracker.track_count(), 0);
    }

    #[test]
    fn test_extra_detections_register() {
        let mut tracker = CentroidTracker::new(1);
        let t0 = Instant::now();
        tracker.update(&[person(0.0, 0.0)], t0);

        let t1 = t0 + Duration::from_secs(1);
        let objects = tracker.update(&[person(300.0, 0.0), person(1.0, 0.0)], t1);
        assert_eq!(objects[&0], Point::new(1.0, 0.0));
        assert_eq!(objects[&1], Point::new(300.0, 0.0));
        assert_eq!(tracker.get(1).unwrap().first_seen, t1);
    }

    #[test]
    fn test_closest_pair_wins() {
        let mut tracker = CentroidTracker::new(5);
        let now = Instant::now();
        tracker.update(&[person(0.0, 0.0), person(10.0, 0.0)], now);

        // (9,0) 离 #1 最近, 先分配; #0 只能拿到剩下的 (30,0)
        let objects = tracker.update(&[person(9.0, 0.0), person(30.0, 0.0)], now);
        assert_eq!(objects[&1], Point::new(9.0, 0.0));
        assert_eq!(objects[&0], Point::new(30.0, 0.0));
    }

    #[test]
    fn test_no_distance_cutoff() {
        let mut tracker = CentroidTracker::new(5);
        let now = Instant::now();
        tracker.update(&[person(0.0, 0.0)], now);
        let objects = tracker.update(&[person(5000.0, 5000.0)], now);

        assert_eq!(objects.len(), 1);
        assert_eq!(objects[&0], Point::new(5000.0, 5000.0));
    }

    #[test]
    fn test_worker_flag_survives_rematch() {
        let mut tracker = CentroidTracker::new(5);
        let now = Instant::now();
        tracker.update(&[person(10.0, 10.0)], now);
        assert!(tracker.set_worker(0, true));
        assert!(!tracker.set_worker(42, true));

        tracker.update(&[], now);
        tracker.update(&[person(15.0, 12.0)], now);
        assert!(tracker.get(0).unwrap().is_worker);

        tracker.set_worker(0, false);
        tracker.update(&[person(16.0, 12.0)], now);
        assert!(!tracker.get(0).unwrap().is_worker);
    }

    #[test]
    fn test_ids_never_reused() {
        let mut rng = rand::thread_rng();
        let mut tracker = CentroidTracker::new(2);
        let now = Instant::now();
        let mut seen_max: Option<u64> = None;
        let mut all_ids = std::collections::BTreeSet::new();

        for _ in 0..500 {
            let n = rng.gen_range(0..6);
            let boxes: Vec<BBox> = (0..n)
                .map(|_| person(rng.gen_range(0.0..640.0), rng.gen_range(0.0..480.0)))
                .collect();
            let before: Vec<u64> = tracker.tracks().keys().copied().collect();
            let objects = tracker.update(&boxes, now);

            for id in objects.keys() {
                if !before.contains(id) {
                    // 新ID严格大于历史上出现过的所有ID
                    if let Some(max) = seen_max {
                        assert!(*id > max);
                    }
                    assert!(all_ids.insert(*id));
                }
                seen_max = Some(seen_max.map_or(*id, |m| m.max(*id)));
            }
        }
    }

    #[test]
    fn test_reset_keeps_counter() {
        let mut tracker = CentroidTracker::new(5);
        let now = Instant::now();
        tracker.update(&[person(1.0, 1.0), person(2.0, 2.0)], now);
        tracker.reset();
        assert_eq!(tracker.track_count(), 0);

        let objects = tracker.update(&[person(1.0, 1.0)], now);
        assert_eq!(objects.keys().copied().collect::<Vec<_>>(), vec![2]);
    }
}
