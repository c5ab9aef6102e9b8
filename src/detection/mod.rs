/// 检测系统 (Detection System)
///
/// 流水线线程内的智能分析部分
/// - Detector: 目标检测接口 (外部模型) 与回放实现
/// - Labels:   行人/危险物品分拣
/// - Staff:    深色制服安保人员过滤
/// - Shape:    轮廓形状检测 (细长物体/链条)
/// - Tracker:  质心跟踪
pub mod detector;
pub mod labels;
pub mod shape;
pub mod staff;
pub mod tracker;
pub mod types;

pub use detector::{Detector, NullDetector, ReplayDetector};
pub use labels::{danger_class, split_detections, DangerClass, FrameDetections, Severity};
pub use shape::{detect_shapes, ShapeKind};
pub use staff::{is_dark_uniform, partition_staff};
pub use tracker::{CentroidTracker, Track, Tracker};
pub use types::{BBox, Frame, Point};
