//! 检测类别分拣: 行人 / 危险物品
//!
//! 危险物品按 COCO 类别名查表, 每类有独立的置信度下限

use phf::phf_map;
use serde::Serialize;

use super::types::BBox;

pub const PERSON_LABEL: &str = "person";

/// 危险等级
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Severity {
    /// 刀具/剪刀/球棒
    High,
    /// 可疑物品
    Suspect,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DangerClass {
    pub label: &'static str,
    pub severity: Severity,
    pub min_confidence: f32,
}

const fn high(label: &'static str, min_confidence: f32) -> DangerClass {
    DangerClass {
        label,
        severity: Severity::High,
        min_confidence,
    }
}

const fn suspect(label: &'static str, min_confidence: f32) -> DangerClass {
    DangerClass {
        label,
        severity: Severity::Suspect,
        min_confidence,
    }
}

static DANGEROUS_OBJECTS: phf::Map<&'static str, DangerClass> = phf_map! {
    "knife" => high("KNIFE", 0.25),
    "scissors" => high("SCISSORS", 0.30),
    "baseball bat" => high("BAT", 0.30),
    "bottle" => suspect("BOTTLE", 0.25),
    "wine glass" => suspect("GLASS", 0.40),
    "cup" => suspect("CUP", 0.40),
    "hammer" => suspect("HAMMER", 0.25),
    "screwdriver" => suspect("SCREWDRIVER", 0.25),
    "tie" => suspect("TIE/ROPE", 0.25),
    "rope" => suspect("ROPE", 0.25),
    "chain" => suspect("CHAIN", 0.30),
    "umbrella" => suspect("UMBRELLA", 0.25),
    "handbag" => suspect("SUSPECT_BAG", 0.25),
    "backpack" => suspect("BACKPACK", 0.25),
    "suitcase" => suspect("SUITCASE", 0.25),
    "spoon" => suspect("SPOON", 0.25),
    "fork" => suspect("FORK", 0.25),
    "bowl" => suspect("METAL_BOWL", 0.25),
};

/// 查询危险物品类别
pub fn danger_class(label: &str) -> Option<&'static DangerClass> {
    DANGEROUS_OBJECTS.get(label.to_ascii_lowercase().as_str())
}

/// 单帧分拣结果
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameDetections {
    /// 行人框 (置信度已过滤)
    pub persons: Vec<BBox>,
    /// 危险物品框, `label` 已替换为显示名称
    pub weapons: Vec<BBox>,
}

/// 按类别分拣检测框, 其他类别丢弃
pub fn split_detections(boxes: Vec<BBox>, person_conf_threshold: f32) -> FrameDetections {
    let mut out = FrameDetections::default();
    for mut bbox in boxes {
        if bbox.label.eq_ignore_ascii_case(PERSON_LABEL) {
            if bbox.confidence > person_conf_threshold {
                out.persons.push(bbox);
            }
        } else if let Some(class) = danger_class(&bbox.label) {
            if bbox.confidence > class.min_confidence {
                bbox.label = class.label.to_string();
                out.weapons.push(bbox);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let knife = danger_class("knife").unwrap();
        assert_eq!(knife.label, "KNIFE");
        assert_eq!(knife.severity, Severity::High);
        assert_eq!(danger_class("Baseball Bat").unwrap().label, "BAT");
        assert!(danger_class("person").is_none());
        assert!(danger_class("dog").is_none());
    }

    #[test]
    fn test_split() {
        let boxes = vec![
            BBox::new(0.0, 0.0, 10.0, 20.0, "person", 0.9),
            BBox::new(0.0, 0.0, 10.0, 20.0, "person", 0.35), // 低于行人阈值
            BBox::new(5.0, 5.0, 8.0, 9.0, "knife", 0.3),
            BBox::new(5.0, 5.0, 8.0, 9.0, "cup", 0.35), // 低于杯子阈值
            BBox::new(5.0, 5.0, 8.0, 9.0, "scissors", 0.31),
            BBox::new(5.0, 5.0, 8.0, 9.0, "car", 0.99),
        ];
        let split = split_detections(boxes, 0.4);

        assert_eq!(split.persons.len(), 1);
        let labels: Vec<&str> = split.weapons.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["KNIFE", "SCISSORS"]);
    }
}
