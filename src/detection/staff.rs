//! 深色制服过滤 (安保人员识别)
//!
//! 检测框区域内深色像素 (HSV明度 ≤ dark_value) 占比超过阈值时判定为安保人员,
//! 不进入跟踪与人群计数。

use image::RgbImage;

use super::types::BBox;
use crate::config::DetectionConfig;

/// 判断检测框区域是否为深色制服
pub fn is_dark_uniform(image: &RgbImage, bbox: &BBox, dark_value: u8, dark_ratio: f32) -> bool {
    // 裁剪到图像范围内
    let x1 = bbox.x1.max(0.0) as u32;
    let y1 = bbox.y1.max(0.0) as u32;
    let x2 = (bbox.x2.max(0.0) as u32).min(image.width());
    let y2 = (bbox.y2.max(0.0) as u32).min(image.height());
    if x2 <= x1 || y2 <= y1 {
        return false;
    }

    let mut dark = 0u64;
    for y in y1..y2 {
        for x in x1..x2 {
            let [r, g, b] = image.get_pixel(x, y).0;
            // HSV: V = max(R, G, B)
            if r.max(g).max(b) <= dark_value {
                dark += 1;
            }
        }
    }
    let total = u64::from(x2 - x1) * u64::from(y2 - y1);
    dark as f32 / total as f32 > dark_ratio
}

/// 分离访客与安保人员, 返回 (访客框, 安保人数)
pub fn partition_staff(
    image: &RgbImage,
    persons: Vec<BBox>,
    config: &DetectionConfig,
) -> (Vec<BBox>, usize) {
    if !config.staff_filter {
        return (persons, 0);
    }
    let (staff, visitors): (Vec<BBox>, Vec<BBox>) = persons.into_iter().partition(|bbox| {
        is_dark_uniform(image, bbox, config.staff_dark_value, config.staff_dark_ratio)
    });
    (visitors, staff.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// 左半边黑色, 右半边白色
    fn half_dark() -> RgbImage {
        RgbImage::from_fn(100, 100, |x, _| {
            if x < 50 {
                Rgb([10, 10, 10])
            } else {
                Rgb([240, 240, 240])
            }
        })
    }

    #[test]
    fn test_dark_uniform() {
        let image = half_dark();
        let dark = BBox::new(0.0, 0.0, 40.0, 100.0, "person", 0.9);
        let light = BBox::new(60.0, 0.0, 100.0, 100.0, "person", 0.9);
        assert!(is_dark_uniform(&image, &dark, 50, 0.15));
        assert!(!is_dark_uniform(&image, &light, 50, 0.15));
    }

    #[test]
    fn test_out_of_bounds_box() {
        let image = half_dark();
        let outside = BBox::new(200.0, 200.0, 300.0, 300.0, "person", 0.9);
        assert!(!is_dark_uniform(&image, &outside, 50, 0.15));
        let clipped = BBox::new(-20.0, -20.0, 30.0, 30.0, "person", 0.9);
        assert!(is_dark_uniform(&image, &clipped, 50, 0.15));
    }

    #[test]
    fn test_partition() {
        let image = half_dark();
        let persons = vec![
            BBox::new(0.0, 0.0, 40.0, 100.0, "person", 0.9),
            BBox::new(60.0, 0.0, 100.0, 100.0, "person", 0.9),
        ];

        let disabled = DetectionConfig::default();
        let (visitors, staff) = partition_staff(&image, persons.clone(), &disabled);
        assert_eq!((visitors.len(), staff), (2, 0));

        let enabled = DetectionConfig {
            staff_filter: true,
            ..DetectionConfig::default()
        };
        let (visitors, staff) = partition_staff(&image, persons, &enabled);
        assert_eq!((visitors.len(), staff), (1, 1));
        assert_eq!(visitors[0].x1, 60.0);
    }
}
