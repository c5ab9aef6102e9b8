//! 形状检测: 细长物体 / 链条状物体
//!
//! 不依赖检测模型, 直接在灰度边缘图上找外轮廓:
//! 模糊 → Canny → 外轮廓 → 面积/长宽比/凸包实心度判定。
//! 结果作为危险物品框并入武器告警。

use image::RgbImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometry::{arc_length, contour_area, convex_hull};
use imageproc::point::Point;

use super::types::BBox;

pub const LONG_OBJECT_LABEL: &str = "LONG_OBJECT_SUSPECT";
pub const CHAIN_LABEL: &str = "CHAIN_SUSPECT";

/// 5x5 高斯核对应的 sigma
const BLUR_SIGMA: f32 = 1.1;
const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;

const MIN_AREA: f64 = 500.0;
const MAX_AREA: f64 = 50_000.0;

const LONG_ASPECT: f64 = 4.0;
const LONG_MIN_AREA: f64 = 1_000.0;

const CHAIN_SOLIDITY: f64 = 0.3;
const CHAIN_MIN_AREA: f64 = 2_000.0;
const CHAIN_MIN_PERIMETER: f64 = 200.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapeKind {
    LongObject,
    Chain,
}

impl ShapeKind {
    pub fn label(&self) -> &'static str {
        match self {
            ShapeKind::LongObject => LONG_OBJECT_LABEL,
            ShapeKind::Chain => CHAIN_LABEL,
        }
    }
}

/// 对单个闭合轮廓分类; 一个轮廓可能同时细长且不实心
pub fn classify_contour(points: &[Point<i32>]) -> Vec<ShapeKind> {
    let mut kinds = Vec::new();
    if points.len() < 3 {
        return kinds;
    }

    let area = contour_area(points).abs();
    if !(MIN_AREA..=MAX_AREA).contains(&area) {
        return kinds;
    }

    let (x1, y1, x2, y2) = bounds(points);
    let w = f64::from(x2 - x1 + 1);
    let h = f64::from(y2 - y1 + 1);
    let aspect = w.max(h) / w.min(h);
    if aspect > LONG_ASPECT && area > LONG_MIN_AREA {
        kinds.push(ShapeKind::LongObject);
    }

    let hull = convex_hull(points);
    let hull_area = contour_area(&hull).abs();
    if hull_area > 0.0 {
        let solidity = area / hull_area;
        let perimeter = arc_length(points, true);
        if solidity < CHAIN_SOLIDITY && area > CHAIN_MIN_AREA && perimeter > CHAIN_MIN_PERIMETER {
            kinds.push(ShapeKind::Chain);
        }
    }
    kinds
}

/// 检测整帧中的可疑形状, 返回带显示名称的框
pub fn detect_shapes(image: &RgbImage) -> Vec<BBox> {
    let gray = image::imageops::grayscale(image);
    let blurred = gaussian_blur_f32(&gray, BLUR_SIGMA);
    let edges = canny(&blurred, CANNY_LOW, CANNY_HIGH);

    let mut found = Vec::new();
    for contour in find_contours::<i32>(&edges) {
        // 只取最外层轮廓
        if contour.border_type != BorderType::Outer || contour.parent.is_some() {
            continue;
        }
        let kinds = classify_contour(&contour.points);
        if kinds.is_empty() {
            continue;
        }
        let (x1, y1, x2, y2) = bounds(&contour.points);
        for kind in kinds {
            found.push(BBox::new(
                x1 as f32,
                y1 as f32,
                (x2 + 1) as f32,
                (y2 + 1) as f32,
                kind.label(),
                1.0,
            ));
        }
    }
    found
}

fn bounds(points: &[Point<i32>]) -> (i32, i32, i32, i32) {
    points.iter().fold(
        (i32::MAX, i32::MAX, i32::MIN, i32::MIN),
        |(x1, y1, x2, y2), p| (x1.min(p.x), y1.min(p.y), x2.max(p.x), y2.max(p.y)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn polygon(points: &[(i32, i32)]) -> Vec<Point<i32>> {
        points.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    #[test]
    fn test_long_thin_object() {
        let bar = polygon(&[(0, 0), (200, 0), (200, 20), (0, 20)]);
        assert_eq!(classify_contour(&bar), vec![ShapeKind::LongObject]);
    }

    #[test]
    fn test_low_solidity_chain() {
        // L 形细条: 面积 4656, 凸包面积 22328, 周长 800
        let l_shape = polygon(&[(0, 0), (12, 0), (12, 188), (200, 188), (200, 200), (0, 200)]);
        assert_eq!(classify_contour(&l_shape), vec![ShapeKind::Chain]);
    }

    #[test]
    fn test_area_limits() {
        let small = polygon(&[(0, 0), (60, 0), (60, 5), (0, 5)]);
        assert!(classify_contour(&small).is_empty());
        let huge = polygon(&[(0, 0), (1000, 0), (1000, 100), (0, 100)]);
        assert!(classify_contour(&huge).is_empty());
        let square = polygon(&[(0, 0), (50, 0), (50, 50), (0, 50)]);
        assert!(classify_contour(&square).is_empty());
    }

    #[test]
    fn test_plain_frame_has_no_shapes() {
        let blank = RgbImage::from_pixel(160, 120, Rgb([90, 90, 90]));
        assert!(detect_shapes(&blank).is_empty());
    }
}
