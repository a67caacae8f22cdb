#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 检测配置参数 (JSON + 命令行)
pub mod detection; // 目标检测门面 ObjectDetection
pub mod error; // 错误类型
pub mod models; // 模型接口与具体实现 (RetinaNet / YOLOv3 / TinyYOLOv3)
pub mod ort_backend; // ONNX Runtime 推理引擎

pub use crate::config::{Args, DetectorConfig};
pub use crate::detection::{
    AnnotatedImage, BoxPoints, CustomObjects, DetectedObject, DetectionOutput, DetectionRequest,
    ExtractedObjects, ImageInput, ImageOutput, ObjectDetection,
};
pub use crate::error::{DetectionError, Result};
pub use crate::models::{DetectionSpeed, Model, ModelType, COCO_CLASSES};
pub use crate::ort_backend::{InputLayout, OrtBackend, OrtConfig, OrtEP};

/// 非极大值抑制 (类别无关)
///
/// 按置信度降序排列, 与已保留框 IoU 超过阈值的框被丢弃。
pub fn non_max_suppression(xs: &mut Vec<Bbox>, iou_threshold: f32) {
    non_max_suppression_limit(xs, iou_threshold, usize::MAX);
}

/// 非极大值抑制, 保留 `limit` 个框后停止
fn non_max_suppression_limit(xs: &mut Vec<Bbox>, iou_threshold: f32, limit: usize) {
    xs.sort_by(|b1, b2| b2.confidence().total_cmp(&b1.confidence()));

    let mut current_index = 0;
    for index in 0..xs.len() {
        if current_index >= limit {
            break;
        }
        let mut drop = false;
        for prev_index in 0..current_index {
            let iou = xs[prev_index].iou(&xs[index]);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

/// 按类别分组的非极大值抑制
///
/// 每个类别独立做 NMS, 每类最多保留 `max_per_class` 个框,
/// 结果按置信度降序返回。
pub fn non_max_suppression_per_class(
    xs: Vec<Bbox>,
    iou_threshold: f32,
    max_per_class: usize,
) -> Vec<Bbox> {
    let mut class_ids: Vec<usize> = xs.iter().map(|b| b.id()).collect();
    class_ids.sort_unstable();
    class_ids.dedup();

    let mut ys = Vec::with_capacity(xs.len());
    for id in class_ids {
        let mut group: Vec<Bbox> = xs.iter().filter(|b| b.id() == id).cloned().collect();
        non_max_suppression_limit(&mut group, iou_threshold, max_per_class);
        ys.extend(group);
    }
    ys.sort_by(|b1, b2| b2.confidence().total_cmp(&b1.confidence()));
    ys
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bbox {
    // a bounding box around an object
    xmin: f32,
    ymin: f32,
    width: f32,
    height: f32,
    id: usize,
    confidence: f32,
}

impl Bbox {
    pub fn new(xmin: f32, ymin: f32, width: f32, height: f32, id: usize, confidence: f32) -> Self {
        Self {
            xmin,
            ymin,
            width,
            height,
            id,
            confidence,
        }
    }

    pub fn from_xyxy(x1: f32, y1: f32, x2: f32, y2: f32, id: usize, confidence: f32) -> Self {
        Self::new(x1, y1, x2 - x1, y2 - y1, id, confidence)
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn xmin(&self) -> f32 {
        self.xmin
    }

    pub fn ymin(&self) -> f32 {
        self.ymin
    }

    pub fn xmax(&self) -> f32 {
        self.xmin + self.width
    }

    pub fn ymax(&self) -> f32 {
        self.ymin + self.height
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.) * self.height.max(0.)
    }

    /// 裁剪到图像范围 [0, w] x [0, h]
    pub fn clip(&self, w: f32, h: f32) -> Self {
        let x1 = self.xmin.clamp(0., w);
        let y1 = self.ymin.clamp(0., h);
        let x2 = self.xmax().clamp(0., w);
        let y2 = self.ymax().clamp(0., h);
        Self::from_xyxy(x1, y1, x2, y2, self.id, self.confidence)
    }

    pub fn intersection_area(&self, another: &Bbox) -> f32 {
        let l = self.xmin.max(another.xmin);
        let r = self.xmax().min(another.xmax());
        let t = self.ymin.max(another.ymin);
        let b = self.ymax().min(another.ymax());
        (r - l).max(0.) * (b - t).max(0.)
    }

    pub fn union(&self, another: &Bbox) -> f32 {
        self.area() + another.area() - self.intersection_area(another)
    }

    pub fn iou(&self, another: &Bbox) -> f32 {
        let union = self.union(another);
        if union <= 0. {
            return 0.;
        }
        self.intersection_area(another) / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = Bbox::new(10., 10., 20., 20., 0, 0.9);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = Bbox::new(0., 0., 10., 10., 0, 0.9);
        let b = Bbox::new(20., 20., 10., 10., 0, 0.8);
        assert_eq!(a.iou(&b), 0.);
    }

    #[test]
    fn nms_keeps_highest_of_overlapping_boxes() {
        let mut xs = vec![
            Bbox::new(0., 0., 100., 100., 0, 0.6),
            Bbox::new(2., 2., 100., 100., 0, 0.9),
            Bbox::new(300., 300., 50., 50., 0, 0.7),
        ];
        non_max_suppression(&mut xs, 0.45);
        assert_eq!(xs.len(), 2);
        assert_eq!(xs[0].confidence(), 0.9);
        assert_eq!(xs[1].confidence(), 0.7);
    }

    #[test]
    fn per_class_nms_does_not_suppress_across_classes() {
        let xs = vec![
            Bbox::new(0., 0., 100., 100., 0, 0.6),
            Bbox::new(1., 1., 100., 100., 1, 0.9),
            Bbox::new(2., 2., 100., 100., 1, 0.5),
        ];
        let ys = non_max_suppression_per_class(xs, 0.45, 20);
        assert_eq!(ys.len(), 2);
        assert_eq!(ys[0].id(), 1);
        assert_eq!(ys[1].id(), 0);
    }

    #[test]
    fn per_class_nms_caps_boxes_per_class() {
        let xs = (0..5)
            .map(|i| Bbox::new(i as f32 * 200., 0., 50., 50., 3, 0.5 + i as f32 * 0.05))
            .collect();
        let ys = non_max_suppression_per_class(xs, 0.45, 2);
        assert_eq!(ys.len(), 2);
        assert!(ys[0].confidence() > ys[1].confidence());
    }

    #[test]
    fn per_class_cap_skips_suppressed_boxes() {
        // 0.8 被 0.9 抑制, 第二个保留的是 0.7
        let xs = vec![
            Bbox::new(0., 0., 100., 100., 5, 0.9),
            Bbox::new(1., 1., 100., 100., 5, 0.8),
            Bbox::new(300., 300., 50., 50., 5, 0.7),
            Bbox::new(600., 600., 50., 50., 5, 0.6),
        ];
        let ys = non_max_suppression_per_class(xs.clone(), 0.45, 2);
        let confs: Vec<f32> = ys.iter().map(|b| b.confidence()).collect();
        assert_eq!(confs, vec![0.9, 0.7]);

        assert_eq!(non_max_suppression_per_class(xs.clone(), 0.45, 1).len(), 1);
        assert!(non_max_suppression_per_class(xs, 0.45, 0).is_empty());
    }

    #[test]
    fn clip_limits_box_to_image() {
        let b = Bbox::from_xyxy(-5., -5., 120., 80., 0, 0.5).clip(100., 60.);
        assert_eq!((b.xmin(), b.ymin(), b.xmax(), b.ymax()), (0., 0., 100., 60.));
    }
}
