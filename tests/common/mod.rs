/// 集成测试公共工具
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use objdetect_rs::ModelType;

/// 查找模型文件, 不存在时返回 None (测试跳过)
pub fn find_model_path(model_type: ModelType) -> Option<PathBuf> {
    let names: &[&str] = match model_type {
        ModelType::RetinaNet => &["resnet50_coco_best_v2.1.0.onnx", "retinanet.onnx"],
        ModelType::YOLOv3 => &["yolo.onnx", "yolov3.onnx"],
        ModelType::TinyYOLOv3 => &["yolo-tiny.onnx", "tiny-yolov3.onnx"],
    };
    names
        .iter()
        .flat_map(|n| [Path::new("models").join(n), Path::new("../models").join(n)])
        .find(|p| p.exists())
}

/// 测试图片: 优先使用 fixtures, 否则在 `dir` 中生成一张
pub fn fixture_image(dir: &Path) -> PathBuf {
    let candidates = ["fixtures/images/1.jpg", "../fixtures/images/1.jpg"];
    if let Some(p) = candidates.iter().map(PathBuf::from).find(|p| p.exists()) {
        return p;
    }
    let path = dir.join("synthetic.png");
    synthetic_image(160, 120).save(&path).unwrap();
    path
}

/// 渐变 + 色块的合成图片
pub fn synthetic_image(w: u32, h: u32) -> RgbImage {
    let mut img = RgbImage::from_fn(w, h, |x, y| Rgb([(x * 255 / w) as u8, (y * 255 / h) as u8, 96]));
    for y in h / 4..h / 2 {
        for x in w / 4..w / 2 {
            img.put_pixel(x, y, Rgb([220, 30, 30]));
        }
    }
    img
}

/// 跳过缺失模型的测试
#[macro_export]
macro_rules! require_model {
    ($model_type:expr) => {
        match $crate::common::find_model_path($model_type) {
            Some(p) => p,
            None => {
                eprintln!("Skipping test: {} model not found", $model_type);
                return;
            }
        }
    };
}
