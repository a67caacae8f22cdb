/// 目标检测 (Object Detection)
///
/// - detector: ObjectDetection 门面 (加载模型, 检测, 输出)
/// - annotate: 画框与标签
/// - extract:  检测目标裁剪
/// - array:    图像与 ndarray 转换
pub mod annotate;
pub mod array;
pub mod detector;
pub mod extract;
mod types;

pub use detector::ObjectDetection;
pub use types::*;
