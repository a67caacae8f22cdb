//! 模型统一接口与实现
//!
//! # 架构说明
//!
//! ## 完整模型实现 (Full Model Implementation)
//! - **RetinaNet**: ResNet50 主干 + FPN, keras-retinanet 导出
//!   - 预处理: caffe 模式 (BGR + 均值减法), 短边缩放
//!   - 后处理: 框缩放 + 分类别 NMS
//!   - 文件: `retinanet.rs`
//! - **YOLOv3**: Darknet-53 主干, 三个检测头
//!   - 预处理: letterbox 缩放 (灰色填充)
//!   - 后处理: 锚框解码 + 分类别 NMS
//!   - 文件: `yolov3.rs`
//!
//! ## 委托模式 (Delegation)
//! - **TinyYOLOv3**: 两个检测头, 锚框不同, 其余复用 YOLOv3
//!   - 文件: `tiny_yolov3.rs`
//!
//! ## Model Trait
//! 统一的模型接口, 定义标准流程: preprocess → run → postprocess
//!
//! ## 使用示例
//! ```no_run
//! use objdetect_rs::models::{Model, ModelType};
//! use objdetect_rs::DetectorConfig;
//!
//! let config = DetectorConfig::default();
//! let mut model = ModelType::YOLOv3.build("models/yolo.onnx", &config, Default::default())?;
//! let image = image::open("data-images/11.jpg").unwrap();
//! let boxes = model.forward(&image, 0.4)?;
//! # Ok::<(), objdetect_rs::DetectionError>(())
//! ```
use std::path::Path;

use image::{DynamicImage, RgbImage};
use ndarray::{Array, IxDyn};
use serde::{Deserialize, Serialize};

use crate::{Bbox, DetectorConfig, InputLayout, OrtBackend, OrtConfig, Result};

/// 模型类型枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    /// RetinaNet (ResNet50 主干)
    RetinaNet,
    /// YOLOv3 标准模型
    YOLOv3,
    /// Tiny-YOLOv3 轻量模型
    TinyYOLOv3,
}

/// 检测框的表示方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxStyle {
    /// 定长数值数组 (RetinaNet)
    Array,
    /// 定长有序元组 (YOLO 系列)
    Tuple,
}

impl ModelType {
    /// 从模型路径推断模型类型
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.to_lowercase();
        if path.contains("retinanet") || path.contains("resnet50") {
            Some(ModelType::RetinaNet)
        } else if path.contains("tiny") {
            Some(ModelType::TinyYOLOv3)
        } else if path.contains("yolo") {
            Some(ModelType::YOLOv3)
        } else {
            None
        }
    }

    /// 获取模型推荐的IOU阈值
    pub fn default_iou_threshold(&self) -> f32 {
        match self {
            ModelType::RetinaNet => 0.5,
            ModelType::YOLOv3 | ModelType::TinyYOLOv3 => 0.45,
        }
    }

    pub fn box_style(&self) -> BoxStyle {
        match self {
            ModelType::RetinaNet => BoxStyle::Array,
            ModelType::YOLOv3 | ModelType::TinyYOLOv3 => BoxStyle::Tuple,
        }
    }

    /// 构建推理引擎并创建对应模型
    pub fn build(
        &self,
        path: impl AsRef<Path>,
        config: &DetectorConfig,
        speed: DetectionSpeed,
    ) -> Result<Box<dyn Model>> {
        let engine = OrtBackend::build(OrtConfig {
            f: path.as_ref().to_path_buf(),
            ep: config.ep(),
            trt_fp16: config.trt_fp16,
            num_threads: config.num_threads,
        })?;
        let model: Box<dyn Model> = match self {
            ModelType::RetinaNet => Box::new(RetinaNet::new(engine, config, speed)),
            ModelType::YOLOv3 => Box::new(YOLOv3::new(engine, config, speed)),
            ModelType::TinyYOLOv3 => Box::new(TinyYOLOv3::new(engine, config, speed)),
        };
        Ok(model)
    }
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelType::RetinaNet => "RetinaNet",
            ModelType::YOLOv3 => "YOLOv3",
            ModelType::TinyYOLOv3 => "TinyYOLOv3",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for ModelType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "retinanet" => Ok(ModelType::RetinaNet),
            "yolov3" | "yolo" => Ok(ModelType::YOLOv3),
            "tinyyolov3" | "tinyyolo" => Ok(ModelType::TinyYOLOv3),
            other => Err(format!(
                "unknown model type `{other}`, expected retinanet, yolov3 or tiny-yolov3"
            )),
        }
    }
}

/// 检测速度档位, 决定网络输入尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionSpeed {
    #[default]
    Normal,
    Fast,
    Faster,
    Fastest,
    Flash,
}

impl DetectionSpeed {
    /// RetinaNet 的 (短边, 长边上限)
    pub fn retinanet_sides(&self) -> (u32, u32) {
        match self {
            DetectionSpeed::Normal => (800, 1333),
            DetectionSpeed::Fast => (400, 700),
            DetectionSpeed::Faster => (300, 500),
            DetectionSpeed::Fastest => (200, 350),
            DetectionSpeed::Flash => (100, 250),
        }
    }

    /// YOLOv3 的正方形输入边长
    pub fn yolov3_size(&self) -> u32 {
        match self {
            DetectionSpeed::Normal => 416,
            DetectionSpeed::Fast => 320,
            DetectionSpeed::Faster => 208,
            DetectionSpeed::Fastest => 128,
            DetectionSpeed::Flash => 96,
        }
    }

    /// Tiny-YOLOv3 的正方形输入边长
    pub fn tiny_yolov3_size(&self) -> u32 {
        match self {
            DetectionSpeed::Normal => 832,
            DetectionSpeed::Fast => 576,
            DetectionSpeed::Faster => 416,
            DetectionSpeed::Fastest => 320,
            DetectionSpeed::Flash => 272,
        }
    }
}

impl std::str::FromStr for DetectionSpeed {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(DetectionSpeed::Normal),
            "fast" => Ok(DetectionSpeed::Fast),
            "faster" => Ok(DetectionSpeed::Faster),
            "fastest" => Ok(DetectionSpeed::Fastest),
            "flash" => Ok(DetectionSpeed::Flash),
            other => Err(format!(
                "unknown detection speed `{other}`, expected normal, fast, faster, fastest or flash"
            )),
        }
    }
}

/// 预处理结果: 输入张量 + 坐标还原所需的信息
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub tensor: Array<f32, IxDyn>,
    /// 原图 → 网络输入的缩放比例
    pub scale: f32,
    /// 原图宽高
    pub width0: u32,
    pub height0: u32,
}

/// 统一的深度学习模型接口
///
/// ## 核心流程
/// ```text
/// 原始图片 → preprocess → ndarray张量
///          ↓
///     推理引擎 run
///          ↓
///     原始输出 → postprocess → 检测框 (原图坐标)
/// ```
pub trait Model {
    /// 预处理: 图片 → 输入张量
    fn preprocess(&self, image: &DynamicImage) -> Result<Preprocessed>;

    /// 推理: 执行模型前向传播, 返回原始输出
    fn run(&mut self, xs: Array<f32, IxDyn>) -> Result<Vec<Array<f32, IxDyn>>>;

    /// 后处理: 原始输出 → 检测框
    ///
    /// # Arguments
    /// * `xs` - 模型原始输出
    /// * `meta` - 预处理信息 (用于坐标还原)
    /// * `conf` - 分数阈值 (0~1)
    fn postprocess(
        &self,
        xs: Vec<Array<f32, IxDyn>>,
        meta: &Preprocessed,
        conf: f32,
    ) -> Result<Vec<Bbox>>;

    /// 完整的推理流程: preprocess → run → postprocess
    fn forward(&mut self, image: &DynamicImage, conf: f32) -> Result<Vec<Bbox>> {
        let profile = self.profile();

        let t = std::time::Instant::now();
        let mut meta = self.preprocess(image)?;
        if profile {
            log::debug!("[Model Preprocess]: {:?}", t.elapsed());
        }

        let t = std::time::Instant::now();
        let tensor = std::mem::replace(&mut meta.tensor, Array::zeros(IxDyn(&[0])));
        let ys = self.run(tensor)?;
        if profile {
            log::debug!("[Model Inference]: {:?}", t.elapsed());
        }

        let t = std::time::Instant::now();
        let ys = self.postprocess(ys, &meta, conf)?;
        if profile {
            log::debug!("[Model Postprocess]: {:?}", t.elapsed());
        }
        Ok(ys)
    }

    fn model_type(&self) -> ModelType;

    /// 类别名称
    fn names(&self) -> &[String];

    fn profile(&self) -> bool {
        false
    }

    /// 打印模型信息
    fn summary(&self);
}

/// 把 RGB 图片写入输入张量 (偏移 `dx`, `dy`, 其余位置保持填充值)
///
/// `f(c, v)` 把 RGB 通道 `c` 的像素值 `v` 映射为 (张量通道, 数值)。
pub(crate) fn fill_tensor(
    tensor: &mut Array<f32, IxDyn>,
    image: &RgbImage,
    (dx, dy): (usize, usize),
    layout: InputLayout,
    f: impl Fn(usize, u8) -> (usize, f32),
) {
    for (x, y, rgb) in image.enumerate_pixels() {
        let (x, y) = (x as usize + dx, y as usize + dy);
        for (c, &v) in rgb.0.iter().enumerate() {
            let (ch, value) = f(c, v);
            tensor[layout.index(y, x, ch)] = value;
        }
    }
}

/// 读取类别名称文件 (每行一个), 未指定时使用 COCO 80 类
pub(crate) fn load_names(config: &DetectorConfig) -> Vec<String> {
    if let Some(path) = &config.class_names_path {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let names: Vec<String> = text
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(String::from)
                    .collect();
                if !names.is_empty() {
                    return names;
                }
                log::warn!("class names file {} is empty, using COCO classes", path.display());
            }
            Err(e) => log::warn!(
                "failed to read class names {}: {}, using COCO classes",
                path.display(),
                e
            ),
        }
    }
    COCO_CLASSES.iter().map(|s| s.to_string()).collect()
}

/// COCO class names (80 classes)
pub const COCO_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

// 各模型的具体实现
pub mod retinanet;
pub mod tiny_yolov3; // Tiny-YOLOv3 (委托给 YOLOv3)
pub mod yolov3;

// Re-exports
pub use retinanet::RetinaNet;
pub use tiny_yolov3::TinyYOLOv3;
pub use yolov3::{YOLOv3, YoloAnchors};
