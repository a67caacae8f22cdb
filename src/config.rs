//! 检测配置 - 通过JSON文件或命令行调整参数

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::{DetectionSpeed, InputLayout, ModelType, OrtEP};

/// 执行提供者名称 (JSON 中使用)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Cpu,
    Cuda,
    Trt,
}

/// 检测器参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    // === 推理引擎 ===
    pub provider: Provider,      // cpu / cuda / trt
    pub device_id: i32,          // GPU 设备号
    pub trt_fp16: bool,          // TensorRT 半精度
    pub num_threads: usize,      // intra-op 线程数, 0 = ORT 默认
    pub input_layout: Option<InputLayout>, // 张量布局, 默认 NHWC

    // === 后处理 ===
    pub retinanet_iou: Option<f32>, // RetinaNet NMS IOU阈值
    pub yolo_iou: Option<f32>,      // YOLO NMS IOU阈值
    pub max_detections: usize,      // RetinaNet 每张图最多检测数
    pub max_boxes_per_class: usize, // YOLO 每类最多检测数
    pub class_names_path: Option<PathBuf>,

    // === 标注 ===
    pub font_path: Option<PathBuf>, // TrueType 字体, 未设置时只画框
    pub label_scale: f32,           // 标签字号(像素)
    pub line_thickness: u32,        // 框线宽

    pub profile: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Cpu,
            device_id: 0,
            trt_fp16: false,
            num_threads: 0,
            input_layout: None,

            retinanet_iou: None,
            yolo_iou: None,
            max_detections: 300,
            max_boxes_per_class: 20,
            class_names_path: None,

            font_path: None,
            label_scale: 16.0,
            line_thickness: 2,

            profile: false,
        }
    }
}

impl DetectorConfig {
    /// 从JSON文件加载配置, 失败时使用默认值
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(config) => {
                log::info!("config loaded from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("{:#}, using default config", e);
                Self::default()
            }
        }
    }

    /// 从JSON文件加载配置
    pub fn try_load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(path, json).with_context(|| format!("failed to write config {}", path.display()))?;
        log::info!("config saved to {}", path.display());
        Ok(())
    }

    /// execution provider
    pub fn ep(&self) -> OrtEP {
        match self.provider {
            Provider::Trt => OrtEP::Trt(self.device_id),
            Provider::Cuda => OrtEP::CUDA(self.device_id),
            Provider::Cpu => OrtEP::CPU,
        }
    }
}

/// 命令行参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Detect objects in an image with RetinaNet / YOLOv3 / TinyYOLOv3", long_about = None)]
pub struct Args {
    /// 模型类型: retinanet / yolov3 / tiny-yolov3 (默认从模型文件名推断)
    #[arg(long)]
    pub model_type: Option<ModelType>,

    /// ONNX模型路径
    #[arg(short, long)]
    pub model: PathBuf,

    /// 输入图片路径
    #[arg(short, long)]
    pub source: PathBuf,

    /// 标注图片输出路径 (默认 `<source>-detected.jpg`)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// 最低置信度 (百分比)
    #[arg(long, default_value_t = 50.0)]
    pub min_prob: f32,

    /// 检测速度: normal / fast / faster / fastest / flash
    #[arg(long, default_value = "normal")]
    pub speed: DetectionSpeed,

    /// 把每个检测目标裁剪到 `<output>-objects/`
    #[arg(long)]
    pub extract: bool,

    /// 只保留这些类别 (逗号分隔, 如 person,car)
    #[arg(long, value_delimiter = ',')]
    pub objects: Vec<String>,

    /// 标签中不显示置信度
    #[arg(long)]
    pub hide_prob: bool,

    /// 标签中不显示类别名
    #[arg(long)]
    pub hide_name: bool,

    /// JSON 配置文件
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 标签字体 (TrueType)
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// 使用CUDA
    #[arg(long)]
    pub cuda: bool,

    /// 使用TensorRT
    #[arg(long)]
    pub trt: bool,

    /// 设备ID
    #[arg(long, default_value_t = 0)]
    pub device_id: i32,

    /// TensorRT 半精度
    #[arg(long)]
    pub fp16: bool,

    /// intra-op 线程数
    #[arg(long)]
    pub threads: Option<usize>,

    /// 启用性能分析
    #[arg(long)]
    pub profile: bool,

    /// 以JSON输出检测结果
    #[arg(long)]
    pub json: bool,
}

impl Args {
    /// 命令行参数覆盖配置文件
    pub fn apply(&self, config: &mut DetectorConfig) {
        if self.trt {
            config.provider = Provider::Trt;
        } else if self.cuda {
            config.provider = Provider::Cuda;
        }
        if self.trt || self.cuda {
            config.device_id = self.device_id;
        }
        if self.fp16 {
            config.trt_fp16 = true;
        }
        if let Some(threads) = self.threads {
            config.num_threads = threads;
        }
        if let Some(font) = &self.font {
            config.font_path = Some(font.clone());
        }
        if self.profile {
            config.profile = true;
        }
    }

    /// 标注图片输出路径
    pub fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            let stem = self
                .source
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string());
            self.source.with_file_name(format!("{stem}-detected.jpg"))
        })
    }
}
