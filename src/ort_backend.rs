// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// ONNX Runtime 推理引擎封装
// 负责: 会话创建、执行提供者选择、张量输入输出转换

use std::path::PathBuf;
use std::time::Instant;

use half::f16;
use ndarray::{Array, IxDyn};
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch,
    TensorRTExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;
use serde::{Deserialize, Serialize};

use crate::{DetectionError, Result};

/// 执行提供者 (Execution Provider)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrtEP {
    #[default]
    CPU,
    CUDA(i32),
    Trt(i32),
}

/// 输入张量布局
///
/// Keras 导出的 RetinaNet / YOLOv3 模型为 NHWC, PyTorch 导出的为 NCHW。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputLayout {
    #[default]
    Nhwc,
    Nchw,
}

impl InputLayout {
    /// 单张图片的输入张量形状
    pub fn shape(&self, height: usize, width: usize) -> [usize; 4] {
        match self {
            InputLayout::Nhwc => [1, height, width, 3],
            InputLayout::Nchw => [1, 3, height, width],
        }
    }

    /// 像素 (y, x, c) 在张量中的下标
    pub fn index(&self, y: usize, x: usize, c: usize) -> [usize; 4] {
        match self {
            InputLayout::Nhwc => [0, y, x, c],
            InputLayout::Nchw => [0, c, y, x],
        }
    }
}

impl std::str::FromStr for InputLayout {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nhwc" => Ok(InputLayout::Nhwc),
            "nchw" => Ok(InputLayout::Nchw),
            other => Err(format!("unknown input layout `{other}`, expected nhwc or nchw")),
        }
    }
}

/// 推理引擎配置
#[derive(Debug, Clone)]
pub struct OrtConfig {
    pub f: PathBuf,
    pub ep: OrtEP,
    pub trt_fp16: bool,
    pub num_threads: usize,
}

pub struct OrtBackend {
    session: Session,
    ep: OrtEP,
    input_name: String,
    output_names: Vec<String>,
}

impl OrtBackend {
    pub fn build(config: OrtConfig) -> Result<Self> {
        if !config.f.exists() {
            return Err(DetectionError::ModelNotFound(config.f));
        }

        // execution provider
        let ep: ExecutionProviderDispatch = match config.ep {
            OrtEP::Trt(device_id) => TensorRTExecutionProvider::default()
                .with_device_id(device_id)
                .with_fp16(config.trt_fp16)
                .build(),
            OrtEP::CUDA(device_id) => CUDAExecutionProvider::default()
                .with_device_id(device_id)
                .build(),
            OrtEP::CPU => CPUExecutionProvider::default().build(),
        };

        let mut builder = Session::builder()
            .map_err(|e| DetectionError::ModelLoad(format!("session builder: {e}")))?
            .with_execution_providers(vec![ep])
            .map_err(|e| DetectionError::ModelLoad(format!("execution provider: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| DetectionError::ModelLoad(format!("optimization level: {e}")))?;
        if config.num_threads > 0 {
            builder = builder
                .with_intra_threads(config.num_threads)
                .map_err(|e| DetectionError::ModelLoad(format!("intra threads: {e}")))?;
        }
        let session = builder.commit_from_file(&config.f).map_err(|e| {
            DetectionError::ModelLoad(format!("{}: {e}", config.f.display()))
        })?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| DetectionError::ModelLoad("model has no inputs".to_string()))?;
        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        if output_names.is_empty() {
            return Err(DetectionError::ModelLoad("model has no outputs".to_string()));
        }

        log::debug!(
            "onnx session ready: input `{}`, outputs {:?}, ep {:?}",
            input_name,
            output_names,
            config.ep
        );

        Ok(Self {
            session,
            ep: config.ep,
            input_name,
            output_names,
        })
    }

    /// 执行推理, 返回所有输出 (统一转换为 f32)
    pub fn run(&mut self, xs: Array<f32, IxDyn>, profile: bool) -> Result<Vec<Array<f32, IxDyn>>> {
        let t = Instant::now();
        let xs = xs.as_standard_layout();
        let tensor = TensorRef::from_array_view(&xs)
            .map_err(|e| DetectionError::Inference(format!("input tensor: {e}")))?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(|e| DetectionError::Inference(e.to_string()))?;
        if profile {
            log::debug!("[ORT Inference]: {:?}", t.elapsed());
        }

        let t = Instant::now();
        let mut ys = Vec::with_capacity(self.output_names.len());
        for name in &self.output_names {
            let value = outputs
                .get(name.as_str())
                .ok_or_else(|| DetectionError::Inference(format!("output `{name}` not found")))?;

            let (dims, data): (Vec<usize>, Vec<f32>) =
                if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
                    (shape.iter().map(|&d| d as usize).collect(), data.to_vec())
                } else if let Ok((shape, data)) = value.try_extract_tensor::<f16>() {
                    (
                        shape.iter().map(|&d| d as usize).collect(),
                        data.iter().map(|v| v.to_f32()).collect(),
                    )
                } else if let Ok((shape, data)) = value.try_extract_tensor::<i64>() {
                    (
                        shape.iter().map(|&d| d as usize).collect(),
                        data.iter().map(|&v| v as f32).collect(),
                    )
                } else if let Ok((shape, data)) = value.try_extract_tensor::<i32>() {
                    (
                        shape.iter().map(|&d| d as usize).collect(),
                        data.iter().map(|&v| v as f32).collect(),
                    )
                } else {
                    return Err(DetectionError::UnexpectedOutput(format!(
                        "output `{name}` is not a numeric tensor"
                    )));
                };

            let y = Array::from_shape_vec(IxDyn(&dims), data)
                .map_err(|e| DetectionError::UnexpectedOutput(format!("output `{name}`: {e}")))?;
            ys.push(y);
        }
        if profile {
            log::debug!("[ORT Extract]: {:?}", t.elapsed());
        }

        Ok(ys)
    }

    pub fn ep(&self) -> &OrtEP {
        &self.ep
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_index_matches_shape() {
        assert_eq!(InputLayout::Nhwc.shape(4, 6), [1, 4, 6, 3]);
        assert_eq!(InputLayout::Nchw.shape(4, 6), [1, 3, 4, 6]);
        assert_eq!(InputLayout::Nhwc.index(1, 2, 0), [0, 1, 2, 0]);
        assert_eq!(InputLayout::Nchw.index(1, 2, 0), [0, 0, 1, 2]);
    }

    #[test]
    fn layout_parses_case_insensitively() {
        assert_eq!("NCHW".parse::<InputLayout>(), Ok(InputLayout::Nchw));
        assert!("hwc".parse::<InputLayout>().is_err());
    }

    #[test]
    fn build_rejects_missing_model_file() {
        let config = OrtConfig {
            f: PathBuf::from("models/does-not-exist.onnx"),
            ep: OrtEP::CPU,
            trt_fp16: false,
            num_threads: 0,
        };
        assert!(matches!(
            OrtBackend::build(config),
            Err(DetectionError::ModelNotFound(_))
        ));
    }
}
