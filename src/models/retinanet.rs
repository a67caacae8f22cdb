// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// RetinaNet 完整模型实现 (keras-retinanet 导出的 ONNX)
// 包含: caffe 预处理、推理、框还原与 NMS

use image::{imageops::FilterType, DynamicImage};
use ndarray::{s, Array, IxDyn};

use super::{fill_tensor, load_names, DetectionSpeed, Model, ModelType, Preprocessed};
use crate::{
    non_max_suppression_per_class, Bbox, DetectionError, DetectorConfig, InputLayout, OrtBackend,
    Result,
};

/// ImageNet BGR 均值 (caffe 模式)
const CAFFE_MEAN_BGR: [f32; 3] = [103.939, 116.779, 123.68];

/// RetinaNet 模型结构
pub struct RetinaNet {
    engine: OrtBackend,
    min_side: u32,
    max_side: u32,
    layout: InputLayout,
    iou: f32,
    max_detections: usize,
    names: Vec<String>,
    profile: bool,
}

impl RetinaNet {
    pub fn new(engine: OrtBackend, config: &DetectorConfig, speed: DetectionSpeed) -> Self {
        let (min_side, max_side) = speed.retinanet_sides();
        Self {
            engine,
            min_side,
            max_side,
            layout: config.input_layout.unwrap_or_default(),
            iou: config
                .retinanet_iou
                .unwrap_or_else(|| ModelType::RetinaNet.default_iou_threshold()),
            max_detections: config.max_detections,
            names: load_names(config),
            profile: config.profile,
        }
    }

    /// 计算缩放比例: 短边对齐 `min_side`, 长边不超过 `max_side`
    pub fn compute_scale(w0: u32, h0: u32, min_side: u32, max_side: u32) -> f32 {
        let smallest = w0.min(h0) as f32;
        let largest = w0.max(h0) as f32;
        let mut scale = min_side as f32 / smallest;
        if largest * scale > max_side as f32 {
            scale = max_side as f32 / largest;
        }
        scale
    }

    /// 解码模型输出 (框已在网络输入坐标系中)
    ///
    /// 支持两种导出形式:
    /// - `boxes [1,N,4]` + `scores [1,N]` + `labels [1,N]` (模型内置过滤, 以 -1 填充)
    /// - `boxes [1,N,4]` + `classification [1,N,C]` (未过滤, 在此做 NMS)
    pub fn decode(
        xs: &[Array<f32, IxDyn>],
        scale: f32,
        (w0, h0): (f32, f32),
        conf: f32,
        iou: f32,
        max_detections: usize,
    ) -> Result<Vec<Bbox>> {
        let shapes: Vec<&[usize]> = xs.iter().map(|y| y.shape()).collect();
        let boxes_idx = xs
            .iter()
            .position(|y| y.ndim() == 3 && y.shape()[2] == 4)
            .ok_or_else(|| {
                DetectionError::UnexpectedOutput(format!(
                    "RetinaNet: no [1,N,4] boxes output among {shapes:?}"
                ))
            })?;
        let boxes = &xs[boxes_idx];
        let rest: Vec<&Array<f32, IxDyn>> = xs
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != boxes_idx)
            .map(|(_, y)| y)
            .collect();

        let to_bbox = |i: usize, id: usize, score: f32| {
            Bbox::from_xyxy(
                boxes[[0, i, 0]] / scale,
                boxes[[0, i, 1]] / scale,
                boxes[[0, i, 2]] / scale,
                boxes[[0, i, 3]] / scale,
                id,
                score,
            )
            .clip(w0, h0)
        };

        let n = boxes.shape()[1];
        let mut ys = Vec::new();
        match rest.as_slice() {
            [scores, labels] if scores.ndim() == 2 && labels.ndim() == 2 => {
                let n = n.min(scores.shape()[1]).min(labels.shape()[1]);
                for i in 0..n {
                    let score = scores[[0, i]];
                    let label = labels[[0, i]];
                    if label < 0. || score < conf {
                        continue;
                    }
                    ys.push(to_bbox(i, label as usize, score));
                }
                ys.sort_by(|a, b| b.confidence().total_cmp(&a.confidence()));
                ys.truncate(max_detections);
            }
            [classification] if classification.ndim() == 3 => {
                let n = n.min(classification.shape()[1]);
                for i in 0..n {
                    let row = classification.slice(s![0, i, ..]);
                    let Some((id, &score)) = row
                        .iter()
                        .enumerate()
                        .reduce(|max, x| if x.1 > max.1 { x } else { max })
                    else {
                        continue;
                    };
                    if score < conf {
                        continue;
                    }
                    ys.push(to_bbox(i, id, score));
                }
                ys = non_max_suppression_per_class(ys, iou, max_detections);
                ys.truncate(max_detections);
            }
            _ => {
                return Err(DetectionError::UnexpectedOutput(format!(
                    "RetinaNet: expected boxes + scores (+ labels), got {shapes:?}"
                )))
            }
        }

        Ok(ys)
    }
}

impl Model for RetinaNet {
    fn preprocess(&self, image: &DynamicImage) -> Result<Preprocessed> {
        let (w0, h0) = (image.width(), image.height());
        if w0 == 0 || h0 == 0 {
            return Err(DetectionError::InvalidInput(
                "image has zero width or height".to_string(),
            ));
        }
        let scale = Self::compute_scale(w0, h0, self.min_side, self.max_side);
        let w = ((w0 as f32 * scale).round() as u32).max(1);
        let h = ((h0 as f32 * scale).round() as u32).max(1);
        let img = image.resize_exact(w, h, FilterType::Triangle).to_rgb8();

        let mut tensor = Array::zeros(IxDyn(&self.layout.shape(h as usize, w as usize)));
        // RGB → BGR, 减均值
        fill_tensor(&mut tensor, &img, (0, 0), self.layout, |c, v| {
            let ch = 2 - c;
            (ch, v as f32 - CAFFE_MEAN_BGR[ch])
        });

        Ok(Preprocessed {
            tensor,
            scale,
            width0: w0,
            height0: h0,
        })
    }

    fn run(&mut self, xs: Array<f32, IxDyn>) -> Result<Vec<Array<f32, IxDyn>>> {
        self.engine.run(xs, self.profile)
    }

    fn postprocess(
        &self,
        xs: Vec<Array<f32, IxDyn>>,
        meta: &Preprocessed,
        conf: f32,
    ) -> Result<Vec<Bbox>> {
        Self::decode(
            &xs,
            meta.scale,
            (meta.width0 as f32, meta.height0 as f32),
            conf,
            self.iou,
            self.max_detections,
        )
    }

    fn model_type(&self) -> ModelType {
        ModelType::RetinaNet
    }

    fn names(&self) -> &[String] {
        &self.names
    }

    fn profile(&self) -> bool {
        self.profile
    }

    fn summary(&self) {
        log::info!(
            "Summary: RetinaNet, EP: {:?}, sides: {}/{}, layout: {:?}, nc: {}, iou: {}, max det: {}",
            self.engine.ep(),
            self.min_side,
            self.max_side,
            self.layout,
            self.names.len(),
            self.iou,
            self.max_detections,
        );
    }
}
