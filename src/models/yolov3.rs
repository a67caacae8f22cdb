// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv3 完整模型实现
// 包含: letterbox 预处理、推理、锚框解码、分类别 NMS

use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array, IxDyn};

use super::{fill_tensor, load_names, DetectionSpeed, Model, ModelType, Preprocessed};
use crate::{
    non_max_suppression_per_class, Bbox, DetectionError, DetectorConfig, InputLayout, OrtBackend,
    Result,
};

/// letterbox 灰色填充值
const LETTERBOX_FILL: f32 = 128.0 / 255.0;

/// 锚框配置
///
/// `masks[i]` 为第 i 个检测头 (按网格从粗到细排序) 使用的锚框下标。
#[derive(Debug, Clone, PartialEq)]
pub struct YoloAnchors {
    pub anchors: Vec<(f32, f32)>,
    pub masks: Vec<Vec<usize>>,
}

impl YoloAnchors {
    /// YOLOv3 COCO 锚框 (三个检测头)
    pub fn yolov3() -> Self {
        Self {
            anchors: vec![
                (10., 13.),
                (16., 30.),
                (33., 23.),
                (30., 61.),
                (62., 45.),
                (59., 119.),
                (116., 90.),
                (156., 198.),
                (373., 326.),
            ],
            masks: vec![vec![6, 7, 8], vec![3, 4, 5], vec![0, 1, 2]],
        }
    }

    /// Tiny-YOLOv3 COCO 锚框 (两个检测头)
    pub fn tiny_yolov3() -> Self {
        Self {
            anchors: vec![
                (10., 14.),
                (23., 27.),
                (37., 58.),
                (81., 82.),
                (135., 169.),
                (344., 319.),
            ],
            masks: vec![vec![3, 4, 5], vec![1, 2, 3]],
        }
    }
}

/// letterbox 几何参数: (缩放比例, 新宽, 新高, x 偏移, y 偏移)
pub fn letterbox_geometry(w0: u32, h0: u32, size: u32) -> (f32, u32, u32, u32, u32) {
    let scale = (size as f32 / w0 as f32).min(size as f32 / h0 as f32);
    let nw = ((w0 as f32 * scale) as u32).clamp(1, size);
    let nh = ((h0 as f32 * scale) as u32).clamp(1, size);
    (scale, nw, nh, (size - nw) / 2, (size - nh) / 2)
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1. / (1. + (-x).exp())
}

/// YOLOv3 模型结构
pub struct YOLOv3 {
    engine: OrtBackend,
    anchors: YoloAnchors,
    size: u32,
    layout: InputLayout,
    iou: f32,
    max_boxes_per_class: usize,
    names: Vec<String>,
    profile: bool,
}

impl YOLOv3 {
    pub fn new(engine: OrtBackend, config: &DetectorConfig, speed: DetectionSpeed) -> Self {
        Self::with_anchors(engine, config, speed.yolov3_size(), YoloAnchors::yolov3())
    }

    pub fn with_anchors(
        engine: OrtBackend,
        config: &DetectorConfig,
        size: u32,
        anchors: YoloAnchors,
    ) -> Self {
        Self {
            engine,
            anchors,
            size,
            layout: config.input_layout.unwrap_or_default(),
            iou: config
                .yolo_iou
                .unwrap_or_else(|| ModelType::YOLOv3.default_iou_threshold()),
            max_boxes_per_class: config.max_boxes_per_class,
            names: load_names(config),
            profile: config.profile,
        }
    }

    /// 解码 YOLO 检测头输出
    ///
    /// 每个检测头形状为 `[1,H,W,A·(5+C)]` (NHWC) 或 `[1,A·(5+C),H,W]` (NCHW),
    /// 按网格大小从粗到细与 `anchors.masks` 对应。
    #[allow(clippy::too_many_arguments)]
    pub fn decode(
        xs: &[Array<f32, IxDyn>],
        anchors: &YoloAnchors,
        layout: InputLayout,
        size: u32,
        (w0, h0): (u32, u32),
        conf: f32,
        iou: f32,
        max_boxes_per_class: usize,
    ) -> Result<Vec<Bbox>> {
        let shapes: Vec<&[usize]> = xs.iter().map(|y| y.shape()).collect();
        if xs.len() != anchors.masks.len() || xs.iter().any(|y| y.ndim() != 4) {
            return Err(DetectionError::UnexpectedOutput(format!(
                "YOLO: expected {} heads of rank 4, got {shapes:?}",
                anchors.masks.len()
            )));
        }

        // (grid_h, grid_w, channels) per head
        let dims = |y: &Array<f32, IxDyn>| {
            let s = y.shape();
            match layout {
                InputLayout::Nhwc => (s[1], s[2], s[3]),
                InputLayout::Nchw => (s[2], s[3], s[1]),
            }
        };
        let mut heads: Vec<&Array<f32, IxDyn>> = xs.iter().collect();
        heads.sort_by_key(|y| {
            let (gh, gw, _) = dims(*y);
            gh * gw
        });

        let (scale, _, _, dx, dy) = letterbox_geometry(w0, h0, size);
        let (w0, h0) = (w0 as f32, h0 as f32);
        let size_f = size as f32;

        let mut ys = Vec::new();
        for (head, mask) in heads.into_iter().zip(&anchors.masks) {
            let (gh, gw, channels) = dims(head);
            let na = mask.len();
            if na == 0 || channels % na != 0 || channels / na <= 5 {
                return Err(DetectionError::UnexpectedOutput(format!(
                    "YOLO: {channels} channels cannot hold {na} anchors, got {shapes:?}"
                )));
            }
            let step = channels / na;
            let nc = step - 5;
            let at = |gy: usize, gx: usize, ch: usize| match layout {
                InputLayout::Nhwc => head[[0, gy, gx, ch]],
                InputLayout::Nchw => head[[0, ch, gy, gx]],
            };

            for gy in 0..gh {
                for gx in 0..gw {
                    for (a, &anchor_idx) in mask.iter().enumerate() {
                        let base = a * step;
                        let objectness = sigmoid(at(gy, gx, base + 4));
                        if objectness < conf {
                            continue;
                        }
                        let (aw, ah) = anchors.anchors.get(anchor_idx).copied().ok_or_else(|| {
                            DetectionError::UnexpectedOutput(format!(
                                "YOLO: anchor index {anchor_idx} out of range"
                            ))
                        })?;

                        // 网络输入坐标系 (像素)
                        let cx = (sigmoid(at(gy, gx, base)) + gx as f32) / gw as f32 * size_f;
                        let cy = (sigmoid(at(gy, gx, base + 1)) + gy as f32) / gh as f32 * size_f;
                        let w = at(gy, gx, base + 2).exp() * aw;
                        let h = at(gy, gx, base + 3).exp() * ah;

                        // 还原 letterbox
                        let x1 = (cx - w / 2. - dx as f32) / scale;
                        let y1 = (cy - h / 2. - dy as f32) / scale;
                        let x2 = (cx + w / 2. - dx as f32) / scale;
                        let y2 = (cy + h / 2. - dy as f32) / scale;

                        for c in 0..nc {
                            let score = objectness * sigmoid(at(gy, gx, base + 5 + c));
                            if score >= conf {
                                ys.push(Bbox::from_xyxy(x1, y1, x2, y2, c, score).clip(w0, h0));
                            }
                        }
                    }
                }
            }
        }

        Ok(non_max_suppression_per_class(ys, iou, max_boxes_per_class))
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn anchors(&self) -> &YoloAnchors {
        &self.anchors
    }

    pub fn engine(&self) -> &OrtBackend {
        &self.engine
    }
}

impl Model for YOLOv3 {
    fn preprocess(&self, image: &DynamicImage) -> Result<Preprocessed> {
        let (w0, h0) = (image.width(), image.height());
        if w0 == 0 || h0 == 0 {
            return Err(DetectionError::InvalidInput(
                "image has zero width or height".to_string(),
            ));
        }
        let (scale, nw, nh, dx, dy) = letterbox_geometry(w0, h0, self.size);
        let img = image.resize_exact(nw, nh, FilterType::CatmullRom).to_rgb8();

        let size = self.size as usize;
        let mut tensor = Array::from_elem(IxDyn(&self.layout.shape(size, size)), LETTERBOX_FILL);
        fill_tensor(
            &mut tensor,
            &img,
            (dx as usize, dy as usize),
            self.layout,
            |c, v| (c, v as f32 / 255.0),
        );

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
            &self.anchors,
            self.layout,
            self.size,
            (meta.width0, meta.height0),
            conf,
            self.iou,
            self.max_boxes_per_class,
        )
    }

    fn model_type(&self) -> ModelType {
        ModelType::YOLOv3
    }

    fn names(&self) -> &[String] {
        &self.names
    }

    fn profile(&self) -> bool {
        self.profile
    }

    fn summary(&self) {
        log::info!(
            "Summary: YOLOv3, EP: {:?}, size: {}, heads: {}, layout: {:?}, nc: {}, iou: {}",
            self.engine.ep(),
            self.size,
            self.anchors.masks.len(),
            self.layout,
            self.names.len(),
            self.iou,
        );
    }
}
