// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// Tiny-YOLOv3 模型实现 (两个检测头)
//
// 注: Tiny-YOLOv3 与 YOLOv3 的输入输出格式一致,
// 差异仅在检测头数量和锚框,
// 因此直接复用YOLOv3的实现

use image::DynamicImage;
use ndarray::{Array, IxDyn};

use super::{DetectionSpeed, Model, ModelType, Preprocessed, YOLOv3, YoloAnchors};
use crate::{Bbox, DetectorConfig, OrtBackend, Result};

/// Tiny-YOLOv3 模型结构 (内部委托给YOLOv3)
pub struct TinyYOLOv3 {
    inner: YOLOv3,
}

impl TinyYOLOv3 {
    pub fn new(engine: OrtBackend, config: &DetectorConfig, speed: DetectionSpeed) -> Self {
        let inner = YOLOv3::with_anchors(
            engine,
            config,
            speed.tiny_yolov3_size(),
            YoloAnchors::tiny_yolov3(),
        );
        Self { inner }
    }
}

impl Model for TinyYOLOv3 {
    /// 预处理: 委托给YOLOv3
    fn preprocess(&self, image: &DynamicImage) -> Result<Preprocessed> {
        self.inner.preprocess(image)
    }

    /// 推理: 委托给YOLOv3
    fn run(&mut self, xs: Array<f32, IxDyn>) -> Result<Vec<Array<f32, IxDyn>>> {
        self.inner.run(xs)
    }

    /// 后处理: 委托给YOLOv3
    fn postprocess(
        &self,
        xs: Vec<Array<f32, IxDyn>>,
        meta: &Preprocessed,
        conf: f32,
    ) -> Result<Vec<Bbox>> {
        self.inner.postprocess(xs, meta, conf)
    }

    fn model_type(&self) -> ModelType {
        ModelType::TinyYOLOv3
    }

    fn names(&self) -> &[String] {
        self.inner.names()
    }

    fn profile(&self) -> bool {
        self.inner.profile()
    }

    fn summary(&self) {
        log::info!(
            "Summary: TinyYOLOv3 (YOLOv3 backend), EP: {:?}, size: {}, heads: {}",
            self.inner.engine().ep(),
            self.inner.size(),
            self.inner.anchors().masks.len(),
        );
        self.inner.summary();
    }
}
