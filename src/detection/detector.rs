//! 目标检测门面 (ObjectDetection)
//! 职责: 设置模型类型/路径 → 加载模型 → 检测 → 标注 → 保存/裁剪

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use image::{DynamicImage, RgbImage};

use super::annotate::{color_for, Annotator};
use super::array::{array_to_image, image_to_array};
use super::extract::{extract_arrays, objects_dir, save_objects};
use super::types::*;
use crate::models::{DetectionSpeed, Model, ModelType};
use crate::{Bbox, DetectionError, DetectorConfig, Result};

/// 已加载的模型与标注器
struct Loaded {
    model: Box<dyn Model>,
    annotator: Annotator,
}

/// 目标检测器
///
/// ```no_run
/// use objdetect_rs::{DetectionRequest, ObjectDetection};
///
/// let mut detector = ObjectDetection::new();
/// detector.set_model_type_as_yolov3();
/// detector.set_model_path("models/yolo.onnx");
/// detector.load_model()?;
///
/// let request = DetectionRequest::to_file(std::path::PathBuf::from("image.jpg"), "image-new.jpg");
/// for obj in detector.detect_objects_from_image(&request)?.detections {
///     println!("{} : {}", obj.name, obj.percentage_probability);
/// }
/// # Ok::<(), objdetect_rs::DetectionError>(())
/// ```
pub struct ObjectDetection {
    config: DetectorConfig,
    model_type: Option<ModelType>,
    model_path: Option<PathBuf>,
    speed: DetectionSpeed,
    loaded: Option<Loaded>,
}

impl Default for ObjectDetection {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectDetection {
    pub fn new() -> Self {
        Self::with_config(DetectorConfig::default())
    }

    pub fn with_config(config: DetectorConfig) -> Self {
        Self {
            config,
            model_type: None,
            model_path: None,
            speed: DetectionSpeed::default(),
            loaded: None,
        }
    }

    // ========== 设置 ==========

    pub fn set_model_type_as_retinanet(&mut self) {
        self.set_model_type(ModelType::RetinaNet);
    }

    pub fn set_model_type_as_yolov3(&mut self) {
        self.set_model_type(ModelType::YOLOv3);
    }

    pub fn set_model_type_as_tiny_yolov3(&mut self) {
        self.set_model_type(ModelType::TinyYOLOv3);
    }

    /// 设置模型类型, 类型改变时需要重新加载模型
    pub fn set_model_type(&mut self, model_type: ModelType) {
        if self.model_type != Some(model_type) {
            self.unload();
            self.model_type = Some(model_type);
        }
    }

    /// 设置模型文件路径, 路径改变时需要重新加载模型
    pub fn set_model_path(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if self.model_path.as_ref() != Some(&path) {
            self.unload();
            self.model_path = Some(path);
        }
    }

    /// 设置检测速度, 速度改变时需要重新加载模型
    pub fn set_detection_speed(&mut self, speed: DetectionSpeed) {
        if self.speed != speed {
            self.unload();
            self.speed = speed;
        }
    }

    fn unload(&mut self) {
        if self.loaded.take().is_some() {
            log::info!("model unloaded, call load_model() again");
        }
    }

    // ========== 加载 ==========

    /// 加载模型 (已加载时直接返回)
    pub fn load_model(&mut self) -> Result<()> {
        if self.loaded.is_some() {
            return Ok(());
        }
        let model_type = self.model_type.ok_or(DetectionError::ModelTypeNotSet)?;
        let path = self
            .model_path
            .as_deref()
            .ok_or(DetectionError::ModelPathNotSet)?;
        if !path.is_file() {
            return Err(DetectionError::ModelNotFound(path.to_path_buf()));
        }

        let t = Instant::now();
        log::info!(
            "loading {} model from {} (speed: {:?})",
            model_type,
            path.display(),
            self.speed
        );
        let annotator = Annotator::from_config(&self.config)?;
        let model = model_type.build(path, &self.config, self.speed)?;
        model.summary();
        log::info!("model loaded in {:?}", t.elapsed());

        self.attach(model, annotator);
        Ok(())
    }

    fn attach(&mut self, model: Box<dyn Model>, annotator: Annotator) {
        if !annotator.has_font() {
            log::warn!("no font_path configured, object names and probabilities will not be drawn");
        }
        self.loaded = Some(Loaded { model, annotator });
    }

    /// 使用已构建的模型 (不经过 ONNX 会话)
    #[cfg(test)]
    pub(crate) fn with_model(
        config: DetectorConfig,
        model: Box<dyn Model>,
        annotator: Annotator,
    ) -> Self {
        let mut detector = Self::with_config(config);
        detector.model_type = Some(model.model_type());
        detector.attach(model, annotator);
        detector
    }

    // ========== 查询 ==========

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn model_type(&self) -> Option<ModelType> {
        self.model_type
    }

    pub fn model_path(&self) -> Option<&Path> {
        self.model_path.as_deref()
    }

    pub fn detection_speed(&self) -> DetectionSpeed {
        self.speed
    }

    /// 标注图片时是否绘制标签文字 (需要配置字体)
    pub fn draws_labels(&self) -> bool {
        self.loaded
            .as_ref()
            .is_some_and(|loaded| loaded.annotator.has_font())
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// 模型类别名称 (未加载时为空)
    pub fn class_names(&self) -> &[String] {
        match &self.loaded {
            Some(loaded) => loaded.model.names(),
            None => &[],
        }
    }

    /// 空的自定义类别集合, 用 `with`/`enable` 选择类别
    pub fn custom_objects(&self) -> CustomObjects {
        CustomObjects::new()
    }

    // ========== 检测 ==========

    /// 只检测指定类别
    pub fn detect_custom_objects_from_image(
        &mut self,
        custom_objects: CustomObjects,
        request: &DetectionRequest,
    ) -> Result<DetectionOutput> {
        let request = request.clone().custom_objects(custom_objects);
        self.detect_objects_from_image(&request)
    }

    /// 检测图片中的目标
    pub fn detect_objects_from_image(&mut self, request: &DetectionRequest) -> Result<DetectionOutput> {
        let Loaded { model, annotator } = self.loaded.as_mut().ok_or(DetectionError::ModelNotLoaded)?;

        let min = request.minimum_percentage_probability;
        if !(0.0..=100.0).contains(&min) {
            return Err(DetectionError::InvalidInput(format!(
                "minimum_percentage_probability must be within 0..=100, got {min}"
            )));
        }
        if let Some(custom) = &request.custom_objects {
            custom.validate(model.names())?;
        }

        let image = DynamicImage::ImageRgb8(read_image(&request.input)?);
        let conf = min / 100.0;
        let bboxes = model.forward(&image, conf)?;
        let source = image.into_rgb8();

        let (w, h) = source.dimensions();
        let style = model.model_type().box_style();
        let names = model.names();
        let mut detections: Vec<(DetectedObject, image::Rgb<u8>)> = Vec::with_capacity(bboxes.len());
        for bbox in bboxes {
            let percentage_probability = bbox.confidence() * 100.0;
            if percentage_probability < min {
                continue;
            }
            let name = names
                .get(bbox.id())
                .cloned()
                .unwrap_or_else(|| format!("class_{}", bbox.id()));
            if let Some(custom) = &request.custom_objects {
                if !custom.contains(&name) {
                    continue;
                }
            }
            let Some(xyxy) = box_to_pixels(&bbox, w, h) else {
                log::debug!("drop empty box for {name}");
                continue;
            };
            detections.push((
                DetectedObject {
                    name,
                    percentage_probability,
                    box_points: BoxPoints::new(style, xyxy),
                },
                color_for(bbox.id()),
            ));
        }

        let mut annotated = source.clone();
        annotator.draw(
            &mut annotated,
            &detections,
            request.display_object_name,
            request.display_percentage_probability,
        );
        let detections: Vec<DetectedObject> = detections.into_iter().map(|(d, _)| d).collect();

        let (annotated, extracted) = match &request.output {
            ImageOutput::File(path) => {
                save_image(&annotated, path)?;
                let extracted = if request.extract_detected_objects {
                    let paths = save_objects(&source, &detections, &objects_dir(path))?;
                    Some(ExtractedObjects::Paths(paths))
                } else {
                    None
                };
                (AnnotatedImage::Saved(path.clone()), extracted)
            }
            ImageOutput::Array => {
                let extracted = request
                    .extract_detected_objects
                    .then(|| ExtractedObjects::Arrays(extract_arrays(&source, &detections)));
                (AnnotatedImage::Array(image_to_array(&annotated)), extracted)
            }
        };

        log::info!("{} objects detected", detections.len());
        Ok(DetectionOutput {
            detections,
            annotated,
            extracted,
        })
    }
}

/// 读取输入图片
fn read_image(input: &ImageInput) -> Result<RgbImage> {
    match input {
        ImageInput::File(path) => Ok(image::open(path)
            .map_err(|e| DetectionError::image(path, e))?
            .to_rgb8()),
        ImageInput::Array(array) => array_to_image(array),
    }
}

/// 保存标注图片 (自动创建父目录)
fn save_image(image: &RgbImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| DetectionError::io(parent, e))?;
    }
    image.save(path).map_err(|e| DetectionError::image(path, e))
}

/// 框坐标取整到像素并裁剪到图像内; 空框返回 None
fn box_to_pixels(bbox: &Bbox, w: u32, h: u32) -> Option<[i32; 4]> {
    let b = bbox.clip(w as f32, h as f32);
    let round = |v: f32| (v + 0.5).floor() as i32;
    let xyxy = [round(b.xmin()), round(b.ymin()), round(b.xmax()), round(b.ymax())];
    (xyxy[2] > xyxy[0] && xyxy[3] > xyxy[1]).then_some(xyxy)
}
