/// 目标检测数据结构定义
/// Data structures for the object detection facade
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array3};
use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};

use crate::models::BoxStyle;
use crate::{DetectionError, Result};

// ========== 检测结果 ==========

/// 检测框 (x1, y1, x2, y2), 原图像素坐标
///
/// RetinaNet 返回定长数组, YOLO 系列返回有序元组。
#[derive(Debug, Clone, PartialEq)]
pub enum BoxPoints {
    Array(Array1<i32>),
    Tuple((i32, i32, i32, i32)),
}

impl BoxPoints {
    pub fn new(style: BoxStyle, [x1, y1, x2, y2]: [i32; 4]) -> Self {
        match style {
            BoxStyle::Array => BoxPoints::Array(Array1::from_vec(vec![x1, y1, x2, y2])),
            BoxStyle::Tuple => BoxPoints::Tuple((x1, y1, x2, y2)),
        }
    }

    /// 坐标 `[x1, y1, x2, y2]`, 数组不足 4 个元素时缺失的坐标为 0
    pub fn as_xyxy(&self) -> [i32; 4] {
        match self {
            BoxPoints::Array(a) => {
                let at = |i: usize| a.get(i).copied().unwrap_or(0);
                [at(0), at(1), at(2), at(3)]
            }
            BoxPoints::Tuple((x1, y1, x2, y2)) => [*x1, *y1, *x2, *y2],
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, BoxPoints::Array(_))
    }

    pub fn is_tuple(&self) -> bool {
        matches!(self, BoxPoints::Tuple(_))
    }

    pub fn width(&self) -> i32 {
        let [x1, _, x2, _] = self.as_xyxy();
        x2 - x1
    }

    pub fn height(&self) -> i32 {
        let [_, y1, _, y2] = self.as_xyxy();
        y2 - y1
    }
}

impl Serialize for BoxPoints {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(4))?;
        for v in self.as_xyxy() {
            seq.serialize_element(&v)?;
        }
        seq.end()
    }
}

/// 单个检测结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedObject {
    /// 类别名称
    pub name: String,
    /// 置信度 (百分比)
    pub percentage_probability: f32,
    pub box_points: BoxPoints,
}

// ========== 输入输出 ==========

/// 输入图片: 文件路径或内存数组 (HWC, RGB, u8)
#[derive(Debug, Clone)]
pub enum ImageInput {
    File(PathBuf),
    Array(Array3<u8>),
}

impl ImageInput {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        ImageInput::File(path.into())
    }

    pub fn array(array: Array3<u8>) -> Self {
        ImageInput::Array(array)
    }
}

impl From<&Path> for ImageInput {
    fn from(path: &Path) -> Self {
        ImageInput::File(path.to_path_buf())
    }
}

impl From<PathBuf> for ImageInput {
    fn from(path: PathBuf) -> Self {
        ImageInput::File(path)
    }
}

impl From<Array3<u8>> for ImageInput {
    fn from(array: Array3<u8>) -> Self {
        ImageInput::Array(array)
    }
}

/// 标注图片的输出方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutput {
    /// 保存到文件
    File(PathBuf),
    /// 以数组返回
    Array,
}

/// 标注后的图片
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotatedImage {
    Saved(PathBuf),
    Array(Array3<u8>),
}

impl AnnotatedImage {
    pub fn path(&self) -> Option<&Path> {
        match self {
            AnnotatedImage::Saved(p) => Some(p),
            AnnotatedImage::Array(_) => None,
        }
    }

    pub fn array(&self) -> Option<&Array3<u8>> {
        match self {
            AnnotatedImage::Array(a) => Some(a),
            AnnotatedImage::Saved(_) => None,
        }
    }
}

/// 裁剪出的检测目标, 与输出方式一致
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedObjects {
    Paths(Vec<PathBuf>),
    Arrays(Vec<Array3<u8>>),
}

impl ExtractedObjects {
    pub fn len(&self) -> usize {
        match self {
            ExtractedObjects::Paths(v) => v.len(),
            ExtractedObjects::Arrays(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ========== 类别过滤 ==========

/// 自定义检测类别
///
/// 只保留集合中的类别; 空集合表示不保留任何类别。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomObjects {
    names: BTreeSet<String>,
}

impl CustomObjects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>) -> Self {
        self.enable(name);
        self
    }

    pub fn enable(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// 检查所有类别名都是模型已知的
    pub fn validate(&self, known: &[String]) -> Result<()> {
        match self.names.iter().find(|n| !known.contains(n)) {
            Some(unknown) => Err(DetectionError::UnknownClass(unknown.clone())),
            None => Ok(()),
        }
    }
}

impl<S: Into<String>> FromIterator<S> for CustomObjects {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

// ========== 请求与结果 ==========

/// 一次检测请求
#[derive(Debug, Clone)]
pub struct DetectionRequest {
    pub input: ImageInput,
    pub output: ImageOutput,
    /// 最低置信度 (百分比, 0~100)
    pub minimum_percentage_probability: f32,
    pub extract_detected_objects: bool,
    pub display_percentage_probability: bool,
    pub display_object_name: bool,
    pub custom_objects: Option<CustomObjects>,
}

impl DetectionRequest {
    pub fn new(input: impl Into<ImageInput>, output: ImageOutput) -> Self {
        Self {
            input: input.into(),
            output,
            minimum_percentage_probability: 50.0,
            extract_detected_objects: false,
            display_percentage_probability: true,
            display_object_name: true,
            custom_objects: None,
        }
    }

    /// 输出到文件
    pub fn to_file(input: impl Into<ImageInput>, output: impl Into<PathBuf>) -> Self {
        Self::new(input, ImageOutput::File(output.into()))
    }

    /// 输出为数组
    pub fn to_array(input: impl Into<ImageInput>) -> Self {
        Self::new(input, ImageOutput::Array)
    }

    pub fn minimum_percentage_probability(mut self, value: f32) -> Self {
        self.minimum_percentage_probability = value;
        self
    }

    pub fn extract_detected_objects(mut self, value: bool) -> Self {
        self.extract_detected_objects = value;
        self
    }

    pub fn display_percentage_probability(mut self, value: bool) -> Self {
        self.display_percentage_probability = value;
        self
    }

    pub fn display_object_name(mut self, value: bool) -> Self {
        self.display_object_name = value;
        self
    }

    pub fn custom_objects(mut self, custom: CustomObjects) -> Self {
        self.custom_objects = Some(custom);
        self
    }
}

/// 一次检测的结果
#[derive(Debug, Clone)]
pub struct DetectionOutput {
    pub detections: Vec<DetectedObject>,
    pub annotated: AnnotatedImage,
    pub extracted: Option<ExtractedObjects>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_points_follow_style() {
        let a = BoxPoints::new(BoxStyle::Array, [1, 2, 30, 40]);
        let t = BoxPoints::new(BoxStyle::Tuple, [1, 2, 30, 40]);
        assert!(a.is_array() && !a.is_tuple());
        assert!(t.is_tuple() && !t.is_array());
        assert_eq!(a.as_xyxy(), t.as_xyxy());
        assert_eq!((a.width(), a.height()), (29, 38));
    }

    #[test]
    fn short_array_does_not_panic() {
        let short = BoxPoints::Array(Array1::from_vec(vec![3, 4]));
        assert_eq!(short.as_xyxy(), [3, 4, 0, 0]);
        assert_eq!((short.width(), short.height()), (-3, -4));
        assert_eq!(serde_json::to_value(&short).unwrap(), serde_json::json!([3, 4, 0, 0]));
    }

    #[test]
    fn box_points_serialize_as_list() {
        let obj = DetectedObject {
            name: "dog".to_string(),
            percentage_probability: 87.5,
            box_points: BoxPoints::new(BoxStyle::Tuple, [1, 2, 3, 4]),
        };
        let json = serde_json::to_value(&obj).unwrap();
        assert_eq!(json["box_points"], serde_json::json!([1, 2, 3, 4]));
        assert_eq!(json["name"], "dog");
    }

    #[test]
    fn custom_objects_validation() {
        let known: Vec<String> = vec!["person".into(), "car".into()];
        let ok: CustomObjects = ["person"].into_iter().collect();
        assert!(ok.validate(&known).is_ok());
        let bad = CustomObjects::new().with("person").with("unicorn");
        assert!(matches!(
            bad.validate(&known),
            Err(DetectionError::UnknownClass(name)) if name == "unicorn"
        ));
    }

    #[test]
    fn request_defaults() {
        let req = DetectionRequest::to_file(PathBuf::from("in.jpg"), "out.jpg");
        assert_eq!(req.minimum_percentage_probability, 50.0);
        assert!(!req.extract_detected_objects);
        assert!(req.display_object_name && req.display_percentage_probability);
        assert_eq!(req.output, ImageOutput::File(PathBuf::from("out.jpg")));
    }
}
