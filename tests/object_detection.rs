mod common;

use std::path::PathBuf;

use objdetect_rs::detection::annotate::{color_for, Annotator};
use objdetect_rs::detection::array::image_to_array;
use objdetect_rs::detection::extract::{objects_dir, save_objects};
use objdetect_rs::models::BoxStyle;
use objdetect_rs::{
    AnnotatedImage, BoxPoints, CustomObjects, DetectedObject, DetectionError, DetectionRequest,
    DetectionSpeed, ExtractedObjects, ModelType, ObjectDetection,
};

fn load(model_type: ModelType, path: PathBuf, speed: DetectionSpeed) -> ObjectDetection {
    let mut detector = ObjectDetection::new();
    detector.set_model_type(model_type);
    detector.set_model_path(path);
    detector.set_detection_speed(speed);
    detector.load_model().unwrap();
    assert!(detector.is_loaded());
    assert_eq!(detector.class_names().len(), 80);
    detector
}

// ========== 不需要模型 ==========

#[test]
fn detect_before_load_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let image = common::fixture_image(dir.path());
    let mut detector = ObjectDetection::new();
    detector.set_model_type_as_yolov3();
    let request = DetectionRequest::to_file(image, dir.path().join("out.jpg"));
    assert!(matches!(
        detector.detect_objects_from_image(&request),
        Err(DetectionError::ModelNotLoaded)
    ));
    assert!(!dir.path().join("out.jpg").exists());
}

#[test]
fn missing_model_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("yolo.onnx");
    let mut detector = ObjectDetection::new();
    detector.set_model_type_as_yolov3();
    detector.set_model_path(&missing);
    match detector.load_model() {
        Err(DetectionError::ModelNotFound(p)) => assert_eq!(p, missing),
        other => panic!("expected ModelNotFound, got {:?}", other.err()),
    }
}

#[test]
fn annotate_and_extract_without_model() {
    let dir = tempfile::tempdir().unwrap();
    let source = common::synthetic_image(160, 120);
    let detections = vec![
        DetectedObject {
            name: "person".into(),
            percentage_probability: 91.0,
            box_points: BoxPoints::new(BoxStyle::Array, [40, 30, 80, 60]),
        },
        DetectedObject {
            name: "car".into(),
            percentage_probability: 64.0,
            box_points: BoxPoints::new(BoxStyle::Array, [100, 10, 150, 110]),
        },
    ];

    let mut annotated = source.clone();
    let colored: Vec<_> = detections
        .iter()
        .cloned()
        .zip([color_for(0), color_for(2)])
        .collect();
    Annotator::new(None, 16.0, 2).draw(&mut annotated, &colored, true, true);
    assert_eq!(*annotated.get_pixel(40, 30), color_for(0));
    assert_eq!(*annotated.get_pixel(150, 110), color_for(2));
    assert_ne!(image_to_array(&annotated), image_to_array(&source));

    let out_dir = objects_dir(&dir.path().join("scene.jpg"));
    let paths = save_objects(&source, &detections, &out_dir).unwrap();
    assert_eq!(paths.len(), 2);
    assert!(paths[0].ends_with("person-1.jpg"));
    assert!(paths[1].ends_with("car-2.jpg"));
    let crop = image::open(&paths[0]).unwrap().to_rgb8();
    assert_eq!(crop.dimensions(), (40, 30));
    // 裁剪来自原图, 不含标注框
    assert_ne!(*crop.get_pixel(0, 0), color_for(0));
}

// ========== 需要模型 (models/*.onnx) ==========

#[test]
fn yolov3_detects_to_file_with_extraction() {
    let model = require_model!(ModelType::YOLOv3);
    let dir = tempfile::tempdir().unwrap();
    let image = common::fixture_image(dir.path());
    let output = dir.path().join("image-new.jpg");

    let mut detector = load(ModelType::YOLOv3, model, DetectionSpeed::Fast);
    let request = DetectionRequest::to_file(image, output.clone())
        .minimum_percentage_probability(30.0)
        .extract_detected_objects(true);
    let result = detector.detect_objects_from_image(&request).unwrap();

    assert_eq!(result.annotated, AnnotatedImage::Saved(output.clone()));
    assert!(output.exists());
    assert!(objects_dir(&output).is_dir());
    for obj in &result.detections {
        assert!(obj.box_points.is_tuple());
        assert!(obj.percentage_probability >= 30.0);
    }
    match result.extracted {
        Some(ExtractedObjects::Paths(paths)) => {
            assert_eq!(paths.len(), result.detections.len());
            assert!(paths.iter().all(|p| p.exists()));
        }
        other => panic!("expected extracted paths, got {other:?}"),
    }
}

#[test]
fn tiny_yolov3_detects_to_array() {
    let model = require_model!(ModelType::TinyYOLOv3);
    let source = common::synthetic_image(200, 150);
    let mut detector = load(ModelType::TinyYOLOv3, model, DetectionSpeed::Normal);

    let request =
        DetectionRequest::to_array(image_to_array(&source)).extract_detected_objects(true);
    let result = detector.detect_objects_from_image(&request).unwrap();

    let annotated = result.annotated.array().unwrap();
    assert_eq!(annotated.dim(), (150, 200, 3));
    match result.extracted {
        Some(ExtractedObjects::Arrays(arrays)) => assert_eq!(arrays.len(), result.detections.len()),
        other => panic!("expected extracted arrays, got {other:?}"),
    }
    assert!(result.detections.iter().all(|o| o.box_points.is_tuple()));
}

#[test]
fn retinanet_uses_array_boxes_and_custom_objects() {
    let model = require_model!(ModelType::RetinaNet);
    let dir = tempfile::tempdir().unwrap();
    let image = common::fixture_image(dir.path());
    let mut detector = load(ModelType::RetinaNet, model, DetectionSpeed::Fastest);

    let custom = detector.custom_objects().with("person").with("car");
    let request = DetectionRequest::to_file(image, dir.path().join("out").join("retina.jpg"));
    let result = detector
        .detect_custom_objects_from_image(custom, &request)
        .unwrap();

    assert!(dir.path().join("out").join("retina.jpg").exists());
    for obj in &result.detections {
        assert!(obj.box_points.is_array());
        assert!(obj.name == "person" || obj.name == "car");
        assert!(obj.percentage_probability >= 50.0);
    }

    let bad = CustomObjects::new().with("unicorn");
    assert!(matches!(
        detector.detect_custom_objects_from_image(bad, &request),
        Err(DetectionError::UnknownClass(_))
    ));
}

#[test]
fn changing_model_type_unloads() {
    let model = require_model!(ModelType::YOLOv3);
    let mut detector = load(ModelType::YOLOv3, model, DetectionSpeed::Flash);
    detector.set_model_type_as_yolov3();
    assert!(detector.is_loaded());
    detector.set_model_type_as_tiny_yolov3();
    assert!(!detector.is_loaded());
}
