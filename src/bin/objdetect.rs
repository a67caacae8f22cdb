/// 图片目标检测命令行工具
///
/// 用法:
///   objdetect --model models/yolo.onnx --source images/1.jpg --extract
///   objdetect --model models/resnet50_coco_best_v2.1.0.onnx --source images/1.jpg --objects person,car --json
use anyhow::Context;
use clap::Parser;
use serde::Serialize;

use objdetect_rs::{
    Args, CustomObjects, DetectedObject, DetectionRequest, DetectorConfig, ExtractedObjects,
    ModelType, ObjectDetection,
};

#[derive(Serialize)]
struct Report<'a> {
    source: String,
    output: String,
    detections: &'a [DetectedObject],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    objects: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DetectorConfig::load(path),
        None => DetectorConfig::default(),
    };
    args.apply(&mut config);

    let model_type = match args.model_type {
        Some(t) => t,
        None => ModelType::from_path(&args.model.to_string_lossy()).with_context(|| {
            format!(
                "cannot infer model type from {}, pass --model-type",
                args.model.display()
            )
        })?,
    };

    let mut detector = ObjectDetection::with_config(config);
    detector.set_model_type(model_type);
    detector.set_model_path(&args.model);
    detector.set_detection_speed(args.speed);
    detector
        .load_model()
        .with_context(|| format!("failed to load model {}", args.model.display()))?;

    let output = args.output_path();
    let mut request = DetectionRequest::to_file(args.source.clone(), output.clone())
        .minimum_percentage_probability(args.min_prob)
        .extract_detected_objects(args.extract)
        .display_percentage_probability(!args.hide_prob)
        .display_object_name(!args.hide_name);
    if !args.objects.is_empty() {
        let custom: CustomObjects = args.objects.iter().map(|s| s.trim()).collect();
        request = request.custom_objects(custom);
    }

    let result = detector
        .detect_objects_from_image(&request)
        .with_context(|| format!("failed to detect objects in {}", args.source.display()))?;

    let objects = match &result.extracted {
        Some(ExtractedObjects::Paths(paths)) => {
            paths.iter().map(|p| p.display().to_string()).collect()
        }
        _ => Vec::new(),
    };

    if args.json {
        let report = Report {
            source: args.source.display().to_string(),
            output: output.display().to_string(),
            detections: &result.detections,
            objects,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for obj in &result.detections {
            println!(
                "{} : {:.2} : {:?}",
                obj.name,
                obj.percentage_probability,
                obj.box_points.as_xyxy()
            );
        }
        for path in &objects {
            println!("{path}");
        }
        log::info!("annotated image saved to {}", output.display());
    }

    Ok(())
}
