//! 检测目标裁剪 (从未标注的原图裁剪)

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use image::{imageops, RgbImage};
use ndarray::Array3;

use super::array::image_to_array;
use super::DetectedObject;
use crate::{DetectionError, Result};

/// 目标保存目录: `<output>-objects`
pub fn objects_dir(output: &Path) -> PathBuf {
    let mut dir = OsString::from(output.as_os_str());
    dir.push("-objects");
    PathBuf::from(dir)
}

/// 裁剪一个检测框, 裁剪到图像范围内; 面积为 0 时返回 None
pub fn crop(image: &RgbImage, [x1, y1, x2, y2]: [i32; 4]) -> Option<RgbImage> {
    let (w, h) = image.dimensions();
    let x1 = x1.clamp(0, w as i32) as u32;
    let x2 = x2.clamp(0, w as i32) as u32;
    let y1 = y1.clamp(0, h as i32) as u32;
    let y2 = y2.clamp(0, h as i32) as u32;
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(imageops::crop_imm(image, x1, y1, x2 - x1, y2 - y1).to_image())
}

/// 保存所有检测目标到 `dir`, 文件名 `<name>-<n>.jpg`, n 从 1 开始
///
/// 目录总会被创建, 即使没有检测结果。
pub fn save_objects(
    image: &RgbImage,
    detections: &[DetectedObject],
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).map_err(|e| DetectionError::io(dir, e))?;

    let mut paths = Vec::with_capacity(detections.len());
    for (i, det) in detections.iter().enumerate() {
        let Some(object) = crop(image, det.box_points.as_xyxy()) else {
            log::warn!("skip empty crop for {} at {:?}", det.name, det.box_points.as_xyxy());
            continue;
        };
        let path = dir.join(format!("{}-{}.jpg", det.name, i + 1));
        object
            .save(&path)
            .map_err(|e| DetectionError::image(&path, e))?;
        paths.push(path);
    }
    Ok(paths)
}

/// 以数组形式返回所有检测目标
pub fn extract_arrays(image: &RgbImage, detections: &[DetectedObject]) -> Vec<Array3<u8>> {
    detections
        .iter()
        .filter_map(|det| {
            let object = crop(image, det.box_points.as_xyxy());
            if object.is_none() {
                log::warn!("skip empty crop for {} at {:?}", det.name, det.box_points.as_xyxy());
            }
            object
        })
        .map(|object| image_to_array(&object))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoxPoints;
    use crate::models::BoxStyle;
    use image::Rgb;

    fn det(name: &str, xyxy: [i32; 4]) -> DetectedObject {
        DetectedObject {
            name: name.to_string(),
            percentage_probability: 90.0,
            box_points: BoxPoints::new(BoxStyle::Array, xyxy),
        }
    }

    #[test]
    fn objects_dir_appends_suffix() {
        assert_eq!(
            objects_dir(Path::new("out/image-new.jpg")),
            PathBuf::from("out/image-new.jpg-objects")
        );
    }

    #[test]
    fn crop_is_clamped() {
        let mut img = RgbImage::new(20, 10);
        img.put_pixel(19, 9, Rgb([9, 9, 9]));
        let c = crop(&img, [15, 5, 40, 40]).unwrap();
        assert_eq!(c.dimensions(), (5, 5));
        assert_eq!(*c.get_pixel(4, 4), Rgb([9, 9, 9]));
        assert!(crop(&img, [25, 0, 30, 5]).is_none());
    }

    #[test]
    fn saves_numbered_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = objects_dir(&dir.path().join("scene.jpg"));
        let img = RgbImage::from_pixel(32, 32, Rgb([10, 120, 200]));
        let dets = [det("dog", [0, 0, 16, 16]), det("cat", [8, 8, 8, 30]), det("dog", [10, 10, 30, 30])];

        let paths = save_objects(&img, &dets, &out).unwrap();
        assert_eq!(paths, vec![out.join("dog-1.jpg"), out.join("dog-3.jpg")]);
        assert!(paths.iter().all(|p| p.exists()));
    }

    #[test]
    fn empty_detections_still_create_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("x.jpg-objects");
        assert!(save_objects(&RgbImage::new(4, 4), &[], &out).unwrap().is_empty());
        assert!(out.is_dir());
    }

    #[test]
    fn arrays_have_crop_shape() {
        let img = RgbImage::new(32, 24);
        let arrays = extract_arrays(&img, &[det("person", [2, 4, 12, 20])]);
        assert_eq!(arrays.len(), 1);
        assert_eq!(arrays[0].dim(), (16, 10, 3));
    }
}
