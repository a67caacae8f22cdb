//! 检测结果标注: 画框 + 标签文字

use std::fs;
use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use super::DetectedObject;
use crate::{DetectionError, DetectorConfig, Result};

/// 类别调色板
const BRIGHT_COLORS: [(u8, u8, u8); 12] = [
    (255, 0, 0),     // 红色
    (0, 255, 0),     // 绿色
    (0, 0, 255),     // 蓝色
    (255, 255, 0),   // 黄色
    (255, 0, 255),   // 品红
    (0, 255, 255),   // 青色
    (255, 128, 0),   // 橙色
    (255, 0, 128),   // 粉红
    (128, 255, 0),   // 黄绿
    (0, 128, 255),   // 天蓝
    (255, 255, 255), // 白色
    (128, 0, 255),   // 紫色
];

/// 按类别 id 取颜色
pub fn color_for(class_id: usize) -> Rgb<u8> {
    let (r, g, b) = BRIGHT_COLORS[class_id % BRIGHT_COLORS.len()];
    Rgb([r, g, b])
}

/// 标签文字
///
/// - 名称 + 置信度: `"person : 87.53"`
/// - 仅名称: `"person"`
/// - 仅置信度: `"87.53"`
/// - 都不显示: `None`
pub fn label_text(
    name: &str,
    percentage_probability: f32,
    show_name: bool,
    show_probability: bool,
) -> Option<String> {
    match (show_name, show_probability) {
        (true, true) => Some(format!("{name} : {percentage_probability:.2}")),
        (true, false) => Some(name.to_string()),
        (false, true) => Some(format!("{percentage_probability:.2}")),
        (false, false) => None,
    }
}

/// 框坐标 → `Rect`, 裁剪到图像内; 空框返回 None
fn rect_from_xyxy([x1, y1, x2, y2]: [i32; 4], img_w: u32, img_h: u32) -> Option<Rect> {
    if img_w == 0 || img_h == 0 {
        return None;
    }
    let max_x = img_w as i32 - 1;
    let max_y = img_h as i32 - 1;
    let (x1, x2) = (x1.clamp(0, max_x), x2.clamp(0, max_x));
    let (y1, y2) = (y1.clamp(0, max_y), y2.clamp(0, max_y));
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(Rect::at(x1, y1).of_size((x2 - x1 + 1) as u32, (y2 - y1 + 1) as u32))
}

/// 标注器
pub struct Annotator {
    font: Option<FontVec>,
    scale: PxScale,
    thickness: u32,
}

impl Annotator {
    pub fn new(font: Option<FontVec>, label_scale: f32, thickness: u32) -> Self {
        Self {
            font,
            scale: PxScale::from(label_scale),
            thickness: thickness.max(1),
        }
    }

    /// 按配置创建, 有字体路径时加载字体
    pub fn from_config(config: &DetectorConfig) -> Result<Self> {
        let font = match &config.font_path {
            Some(path) => Some(load_font(path)?),
            None => None,
        };
        Ok(Self::new(font, config.label_scale, config.line_thickness))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// 在图像上画出所有检测结果
    pub fn draw(
        &self,
        image: &mut RgbImage,
        detections: &[(DetectedObject, Rgb<u8>)],
        show_name: bool,
        show_probability: bool,
    ) {
        let (img_w, img_h) = image.dimensions();
        for (det, color) in detections {
            let Some(rect) = rect_from_xyxy(det.box_points.as_xyxy(), img_w, img_h) else {
                continue;
            };
            for t in 0..self.thickness as i32 {
                let (w, h) = (rect.width() as i32 - 2 * t, rect.height() as i32 - 2 * t);
                if w <= 0 || h <= 0 {
                    break;
                }
                let r = Rect::at(rect.left() + t, rect.top() + t).of_size(w as u32, h as u32);
                draw_hollow_rect_mut(image, r, *color);
            }

            if let (Some(font), Some(text)) = (
                &self.font,
                label_text(&det.name, det.percentage_probability, show_name, show_probability),
            ) {
                self.draw_label(image, font, rect, &text, *color);
            }
        }
    }

    fn draw_label(&self, image: &mut RgbImage, font: &FontVec, rect: Rect, text: &str, color: Rgb<u8>) {
        let (tw, th) = text_size(self.scale, font, text);
        if tw == 0 || th == 0 {
            return;
        }
        let (pad, box_h) = (2, th as i32 + 4);
        // 放在框上方, 放不下时放在框内
        let y = if rect.top() >= box_h {
            rect.top() - box_h
        } else {
            rect.top()
        };
        let background = Rect::at(rect.left(), y).of_size(tw + 2 * pad as u32, box_h as u32);
        draw_filled_rect_mut(image, background, color);

        // 亮色背景用黑字
        let luma = 0.299 * color[0] as f32 + 0.587 * color[1] as f32 + 0.114 * color[2] as f32;
        let text_color = if luma > 128. {
            Rgb([0, 0, 0])
        } else {
            Rgb([255, 255, 255])
        };
        draw_text_mut(image, text_color, rect.left() + pad, y + pad, self.scale, font, text);
    }
}

/// 加载 TrueType 字体
pub fn load_font(path: &Path) -> Result<FontVec> {
    let bytes = fs::read(path).map_err(|e| DetectionError::io(path, e))?;
    FontVec::try_from_vec(bytes).map_err(|_| DetectionError::InvalidFont(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoxPoints;
    use crate::models::BoxStyle;

    fn det(xyxy: [i32; 4]) -> DetectedObject {
        DetectedObject {
            name: "person".to_string(),
            percentage_probability: 87.531,
            box_points: BoxPoints::new(BoxStyle::Tuple, xyxy),
        }
    }

    #[test]
    fn label_follows_display_flags() {
        assert_eq!(label_text("car", 91.256, true, true).as_deref(), Some("car : 91.26"));
        assert_eq!(label_text("car", 91.256, true, false).as_deref(), Some("car"));
        assert_eq!(label_text("car", 91.256, false, true).as_deref(), Some("91.26"));
        assert_eq!(label_text("car", 91.256, false, false), None);
    }

    #[test]
    fn palette_wraps() {
        assert_eq!(color_for(0), color_for(BRIGHT_COLORS.len()));
        assert_ne!(color_for(0), color_for(1));
    }

    #[test]
    fn draws_box_outline_only() {
        let mut img = RgbImage::new(40, 40);
        let annotator = Annotator::new(None, 16.0, 2);
        annotator.draw(&mut img, &[(det([5, 5, 30, 30]), Rgb([255, 0, 0]))], true, true);
        assert_eq!(*img.get_pixel(5, 5), Rgb([255, 0, 0]));
        assert_eq!(*img.get_pixel(6, 6), Rgb([255, 0, 0]));
        assert_eq!(*img.get_pixel(30, 30), Rgb([255, 0, 0]));
        assert_eq!(*img.get_pixel(15, 15), Rgb([0, 0, 0]));
    }

    #[test]
    fn out_of_range_boxes_are_clamped_or_skipped() {
        assert!(rect_from_xyxy([10, 10, 10, 20], 50, 50).is_none());
        let r = rect_from_xyxy([-5, -5, 100, 100], 50, 50).unwrap();
        assert_eq!((r.left(), r.top(), r.width(), r.height()), (0, 0, 50, 50));

        let mut img = RgbImage::new(10, 10);
        Annotator::new(None, 12.0, 2).draw(&mut img, &[(det([-20, -20, -5, -5]), Rgb([1, 2, 3]))], true, true);
        assert!(img.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn font_errors() {
        assert!(matches!(
            load_font(Path::new("no/such/font.ttf")),
            Err(DetectionError::Io { .. })
        ));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ttf");
        fs::write(&path, b"not a font").unwrap();
        assert!(matches!(load_font(&path), Err(DetectionError::InvalidFont(_))));
    }
}
