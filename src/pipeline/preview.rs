//! 预览帧 (Preview rendering)
//!
//! 原图 (或同尺寸黑底) 上绘制: 全部检测框 (灰), 目标框与骨架 (当前标签颜色)。

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::detection::types::{BBox, Detection, SKELETON};
use crate::detection::Frame;
use crate::error::SentinelResult;

/// 非目标检测框颜色
pub const OTHER_COLOR: [u8; 3] = [128, 128, 128];
/// 正常跟踪颜色
pub const TRACKING_COLOR: [u8; 3] = [0, 255, 0];

/// 关键点置信度低于该值不绘制
const MIN_KEYPOINT_CONF: f32 = 0.3;

fn draw_box(img: &mut RgbImage, bbox: &BBox, color: Rgb<u8>, thickness: i32) {
    let w = bbox.width().round() as i32;
    let h = bbox.height().round() as i32;
    for t in 0..thickness {
        let (rw, rh) = (w - 2 * t, h - 2 * t);
        if rw <= 0 || rh <= 0 {
            break;
        }
        let rect = Rect::at(bbox.x1.round() as i32 + t, bbox.y1.round() as i32 + t)
            .of_size(rw as u32, rh as u32);
        draw_hollow_rect_mut(img, rect, color);
    }
}

fn draw_skeleton(img: &mut RgbImage, det: &Detection, color: Rgb<u8>) {
    let pts = &det.keypoints.points;
    for &(a, b) in SKELETON.iter() {
        let (ax, ay, ac) = pts[a];
        let (bx, by, bc) = pts[b];
        if ac >= MIN_KEYPOINT_CONF && bc >= MIN_KEYPOINT_CONF {
            draw_line_segment_mut(img, (ax, ay), (bx, by), color);
        }
    }
    for &(x, y, c) in pts.iter() {
        if c >= MIN_KEYPOINT_CONF {
            draw_filled_circle_mut(img, (x.round() as i32, y.round() as i32), 3, color);
        }
    }
}

/// 绘制预览帧
pub fn render_preview(
    frame: &Frame,
    detections: &[Detection],
    target: Option<usize>,
    target_color: [u8; 3],
) -> RgbImage {
    let mut img = match &frame.image {
        Some(image) => image.clone(),
        None => RgbImage::new(frame.width.max(1), frame.height.max(1)),
    };

    for (i, det) in detections.iter().enumerate() {
        if Some(i) != target {
            draw_box(&mut img, &det.bbox, Rgb(OTHER_COLOR), 1);
        }
    }
    if let Some(det) = target.and_then(|i| detections.get(i)) {
        draw_box(&mut img, &det.bbox, Rgb(target_color), 3);
        draw_skeleton(&mut img, det, Rgb(target_color));
    }
    img
}

/// JPEG 编码
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> SentinelResult<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
        encoder.encode_image(img)?;
    }
    Ok(buf.into_inner())
}
