use image::{DynamicImage, Rgb, RgbImage};

use crate::error::ImageError;
use crate::images::style::visual_style;
use crate::images::{encode_jpeg, ImageRequest};

/// Draws a gradient banner in the domain palette with a row of faint
/// rings. Needs no network.
#[derive(Debug, Clone)]
pub struct LocalRenderer {
    width: u32,
    height: u32,
}

impl Default for LocalRenderer {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 400,
        }
    }
}

fn lerp(a: Rgb<u8>, b: Rgb<u8>, t: f32) -> Rgb<u8> {
    let mix = |x: u8, y: u8| (x as f32 + (y as f32 - x as f32) * t).round() as u8;
    Rgb([mix(a[0], b[0]), mix(a[1], b[1]), mix(a[2], b[2])])
}

/// Small stable hash so each topic gets its own ring offset.
fn topic_seed(topic: &str) -> u32 {
    topic
        .bytes()
        .fold(2166136261u32, |h, b| (h ^ b as u32).wrapping_mul(16777619))
}

impl LocalRenderer {
    pub fn render(&self, request: &ImageRequest) -> Result<(Vec<u8>, u32, u32), ImageError> {
        if self.width == 0 || self.height == 0 {
            return Err(ImageError::Render("empty canvas".to_string()));
        }
        let [start, middle, end] = visual_style(request.domain).palette;
        let (w, h) = (self.width, self.height);

        let mut img = RgbImage::from_fn(w, h, |x, _| {
            let t = x as f32 / (w - 1).max(1) as f32;
            if t < 0.5 {
                lerp(start, middle, t * 2.0)
            } else {
                lerp(middle, end, (t - 0.5) * 2.0)
            }
        });

        let white = Rgb([255, 255, 255]);
        let radius = h as f32 * 0.15;
        let offset = (topic_seed(&request.topic) % 100) as f32 / 100.0 * (w as f32 * 0.1);
        for i in 0..5 {
            let cx = w as f32 * (0.1 + i as f32 * 0.2) + offset;
            let cy = h as f32 * 0.5;
            let x0 = (cx - radius - 2.0).max(0.0) as u32;
            let x1 = ((cx + radius + 2.0) as u32).min(w - 1);
            let y0 = (cy - radius - 2.0).max(0.0) as u32;
            let y1 = ((cy + radius + 2.0) as u32).min(h - 1);
            for y in y0..=y1 {
                for x in x0..=x1 {
                    let d = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
                    if (d - radius).abs() <= 1.5 {
                        let pixel = img.get_pixel_mut(x, y);
                        *pixel = lerp(*pixel, white, 0.15);
                    }
                }
            }
        }

        encode_jpeg(&DynamicImage::ImageRgb8(img))
    }
}
