//! Frame resizing to a screen's cell grid.
//!
//! Upscaling uses nearest-neighbour so cell edges stay crisp; downscaling
//! uses bilinear sampling to average detail away.

use gridcast_core::{Rgb, RgbFrame};

/// Sampling used when changing a frame's size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleFilter {
    Nearest,
    Bilinear,
}

impl ScaleFilter {
    /// Filter for scaling `src` to `dst` (width, height).
    pub fn for_sizes(src: (u32, u32), dst: (u32, u32)) -> Self {
        let src_area = src.0 as u64 * src.1 as u64;
        let dst_area = dst.0 as u64 * dst.1 as u64;
        if dst_area >= src_area {
            Self::Nearest
        } else {
            Self::Bilinear
        }
    }

    /// Name of the matching FFmpeg `scale` flag.
    pub fn ffmpeg_flag(self) -> &'static str {
        match self {
            Self::Nearest => "neighbor",
            Self::Bilinear => "bilinear",
        }
    }
}

/// Resize `frame` to `width x height`. Returns a clone when the size
/// already matches.
pub fn resize(frame: &RgbFrame, width: u32, height: u32) -> RgbFrame {
    if frame.width == width && frame.height == height {
        return frame.clone();
    }
    if frame.width == 0 || frame.height == 0 {
        return RgbFrame::solid(width, height, Rgb::BLACK, frame.pts);
    }
    match ScaleFilter::for_sizes((frame.width, frame.height), (width, height)) {
        ScaleFilter::Nearest => nearest(frame, width, height),
        ScaleFilter::Bilinear => bilinear(frame, width, height),
    }
}

fn nearest(frame: &RgbFrame, width: u32, height: u32) -> RgbFrame {
    let mut pixels = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        let sy = (y as u64 * frame.height as u64 / height as u64) as u32;
        for x in 0..width {
            let sx = (x as u64 * frame.width as u64 / width as u64) as u32;
            pixels.push(frame.pixel(sx, sy));
        }
    }
    RgbFrame {
        width,
        height,
        pts: frame.pts,
        pixels,
    }
}

fn bilinear(frame: &RgbFrame, width: u32, height: u32) -> RgbFrame {
    let x_ratio = frame.width as f32 / width as f32;
    let y_ratio = frame.height as f32 / height as f32;
    let max_x = frame.width - 1;
    let max_y = frame.height - 1;

    let mut pixels = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        let fy = ((y as f32 + 0.5) * y_ratio - 0.5).max(0.0);
        let y0 = (fy as u32).min(max_y);
        let y1 = (y0 + 1).min(max_y);
        let wy = fy - y0 as f32;
        for x in 0..width {
            let fx = ((x as f32 + 0.5) * x_ratio - 0.5).max(0.0);
            let x0 = (fx as u32).min(max_x);
            let x1 = (x0 + 1).min(max_x);
            let wx = fx - x0 as f32;

            let p00 = frame.pixel(x0, y0);
            let p10 = frame.pixel(x1, y0);
            let p01 = frame.pixel(x0, y1);
            let p11 = frame.pixel(x1, y1);
            let mix = |a: u8, b: u8, c: u8, d: u8| {
                let top = a as f32 + (b as f32 - a as f32) * wx;
                let bottom = c as f32 + (d as f32 - c as f32) * wx;
                (top + (bottom - top) * wy).round() as i32
            };
            pixels.push(Rgb::clamped(
                mix(p00.r, p10.r, p01.r, p11.r),
                mix(p00.g, p10.g, p01.g, p11.g),
                mix(p00.b, p10.b, p01.b, p11.b),
            ));
        }
    }
    RgbFrame {
        width,
        height,
        pts: frame.pts,
        pixels,
    }
}
