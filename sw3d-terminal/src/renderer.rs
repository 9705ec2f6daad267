//! ASCII rasterizer for terminal rendering
//!
//! Takes screen-space points as produced by the core pipeline: x/y in
//! character cells, z the reversed NDC depth (larger is nearer, 0 is
//! infinitely far). Anything with a non-finite or non-positive depth is
//! behind the camera or in its plane and is not drawn.
use crossterm::{
    style::{Color, Print, ResetColor, SetForegroundColor},
    QueueableCommand,
};
use nalgebra::Point3;
use std::io::Write;

/// Character luminosity ramp for depth/shading (darkest to lightest)
pub const LUMINOSITY_RAMP: &[char] = &[' ', '.', ':', '-', '=', '+', '*', '#', '%', '@'];

/// Ramp character for a brightness in [0, 1]
pub fn shade(brightness: f32) -> char {
    let last = LUMINOSITY_RAMP.len() - 1;
    let index = (brightness.clamp(0.0, 1.0) * last as f32).round() as usize;
    LUMINOSITY_RAMP[index.min(last)]
}

/// ASCII renderer that converts screen-space primitives to terminal characters
pub struct AsciiRenderer {
    width: usize,
    height: usize,
    depth_buffer: Vec<f32>,
    char_buffer: Vec<char>,
}

impl AsciiRenderer {
    pub fn new(width: usize, height: usize) -> Self {
        let size = width * height;
        Self {
            width,
            height,
            depth_buffer: vec![0.0; size],
            char_buffer: vec![' '; size],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn resize(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        self.depth_buffer.resize(width * height, 0.0);
        self.char_buffer.resize(width * height, ' ');
        self.clear();
    }

    pub fn clear(&mut self) {
        self.depth_buffer.fill(0.0);
        self.char_buffer.fill(' ');
    }

    pub fn char_at(&self, x: usize, y: usize) -> Option<char> {
        (x < self.width && y < self.height).then(|| self.char_buffer[y * self.width + x])
    }

    fn index(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        Some(y as usize * self.width + x as usize)
    }

    fn write(&mut self, x: i64, y: i64, depth: f32, character: char) -> bool {
        if !(depth.is_finite() && depth > 0.0) {
            return false;
        }
        let Some(idx) = self.index(x, y) else {
            return false;
        };
        if depth > self.depth_buffer[idx] {
            self.depth_buffer[idx] = depth;
            self.char_buffer[idx] = character;
            return true;
        }
        false
    }

    /// Depth tested point, rounded to the nearest cell
    pub fn plot(&mut self, point: &Point3<f32>, character: char) -> bool {
        if !point.x.is_finite() || !point.y.is_finite() {
            return false;
        }
        self.write(
            (point.x + 0.5).floor() as i64,
            (point.y + 0.5).floor() as i64,
            point.z,
            character,
        )
    }

    /// Write a character only into cells nothing has been drawn into yet
    pub fn plot_background(&mut self, x: i64, y: i64, character: char) -> bool {
        match self.index(x, y) {
            Some(idx) if self.depth_buffer[idx] == 0.0 => {
                self.char_buffer[idx] = character;
                true
            }
            _ => false,
        }
    }

    /// Bresenham line with depth interpolated along the major axis
    pub fn draw_line(&mut self, from: &Point3<f32>, to: &Point3<f32>, character: char) {
        let visible = |p: &Point3<f32>| p.iter().all(|c| c.is_finite()) && p.z > 0.0;
        if !visible(from) || !visible(to) || self.width == 0 || self.height == 0 {
            return;
        }
        let max = ((self.width - 1) as f32, (self.height - 1) as f32);
        let Some((from, to)) = clip_segment(from, to, max) else {
            return;
        };
        let (from, to) = (&from, &to);

        let (mut x0, mut y0) = (from.x.round() as i64, from.y.round() as i64);
        let (x1, y1) = (to.x.round() as i64, to.y.round() as i64);

        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let steps = dx.max(-dy).max(1) as f32;
        let mut err = dx + dy;
        let mut step = 0.0;

        loop {
            let depth = from.z + (to.z - from.z) * (step / steps);
            self.write(x0, y0, depth, character);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
            step += 1.0;
        }
    }

    /// Fill a screen-space triangle, sampling cell centres
    pub fn fill_triangle(&mut self, vertices: &[Point3<f32>; 3], character: char) {
        if vertices
            .iter()
            .any(|v| !v.iter().all(|c| c.is_finite()) || v.z <= 0.0)
        {
            return;
        }
        let [v0, v1, v2] = vertices;

        // Bounding box, clipped to the screen
        let min_x = (v0.x.min(v1.x).min(v2.x).floor() as i64).max(0);
        let max_x = (v0.x.max(v1.x).max(v2.x).ceil() as i64).min(self.width as i64 - 1);
        let min_y = (v0.y.min(v1.y).min(v2.y).floor() as i64).max(0);
        let max_y = (v0.y.max(v1.y).max(v2.y).ceil() as i64).min(self.height as i64 - 1);

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let p = (x as f32 + 0.5, y as f32 + 0.5);
                let Some((w0, w1, w2)) =
                    barycentric((v0.x, v0.y), (v1.x, v1.y), (v2.x, v2.y), p)
                else {
                    continue;
                };
                if w0 >= 0.0 && w1 >= 0.0 && w2 >= 0.0 {
                    let depth = w0 * v0.z + w1 * v1.z + w2 * v2.z;
                    self.write(x, y, depth, character);
                }
            }
        }
    }

    /// Overwrite the start of a row, ignoring depth
    pub fn print(&mut self, x: usize, y: usize, text: &str) {
        if y >= self.height {
            return;
        }
        for (offset, c) in text.chars().enumerate() {
            let column = x + offset;
            if column >= self.width {
                break;
            }
            self.char_buffer[y * self.width + column] = c;
        }
    }

    pub fn draw<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for y in 0..self.height {
            for x in 0..self.width {
                let c = self.char_buffer[y * self.width + x];

                // Color based on character intensity
                let color = match c {
                    ' ' | '.' | ':' => Color::DarkGrey,
                    '-' | '=' => Color::Grey,
                    '+' | '*' => Color::White,
                    '#' | '%' | '@' => Color::Cyan,
                    _ => Color::Yellow,
                };

                writer.queue(SetForegroundColor(color))?;
                writer.queue(Print(c))?;
            }
            if y + 1 < self.height {
                writer.queue(Print("\r\n"))?;
            }
        }
        writer.queue(ResetColor)?;
        Ok(())
    }
}

/// Liang-Barsky clip of a segment to `[0, max.0] x [0, max.1]`, depth
/// interpolated with the same parameter
fn clip_segment(
    from: &Point3<f32>,
    to: &Point3<f32>,
    max: (f32, f32),
) -> Option<(Point3<f32>, Point3<f32>)> {
    let d = to - from;
    let (mut t0, mut t1) = (0.0f32, 1.0f32);
    let edges = [
        (-d.x, from.x),
        (d.x, max.0 - from.x),
        (-d.y, from.y),
        (d.y, max.1 - from.y),
    ];

    for (p, q) in edges {
        if p == 0.0 {
            // Parallel to this edge
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }

    Some((from + d * t0, from + d * t1))
}

/// Calculate barycentric coordinates for a point in a triangle
fn barycentric(
    v0: (f32, f32),
    v1: (f32, f32),
    v2: (f32, f32),
    p: (f32, f32),
) -> Option<(f32, f32, f32)> {
    let denom = (v1.1 - v2.1) * (v0.0 - v2.0) + (v2.0 - v1.0) * (v0.1 - v2.1);

    if denom.abs() < 1e-6 {
        return None;
    }

    let w0 = ((v1.1 - v2.1) * (p.0 - v2.0) + (v2.0 - v1.0) * (p.1 - v2.1)) / denom;
    let w1 = ((v2.1 - v0.1) * (p.0 - v2.0) + (v0.0 - v2.0) * (p.1 - v2.1)) / denom;
    let w2 = 1.0 - w0 - w1;

    Some((w0, w1, w2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearer_point_wins() {
        let mut r = AsciiRenderer::new(4, 4);
        assert!(r.plot(&Point3::new(1.0, 1.0, 0.2), 'a'));
        assert!(!r.plot(&Point3::new(1.2, 0.9, 0.1), 'b'));
        assert!(r.plot(&Point3::new(0.8, 1.1, 0.5), 'c'));
        assert_eq!(r.char_at(1, 1), Some('c'));
    }

    #[test]
    fn test_sentinel_and_offscreen_are_skipped() {
        let mut r = AsciiRenderer::new(4, 4);
        assert!(!r.plot(&Point3::new(0.0, 0.0, f32::INFINITY), 'x'));
        assert!(!r.plot(&Point3::new(0.0, 0.0, -0.3), 'x'));
        assert!(!r.plot(&Point3::new(9.0, 0.0, 0.5), 'x'));
        assert_eq!(r.char_at(0, 0), Some(' '));
        assert_eq!(r.char_at(9, 0), None);
    }

    #[test]
    fn test_line_covers_endpoints() {
        let mut r = AsciiRenderer::new(8, 8);
        r.draw_line(&Point3::new(0.0, 0.0, 0.5), &Point3::new(7.0, 3.0, 0.5), '#');
        assert_eq!(r.char_at(0, 0), Some('#'));
        assert_eq!(r.char_at(7, 3), Some('#'));
        let drawn = (0..8)
            .flat_map(|y| (0..8).map(move |x| (x, y)))
            .filter(|&(x, y)| r.char_at(x, y) == Some('#'))
            .count();
        assert_eq!(drawn, 8);
    }

    #[test]
    fn test_line_clipped_to_screen() {
        let mut r = AsciiRenderer::new(80, 24);
        r.draw_line(&Point3::new(10.0, 10.0, 0.5), &Point3::new(3.0e8, 10.0, 0.5), '#');
        assert!((10..80).all(|x| r.char_at(x, 10) == Some('#')));
        assert_eq!(r.char_at(9, 10), Some(' '));

        // Entirely above the screen: nothing to walk
        r.clear();
        r.draw_line(&Point3::new(-1.0e9, -5.0, 0.5), &Point3::new(1.0e9, -5.0, 0.5), '#');
        assert!((0..80).all(|x| (0..24).all(|y| r.char_at(x, y) == Some(' '))));
    }

    #[test]
    fn test_clipped_line_keeps_depth() {
        let mut r = AsciiRenderer::new(10, 10);
        // Depth at x = 9 along this line is 0.5 + 0.4 * 9 / 19
        r.draw_line(&Point3::new(0.0, 2.0, 0.5), &Point3::new(19.0, 2.0, 0.9), '#');
        assert!(!r.plot(&Point3::new(9.0, 2.0, 0.68), 'x'));
        assert!(r.plot(&Point3::new(9.0, 2.0, 0.7), 'x'));
    }

    #[test]
    fn test_fill_triangle_and_background() {
        let mut r = AsciiRenderer::new(10, 10);
        r.fill_triangle(
            &[
                Point3::new(0.0, 0.0, 0.5),
                Point3::new(10.0, 0.0, 0.5),
                Point3::new(0.0, 10.0, 0.5),
            ],
            '@',
        );
        assert_eq!(r.char_at(1, 1), Some('@'));
        assert_eq!(r.char_at(9, 9), Some(' '));

        assert!(!r.plot_background(1, 1, '.'));
        assert!(r.plot_background(9, 9, '.'));
        assert_eq!(r.char_at(9, 9), Some('.'));
    }

    #[test]
    fn test_shade_ramp_ends() {
        assert_eq!(shade(0.0), ' ');
        assert_eq!(shade(1.0), '@');
        assert_eq!(shade(7.0), '@');
    }
}
