//! Projector viewport rectangles
//!
//! Calibration files describe each projector's region of the framebuffer as
//! fractions `l, b, w, h` with `b` measured from the bottom edge. wgpu
//! viewports and scissors use whole pixels with a top-left origin.

/// A projector's region as framebuffer fractions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportFraction {
    /// Left edge
    pub l: f32,
    /// Bottom edge, measured from the bottom
    pub b: f32,
    pub w: f32,
    pub h: f32,
}

impl ViewportFraction {
    /// Whole framebuffer
    pub const FULL: Self = Self {
        l: 0.0,
        b: 0.0,
        w: 1.0,
        h: 1.0,
    };

    pub fn new(l: f32, b: f32, w: f32, h: f32) -> Self {
        Self { l, b, w, h }
    }

    /// Pixel rectangle in a `width` x `height` framebuffer
    pub fn to_pixels(&self, width: u32, height: u32) -> PixelRect {
        PixelRect::from_fraction(*self, width, height)
    }
}

impl Default for ViewportFraction {
    fn default() -> Self {
        Self::FULL
    }
}

/// Pixel rectangle with a top-left origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Convert a fractional region, rounding each edge independently
    ///
    /// Adjacent regions that share an edge fraction share the same pixel
    /// edge, so regions partitioning the unit square tile the framebuffer.
    /// Edges are clamped to the framebuffer.
    pub fn from_fraction(fraction: ViewportFraction, width: u32, height: u32) -> Self {
        let edge = |f: f32, size: u32| -> u32 {
            if !f.is_finite() {
                return 0;
            }
            (f * size as f32).round().clamp(0.0, size as f32) as u32
        };

        let left = edge(fraction.l, width);
        let right = edge(fraction.l + fraction.w, width).max(left);
        let bottom = edge(fraction.b, height);
        let top = edge(fraction.b + fraction.h, height).max(bottom);

        Self {
            x: left,
            y: height - top,
            width: right - left,
            height: top - bottom,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    /// Apply as viewport and scissor on a render pass
    pub fn apply(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_viewport(
            self.x as f32,
            self.y as f32,
            self.width as f32,
            self.height as f32,
            0.0,
            1.0,
        );
        pass.set_scissor_rect(self.x, self.y, self.width, self.height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coverage(rects: &[PixelRect], width: u32, height: u32) -> Vec<u32> {
        let mut counts = vec![0u32; (width * height) as usize];
        for rect in rects {
            for y in rect.y..rect.y + rect.height {
                for x in rect.x..rect.x + rect.width {
                    counts[(y * width + x) as usize] += 1;
                }
            }
        }
        counts
    }

    #[test]
    fn test_full_viewport() {
        let rect = ViewportFraction::FULL.to_pixels(640, 480);
        assert_eq!(
            rect,
            PixelRect {
                x: 0,
                y: 0,
                width: 640,
                height: 480
            }
        );
    }

    #[test]
    fn test_horizontal_split_tiles_exactly() {
        for width in [640, 641, 1, 3] {
            let left = ViewportFraction::new(0.0, 0.0, 0.5, 1.0).to_pixels(width, 7);
            let right = ViewportFraction::new(0.5, 0.0, 0.5, 1.0).to_pixels(width, 7);
            assert_eq!(left.width + right.width, width);
            assert_eq!(left.x + left.width, right.x);
            assert!(coverage(&[left, right], width, 7).iter().all(|&c| c == 1));
        }
    }

    #[test]
    fn test_vertical_split_measures_from_bottom() {
        let bottom = ViewportFraction::new(0.0, 0.0, 1.0, 0.5).to_pixels(4, 5);
        let top = ViewportFraction::new(0.0, 0.5, 1.0, 0.5).to_pixels(4, 5);

        // The bottom region sits at the end of the top-left-origin range
        assert_eq!(bottom.y + bottom.height, 5);
        assert_eq!(top.y, 0);
        assert_eq!(top.height + bottom.height, 5);
        assert!(coverage(&[bottom, top], 4, 5).iter().all(|&c| c == 1));
    }

    #[test]
    fn test_quadrants_tile_odd_framebuffer() {
        let rects: Vec<_> = [(0.0, 0.0), (0.5, 0.0), (0.0, 0.5), (0.5, 0.5)]
            .iter()
            .map(|&(l, b)| ViewportFraction::new(l, b, 0.5, 0.5).to_pixels(101, 77))
            .collect();
        assert!(coverage(&rects, 101, 77).iter().all(|&c| c == 1));
    }

    #[test]
    fn test_thirds_tile_exactly() {
        let third = 1.0 / 3.0;
        let rects: Vec<_> = (0..3)
            .map(|i| ViewportFraction::new(i as f32 * third, 0.0, third, 1.0).to_pixels(100, 1))
            .collect();
        assert_eq!(rects.iter().map(|r| r.width).sum::<u32>(), 100);
        assert!(coverage(&rects, 100, 1).iter().all(|&c| c == 1));
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        let rect = ViewportFraction::new(0.75, -0.5, 1.0, 2.0).to_pixels(100, 100);
        assert_eq!(rect.x, 75);
        assert_eq!(rect.width, 25);
        assert_eq!(rect.y, 0);
        assert_eq!(rect.height, 100);

        let degenerate = ViewportFraction::new(0.5, 0.5, -0.2, 0.0).to_pixels(100, 100);
        assert!(degenerate.is_empty());
    }

    #[test]
    fn test_contains() {
        let rect = ViewportFraction::new(0.5, 0.0, 0.5, 1.0).to_pixels(10, 10);
        assert!(rect.contains(5, 0));
        assert!(!rect.contains(4, 0));
        assert!(!rect.contains(10, 9));
    }
}
