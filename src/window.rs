//! Macro-pixel windows.

use crate::raster::{PixelPos, Rect};

/// An N x N block of raster pixels anchored on a match-up position.
///
/// The window starts `N / 2` pixels before the truncated center, so for an
/// even N it extends one pixel further toward lower indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacroPixelWindow {
    pub x0: i64,
    pub y0: i64,
    pub size: usize,
}

impl MacroPixelWindow {
    pub fn new(center: PixelPos, size: usize) -> Self {
        let half = (size / 2) as i64;
        Self {
            x0: center.x.floor() as i64 - half,
            y0: center.y.floor() as i64 - half,
            size,
        }
    }

    #[inline]
    pub fn rect(&self) -> Rect {
        Rect::new(self.x0, self.y0, self.size, self.size)
    }

    /// Number of pixels, N squared.
    #[inline]
    pub fn len(&self) -> usize {
        self.size * self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Raster coordinates of window index `i` (row-major).
    #[inline]
    pub fn pixel(&self, i: usize) -> (i64, i64) {
        (
            self.x0 + (i % self.size) as i64,
            self.y0 + (i / self.size) as i64,
        )
    }

    /// Iterate raster coordinates in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        (0..self.len()).map(move |i| self.pixel(i))
    }

    /// True if two windows of the same size share at least one pixel.
    #[inline]
    pub fn overlaps(&self, other: &MacroPixelWindow) -> bool {
        let n = self.size.max(other.size) as i64;
        (self.x0 - other.x0).abs() < n && (self.y0 - other.y0).abs() < n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_odd_window_centered() {
        let w = MacroPixelWindow::new(PixelPos::new(10.7, 4.2), 3);
        assert_eq!(w.rect(), Rect::new(9, 3, 3, 3));
        assert_eq!(w.len(), 9);
        assert_eq!(w.pixel(0), (9, 3));
        assert_eq!(w.pixel(4), (10, 4));
        assert_eq!(w.pixel(8), (11, 5));
    }

    #[test]
    fn test_even_window_biased_low() {
        let w = MacroPixelWindow::new(PixelPos::new(10.5, 10.5), 4);
        assert_eq!(w.rect(), Rect::new(8, 8, 4, 4));
        let w = MacroPixelWindow::new(PixelPos::new(10.5, 10.5), 2);
        assert_eq!(w.rect(), Rect::new(9, 9, 2, 2));
    }

    #[test]
    fn test_single_pixel_window() {
        let w = MacroPixelWindow::new(PixelPos::new(0.2, 7.9), 1);
        assert_eq!(w.rect(), Rect::new(0, 7, 1, 1));
        assert_eq!(w.pixels().collect::<Vec<_>>(), vec![(0, 7)]);
    }

    #[test]
    fn test_overlap() {
        let a = MacroPixelWindow::new(PixelPos::new(5.0, 5.0), 3);
        assert!(a.overlaps(&MacroPixelWindow::new(PixelPos::new(7.0, 5.0), 3)));
        assert!(a.overlaps(&MacroPixelWindow::new(PixelPos::new(3.0, 3.0), 3)));
        assert!(!a.overlaps(&MacroPixelWindow::new(PixelPos::new(8.0, 5.0), 3)));
        assert!(!a.overlaps(&MacroPixelWindow::new(PixelPos::new(5.0, 2.0), 3)));
    }
}
