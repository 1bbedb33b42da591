use crate::error::DrawerError;
use crate::pixel::Rgb;
use async_trait::async_trait;

/// Read side of the remote board.
#[async_trait]
pub trait BoardSource: Send + Sync {
    /// Fetches a fresh snapshot and replaces the one served by `pixel_at`.
    async fn refresh(&self) -> Result<(), DrawerError>;

    /// Colour at `(x, y)` in the latest snapshot, `None` off the board.
    fn pixel_at(&self, x: u32, y: u32) -> Option<Rgb>;
}

/// In-memory board snapshot, stored column by column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<Rgb>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, Rgb::WHITE)
    }

    pub fn filled(width: u32, height: u32, color: Rgb) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(x as usize * self.height as usize + y as usize)
    }

    pub fn get(&self, x: u32, y: u32) -> Option<Rgb> {
        self.index(x, y).map(|idx| self.pixels[idx])
    }

    pub fn set(&mut self, x: u32, y: u32, color: Rgb) -> bool {
        match self.index(x, y) {
            Some(idx) => {
                self.pixels[idx] = color;
                true
            }
            None => false,
        }
    }

    /// Parses the board's text snapshot: one line per column, each holding
    /// `height` six-digit hex colours. A snapshot may stop early; missing
    /// columns keep the colour from `base`.
    pub fn parse_snapshot(base: &Canvas, text: &str) -> Result<Canvas, DrawerError> {
        let mut canvas = base.clone();
        let row_len = canvas.height as usize * 6;
        for (column, line) in text.lines().enumerate() {
            if column >= canvas.width as usize {
                break;
            }
            let line = line.trim_end_matches('\r');
            if line.len() != row_len {
                return Err(DrawerError::MalformedSnapshot {
                    column,
                    reason: format!("expected {row_len} hex digits, found {}", line.len()),
                });
            }
            for (y, chunk) in line.as_bytes().chunks(6).enumerate() {
                let color = Rgb::from_hex(chunk).ok_or_else(|| DrawerError::MalformedSnapshot {
                    column,
                    reason: format!("invalid colour at row {y}"),
                })?;
                canvas.pixels[column * canvas.height as usize + y] = color;
            }
        }
        Ok(canvas)
    }

    /// Row-major RGB8 bytes, ready for an image encoder.
    pub fn to_rgb_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixels.len() * 3);
        for y in 0..self.height {
            for x in 0..self.width {
                let (r, g, b) = self.get(x, y).unwrap_or_default().channels();
                out.extend_from_slice(&[r, g, b]);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_columns_of_hex() {
        let base = Canvas::new(2, 2);
        let snapshot = "ff000000ff00\n0000ffaaaaaa\n";
        let canvas = Canvas::parse_snapshot(&base, snapshot).expect("parse");
        assert_eq!(canvas.get(0, 0), Some(Rgb::new(0xFF0000)));
        assert_eq!(canvas.get(0, 1), Some(Rgb::new(0x00FF00)));
        assert_eq!(canvas.get(1, 0), Some(Rgb::new(0x0000FF)));
        assert_eq!(canvas.get(1, 1), Some(Rgb::PLACEHOLDER));
        assert_eq!(canvas.get(2, 0), None);
    }

    #[test]
    fn short_snapshot_keeps_base_columns() {
        let base = Canvas::filled(2, 1, Rgb::BLACK);
        let canvas = Canvas::parse_snapshot(&base, "123456\n").expect("parse");
        assert_eq!(canvas.get(0, 0), Some(Rgb::new(0x123456)));
        assert_eq!(canvas.get(1, 0), Some(Rgb::BLACK));
    }

    #[test]
    fn rejects_short_or_garbled_rows() {
        let base = Canvas::new(2, 2);
        let err = Canvas::parse_snapshot(&base, "ff0000\n").expect_err("short row");
        assert!(matches!(err, DrawerError::MalformedSnapshot { column: 0, .. }));

        let err = Canvas::parse_snapshot(&base, "ff000000ff00\nzz0000000000\n")
            .expect_err("bad digit");
        assert!(matches!(err, DrawerError::MalformedSnapshot { column: 1, .. }));
    }

    #[test]
    fn rgb_bytes_are_row_major() {
        let mut canvas = Canvas::filled(2, 2, Rgb::BLACK);
        canvas.set(1, 0, Rgb::new(0x010203));
        assert!(!canvas.set(5, 5, Rgb::WHITE));
        let bytes = canvas.to_rgb_bytes();
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[3..6], &[1, 2, 3]);
    }
}
