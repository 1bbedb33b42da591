use crate::error::DrawerError;
use crate::pixel::Rgb;

/// The picture the drawer reproduces on the board.
///
/// Pixels are addressed by `(x, y)` and, for queueing, by a column-major
/// offset `x * height + y`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetImage {
    width: u32,
    height: u32,
    // row-major
    pixels: Vec<Rgb>,
}

impl TargetImage {
    /// Builds an image from row-major pixels.
    pub fn from_rows(width: u32, height: u32, pixels: Vec<Rgb>) -> Result<Self, DrawerError> {
        if width == 0 || height == 0 {
            return Err(DrawerError::InvalidImage(format!(
                "empty image {width}x{height}"
            )));
        }
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(DrawerError::InvalidImage(format!(
                "expected {expected} pixels, found {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn check_size(&self, max_side: u32) -> Result<(), DrawerError> {
        check_dimensions(self.width, self.height, max_side)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Colour to compare with and paint onto the board at `(x, y)`.
    pub fn expected(&self, x: u32, y: u32) -> Option<Rgb> {
        self.pixel(x, y).map(Rgb::paintable)
    }

    pub fn offset_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn offset(&self, x: u32, y: u32) -> usize {
        x as usize * self.height as usize + y as usize
    }

    pub fn coords(&self, offset: usize) -> Option<(u32, u32)> {
        if offset >= self.offset_count() {
            return None;
        }
        let height = self.height as usize;
        Some(((offset / height) as u32, (offset % height) as u32))
    }
}

/// Rejects images wider or taller than `max_side`. Decoders call this on the
/// header before allocating pixel buffers.
pub fn check_dimensions(width: u32, height: u32, max_side: u32) -> Result<(), DrawerError> {
    if width > max_side || height > max_side {
        return Err(DrawerError::SizeLimitExceeded {
            width,
            height,
            max: max_side,
        });
    }
    Ok(())
}

/// Origin of the target image on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
}

impl Placement {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    pub fn validate(&self, canvas_width: u32, canvas_height: u32) -> Result<(), DrawerError> {
        if self.x > canvas_width || self.y > canvas_height {
            return Err(DrawerError::PlacementOutOfBounds {
                x: self.x,
                y: self.y,
            });
        }
        Ok(())
    }

    pub fn map(&self, x: u32, y: u32) -> (u32, u32) {
        (self.x + x, self.y + y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TargetImage {
        TargetImage::from_rows(
            2,
            3,
            vec![
                Rgb::new(0x000001),
                Rgb::new(0x000002),
                Rgb::new(0x000003),
                Rgb::WHITE,
                Rgb::new(0x000005),
                Rgb::new(0x000006),
            ],
        )
        .expect("image")
    }

    #[test]
    fn offsets_are_column_major() {
        let image = sample();
        assert_eq!(image.offset_count(), 6);
        assert_eq!(image.offset(0, 0), 0);
        assert_eq!(image.offset(0, 2), 2);
        assert_eq!(image.offset(1, 0), 3);
        for offset in 0..image.offset_count() {
            let (x, y) = image.coords(offset).expect("in range");
            assert_eq!(image.offset(x, y), offset);
        }
        assert_eq!(image.coords(6), None);
    }

    #[test]
    fn expected_substitutes_white() {
        let image = sample();
        assert_eq!(image.pixel(1, 1), Some(Rgb::WHITE));
        assert_eq!(image.expected(1, 1), Some(Rgb::PLACEHOLDER));
        assert_eq!(image.expected(0, 2), Some(Rgb::new(0x000005)));
        assert_eq!(image.expected(2, 0), None);
    }

    #[test]
    fn rejects_bad_dimensions() {
        assert!(matches!(
            TargetImage::from_rows(2, 2, vec![Rgb::BLACK; 3]),
            Err(DrawerError::InvalidImage(_))
        ));
        assert!(TargetImage::from_rows(0, 2, Vec::new()).is_err());

        let wide = TargetImage::from_rows(201, 1, vec![Rgb::BLACK; 201]).expect("image");
        assert_eq!(
            wide.check_size(200),
            Err(DrawerError::SizeLimitExceeded {
                width: 201,
                height: 1,
                max: 200
            })
        );
        assert!(sample().check_size(200).is_ok());
        assert!(check_dimensions(200, 200, 200).is_ok());
        assert!(check_dimensions(200, 5000, 200).is_err());
    }

    #[test]
    fn placement_bounds_are_inclusive() {
        assert!(Placement::new(1000, 600).validate(1000, 600).is_ok());
        assert!(Placement::new(1001, 0).validate(1000, 600).is_err());
        assert_eq!(Placement::new(10, 20).map(1, 2), (11, 22));
    }
}
