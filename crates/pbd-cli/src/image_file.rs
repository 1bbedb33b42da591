use anyhow::{bail, Context, Result};
use image::ImageDecoder;
use pbd_core::{check_dimensions, Canvas, Rgb, TargetImage};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Seek};
use std::path::Path;

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_MAGIC: &[u8] = b"\xFF\xD8\xFF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Gray,
    GrayAlpha,
    Rgb,
    Rgba,
}

impl Layout {
    fn samples(self) -> usize {
        match self {
            Layout::Gray => 1,
            Layout::GrayAlpha => 2,
            Layout::Rgb => 3,
            Layout::Rgba => 4,
        }
    }
}

/// Decodes a PNG or JPEG, picked by magic bytes, into a target image.
/// Images larger than `max_side` are rejected from the header alone. Alpha
/// is premultiplied, so fully transparent pixels come out black.
pub fn load_image(path: &Path, max_side: u32) -> Result<TargetImage> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut magic = Vec::with_capacity(PNG_MAGIC.len());
    (&mut file)
        .take(PNG_MAGIC.len() as u64)
        .read_to_end(&mut magic)?;
    file.rewind()?;

    let reader = BufReader::new(file);
    let decoded = if magic.starts_with(PNG_MAGIC) {
        decode_png(reader, max_side)
    } else if magic.starts_with(JPEG_MAGIC) {
        decode_jpeg(reader, max_side)
    } else {
        bail!("{} is neither png nor jpeg", path.display());
    };
    decoded.with_context(|| format!("Failed to decode {}", path.display()))
}

fn decode_png<R: BufRead + Seek>(reader: R, max_side: u32) -> Result<TargetImage> {
    let mut decoder = png::Decoder::new(reader);
    decoder.set_transformations(png::Transformations::normalize_to_color8());
    let mut reader = decoder.read_info()?;

    let (width, height) = {
        let info = reader.info();
        (info.width, info.height)
    };
    check_dimensions(width, height, max_side)?;

    let layout = match reader.output_color_type().0 {
        png::ColorType::Grayscale => Layout::Gray,
        png::ColorType::GrayscaleAlpha => Layout::GrayAlpha,
        png::ColorType::Rgb => Layout::Rgb,
        png::ColorType::Rgba => Layout::Rgba,
        other => bail!("unsupported png colour type {other:?}"),
    };
    let samples = layout.samples();
    let mut buf = vec![0u8; width as usize * height as usize * samples];
    let frame = reader.next_frame(&mut buf)?;

    let mut pixels = Vec::with_capacity(width as usize * height as usize);
    for row in buf[..frame.line_size * height as usize].chunks(frame.line_size) {
        for px in row[..width as usize * samples].chunks(samples) {
            pixels.push(decode_pixel(layout, px));
        }
    }
    Ok(TargetImage::from_rows(width, height, pixels)?)
}

fn decode_jpeg<R: BufRead + Seek>(reader: R, max_side: u32) -> Result<TargetImage> {
    let decoder = image::codecs::jpeg::JpegDecoder::new(reader)?;
    let (width, height) = decoder.dimensions();
    check_dimensions(width, height, max_side)?;

    let layout = match decoder.color_type() {
        image::ColorType::L8 => Layout::Gray,
        image::ColorType::La8 => Layout::GrayAlpha,
        image::ColorType::Rgb8 => Layout::Rgb,
        image::ColorType::Rgba8 => Layout::Rgba,
        other => bail!("unsupported jpeg colour type {other:?}"),
    };
    let mut buf = vec![0u8; width as usize * height as usize * layout.samples()];
    decoder.read_image(&mut buf)?;

    let pixels = buf
        .chunks(layout.samples())
        .map(|px| decode_pixel(layout, px))
        .collect();
    Ok(TargetImage::from_rows(width, height, pixels)?)
}

fn decode_pixel(layout: Layout, px: &[u8]) -> Rgb {
    let (r, g, b, a) = match layout {
        Layout::Gray => (px[0], px[0], px[0], 255),
        Layout::GrayAlpha => (px[0], px[0], px[0], px[1]),
        Layout::Rgb => (px[0], px[1], px[2], 255),
        Layout::Rgba => (px[0], px[1], px[2], px[3]),
    };
    Rgb::from_channels(premultiply(r, a), premultiply(g, a), premultiply(b, a))
}

fn premultiply(channel: u8, alpha: u8) -> u8 {
    ((channel as u16 * alpha as u16) / 255) as u8
}

/// Writes the board snapshot as an RGB PNG.
pub fn save_canvas_png(path: &Path, canvas: &Canvas) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), canvas.width(), canvas.height());
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&canvas.to_rgb_bytes())?;
    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use pbd_core::DrawerError;
    use std::fs;

    fn size_error(err: &anyhow::Error) -> Option<&DrawerError> {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<DrawerError>())
    }

    fn write_jpeg(path: &Path, width: u32, height: u32, rgb: [u8; 3]) {
        let bytes: Vec<u8> = (0..width * height).flat_map(|_| rgb).collect();
        let file = File::create(path).expect("create");
        JpegEncoder::new_with_quality(BufWriter::new(file), 100)
            .encode(&bytes, width, height, image::ExtendedColorType::Rgb8)
            .expect("encode jpeg");
    }

    #[test]
    fn saved_board_decodes_as_target() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("board.png");
        let mut canvas = Canvas::filled(3, 2, Rgb::BLACK);
        canvas.set(0, 0, Rgb::new(0xFF0000));
        canvas.set(2, 1, Rgb::WHITE);

        save_canvas_png(&path, &canvas).expect("save");
        let image = load_image(&path, 200).expect("load");
        assert_eq!((image.width(), image.height()), (3, 2));
        assert_eq!(image.pixel(0, 0), Some(Rgb::new(0xFF0000)));
        assert_eq!(image.pixel(2, 1), Some(Rgb::WHITE));
        assert_eq!(image.expected(2, 1), Some(Rgb::PLACEHOLDER));
        assert_eq!(image.pixel(1, 0), Some(Rgb::BLACK));
    }

    #[test]
    fn jpeg_is_detected_and_decoded() {
        let dir = tempfile::tempdir().expect("temp dir");
        // extension says png; the bytes decide
        let path = dir.path().join("photo.png");
        write_jpeg(&path, 16, 8, [200, 40, 40]);

        let image = load_image(&path, 200).expect("load");
        assert_eq!((image.width(), image.height()), (16, 8));
        let (r, g, b) = image.pixel(5, 3).expect("pixel").channels();
        assert!(r.abs_diff(200) <= 8, "red {r}");
        assert!(g.abs_diff(40) <= 8, "green {g}");
        assert!(b.abs_diff(40) <= 8, "blue {b}");
    }

    #[test]
    fn oversized_png_is_rejected_from_its_header() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("huge.png");
        save_canvas_png(&path, &Canvas::filled(300, 300, Rgb::BLACK)).expect("save");
        // cut the pixel data short: only the header is left intact
        let bytes = fs::read(&path).expect("read");
        fs::write(&path, &bytes[..bytes.len() - 16]).expect("truncate");

        let err = load_image(&path, 200).expect_err("too large");
        assert_eq!(
            size_error(&err),
            Some(&DrawerError::SizeLimitExceeded {
                width: 300,
                height: 300,
                max: 200
            })
        );
    }

    #[test]
    fn oversized_jpeg_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("huge.jpg");
        write_jpeg(&path, 250, 10, [0, 0, 0]);

        let err = load_image(&path, 200).expect_err("too large");
        assert!(matches!(
            size_error(&err),
            Some(DrawerError::SizeLimitExceeded { width: 250, height: 10, .. })
        ));
    }

    #[test]
    fn unknown_format_and_missing_file_are_errors() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("notes.png");
        fs::write(&path, "not an image").expect("write");
        assert!(load_image(&path, 200).is_err());
        assert!(load_image(&dir.path().join("nope.png"), 200).is_err());
    }

    #[test]
    fn alpha_is_premultiplied() {
        assert_eq!(premultiply(200, 255), 200);
        assert_eq!(premultiply(200, 0), 0);
        assert_eq!(decode_pixel(Layout::Rgba, &[255, 255, 255, 0]), Rgb::BLACK);
        assert_eq!(decode_pixel(Layout::GrayAlpha, &[255, 255]), Rgb::WHITE);
    }
}
