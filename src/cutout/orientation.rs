//! EXIF orientation correction
//!
//! Phone photos usually store pixels sideways and record the fix in the
//! `Orientation` tag. Only the plain rotations are honoured; mirrored variants
//! and anything unreadable leave the image as it is.

use std::io::Cursor;

use image::DynamicImage;

/// Counter-clockwise rotation needed to display an image upright
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    None,
    Ccw90,
    Ccw180,
    Ccw270,
}

impl Rotation {
    /// Rotation for an EXIF orientation value
    pub fn from_orientation(tag: u32) -> Self {
        match tag {
            3 => Rotation::Ccw180,
            6 => Rotation::Ccw270,
            8 => Rotation::Ccw90,
            _ => Rotation::None,
        }
    }

    pub fn apply(self, img: DynamicImage) -> DynamicImage {
        // image's rotate90/rotate270 are clockwise
        match self {
            Rotation::None => img,
            Rotation::Ccw90 => img.rotate270(),
            Rotation::Ccw180 => img.rotate180(),
            Rotation::Ccw270 => img.rotate90(),
        }
    }
}

/// Read the primary image's orientation tag from encoded image bytes.
///
/// Missing or malformed metadata is `None`.
pub fn read_orientation(bytes: &[u8]) -> Option<u32> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    field.value.get_uint(0)
}

/// Rotate `img` upright according to the orientation recorded in `source`
pub fn normalize_orientation(source: &[u8], img: DynamicImage) -> DynamicImage {
    match read_orientation(source) {
        Some(tag) => {
            let rotation = Rotation::from_orientation(tag);
            if rotation != Rotation::None {
                tracing::debug!(orientation = tag, ?rotation, "Applying EXIF orientation");
            }
            rotation.apply(img)
        }
        None => img,
    }
}

/// Encode `img` as a JPEG carrying an EXIF Orientation tag
#[cfg(test)]
pub(crate) fn jpeg_with_orientation(img: &DynamicImage, orientation: u16) -> Vec<u8> {
    let mut jpeg = Vec::new();
    DynamicImage::ImageRgb8(img.to_rgb8())
        .write_to(&mut Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
        .unwrap();

    // Big-endian TIFF header and a single IFD0 entry: Orientation, SHORT, count 1
    let mut tiff = vec![b'M', b'M', 0x00, 0x2A, 0x00, 0x00, 0x00, 0x08];
    tiff.extend_from_slice(&[0x00, 0x01]);
    tiff.extend_from_slice(&[0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01]);
    tiff.extend_from_slice(&orientation.to_be_bytes());
    tiff.extend_from_slice(&[0x00, 0x00]);
    tiff.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

    let mut app1 = b"Exif\0\0".to_vec();
    app1.extend_from_slice(&tiff);
    let length = u16::try_from(app1.len() + 2).unwrap();

    // APP1 goes right after SOI
    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(&app1);
    out.extend_from_slice(&jpeg[2..]);
    out
}
