//! Decode the embedded raw thermal and visible images.
//!
//! Both live in FFF records with the same small header:
//!
//! - 0x00: int16u byte order marker (2 in record order)
//! - 0x02: int16u image width
//! - 0x04: int16u image height
//! - 0x20..: image payload
//!
//! Raw thermal payloads are either uncompressed 16-bit
//! samples or a codec stream (PNG, TIFF, JPEG) which is
//! handed to the `image` crate.
use byteordered::Endianness;
use image::{DynamicImage, ImageFormat, RgbImage};
use ndarray::Array2;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::parse::{marker_endianness, parse_at};

/// Raw 16-bit sensor values, indexed `(row, col)`.
pub type RawCountImage = Array2<u16>;

/// Embedded visible-light image.
pub type VisibleImage = RgbImage;

const PAYLOAD_OFFSET: usize = 0x20;

/// Raw data directory subtype of PNG payloads.
pub const RAW_SUBTYPE_PNG: u16 = 3;

declare_parseable_struct! {
    struct ImageDims {
        width => u16 as usize,
        height => u16 as usize,
    }
}

/// How a raw thermal payload is stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawEncoding {
    /// Uncompressed 16-bit samples in the record byte order.
    Uncompressed(Endianness),
    /// PNG. FLIR writes little-endian samples into the
    /// big-endian PNG container, so decoded 16-bit values are
    /// byte-swapped.
    Png,
    Tiff,
    Jpeg,
}

impl RawEncoding {
    /// A payload of exactly two bytes per pixel is
    /// uncompressed, whatever its leading bytes look like.
    fn detect(payload: &[u8], pixels: usize, sub_type: u16, endian: Endianness) -> Self {
        if sub_type != RAW_SUBTYPE_PNG && pixels.checked_mul(2) == Some(payload.len()) {
            return RawEncoding::Uncompressed(endian);
        }
        match image::guess_format(payload) {
            Ok(ImageFormat::Png) => RawEncoding::Png,
            Ok(ImageFormat::Tiff) => RawEncoding::Tiff,
            Ok(ImageFormat::Jpeg) => RawEncoding::Jpeg,
            _ => RawEncoding::Uncompressed(endian),
        }
    }
}

fn split_image_record(record: &[u8]) -> Result<(Endianness, usize, usize, &[u8])> {
    let endian = marker_endianness(record)
        .map_err(|e| Error::corrupt_image(format!("image record header: {:#}", e)))?;
    let dims: ImageDims = parse_at(record, 2, endian)
        .map_err(|e| Error::corrupt_image(format!("image record header: {:#}", e)))?;
    let payload = record.get(PAYLOAD_OFFSET..).ok_or_else(|| {
        Error::corrupt_image(format!(
            "image record of {} bytes has no payload",
            record.len()
        ))
    })?;
    Ok((endian, dims.width, dims.height, payload))
}

/// Decode the raw thermal record into a grid of counts.
/// `sub_type` is the record's directory subtype.
pub fn raw_counts_from_record(record: &[u8], sub_type: u16) -> Result<RawCountImage> {
    let (endian, width, height, payload) = split_image_record(record)?;
    if width == 0 || height == 0 {
        return Err(Error::corrupt_image(format!(
            "raw thermal image has zero dimension: {}x{}",
            width, height
        )));
    }

    let encoding = RawEncoding::detect(payload, width * height, sub_type, endian);
    debug!(width, height, ?encoding, "raw thermal record");

    let counts = match encoding {
        RawEncoding::Uncompressed(endian) => uncompressed_counts(payload, width, height, endian)?,
        encoding => {
            let counts = raw_counts_from_codec(payload, encoding)?;
            if counts.dim() != (height, width) {
                return Err(Error::corrupt_image(format!(
                    "decoded raw image is {}x{}, record declares {}x{}",
                    counts.ncols(),
                    counts.nrows(),
                    width,
                    height
                )));
            }
            counts
        }
    };
    Ok(counts)
}

fn uncompressed_counts(
    payload: &[u8],
    width: usize,
    height: usize,
    endian: Endianness,
) -> Result<RawCountImage> {
    let expected = 2 * width * height;
    if payload.len() != expected {
        return Err(Error::corrupt_image(format!(
            "raw data size mismatch: expected {} bytes, found {}",
            expected,
            payload.len()
        )));
    }

    let values = payload
        .chunks_exact(2)
        .map(|b| match endian {
            Endianness::Little => u16::from_le_bytes([b[0], b[1]]),
            Endianness::Big => u16::from_be_bytes([b[0], b[1]]),
        })
        .collect();
    Array2::from_shape_vec((height, width), values)
        .map_err(|e| Error::corrupt_image(format!("raw data shape: {}", e)))
}

/// Decode a codec-compressed raw thermal stream.
pub fn raw_counts_from_codec(payload: &[u8], encoding: RawEncoding) -> Result<RawCountImage> {
    let format = match encoding {
        RawEncoding::Png => ImageFormat::Png,
        RawEncoding::Tiff => ImageFormat::Tiff,
        RawEncoding::Jpeg => ImageFormat::Jpeg,
        RawEncoding::Uncompressed(_) => {
            return Err(Error::corrupt_image(
                "uncompressed raw data has no codec stream",
            ))
        }
    };
    let decoded = image::load_from_memory_with_format(payload, format)
        .map_err(|e| Error::codec("decoding raw thermal image", e))?;
    let swap = encoding == RawEncoding::Png && matches!(decoded, DynamicImage::ImageLuma16(_));
    let counts = counts_from_pixels(decoded)?;
    Ok(if swap {
        counts.mapv(u16::swap_bytes)
    } else {
        counts
    })
}

/// Reassemble 16-bit counts from decoded pixels.
///
/// 16-bit gray is taken as is and 8-bit gray is widened. Two
/// 8-bit planes (gray + alpha) carry the high and low byte
/// of each count respectively.
pub fn counts_from_pixels(decoded: DynamicImage) -> Result<RawCountImage> {
    let (width, height) = (decoded.width() as usize, decoded.height() as usize);
    if width == 0 || height == 0 {
        return Err(Error::corrupt_image("decoded raw thermal image is empty"));
    }

    let values: Vec<u16> = match decoded {
        DynamicImage::ImageLuma16(img) => img.into_raw(),
        DynamicImage::ImageLuma8(img) => img.into_raw().into_iter().map(u16::from).collect(),
        DynamicImage::ImageLumaA8(img) => img
            .into_raw()
            .chunks_exact(2)
            .map(|p| u16::from(p[0]) << 8 | u16::from(p[1]))
            .collect(),
        other => {
            return Err(Error::corrupt_image(format!(
                "unsupported raw thermal pixel layout: {:?}",
                other.color()
            )))
        }
    };
    Array2::from_shape_vec((height, width), values)
        .map_err(|e| Error::corrupt_image(format!("raw data shape: {}", e)))
}

/// Decode the embedded visible record.
pub fn visible_from_record(record: &[u8]) -> Result<VisibleImage> {
    let (_, width, height, payload) = split_image_record(record)?;
    let image = visible_from_bytes(payload)?;
    if width != 0 && height != 0 && image.dimensions() != (width as u32, height as u32) {
        debug!(
            declared = ?(width, height),
            decoded = ?image.dimensions(),
            "visible image size differs from record header"
        );
    }
    Ok(image)
}

pub fn visible_from_bytes(payload: &[u8]) -> Result<VisibleImage> {
    let decoded =
        image::load_from_memory(payload).map_err(|e| Error::codec("decoding visible image", e))?;
    Ok(decoded.to_rgb8())
}

/// Visible image when present and decodable; failures are
/// logged and treated as absent.
pub(crate) fn optional_visible(record: Option<&[u8]>) -> Option<VisibleImage> {
    match visible_from_record(record?) {
        Ok(image) => Some(image),
        Err(e) => {
            warn!("ignoring embedded visible image: {}", e);
            None
        }
    }
}
