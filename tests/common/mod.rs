//! Builders for synthetic FLIR R-JPEGs.
#![allow(dead_code)]

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, ImageBuffer, ImageOutputFormat, Luma};
use img_parts::jpeg::{markers, Jpeg, JpegSegment};
use img_parts::Bytes;

pub const THERMAL_WIDTH: u16 = 8;
pub const THERMAL_HEIGHT: u16 = 6;

/// How the raw thermal record stores its samples.
#[derive(Clone, Copy, Debug)]
pub enum RawPayload {
    LittleEndian,
    BigEndian,
    Png,
    Tiff,
    /// 8-bit gray JPEG; counts must fit in a byte.
    Jpeg,
}

/// Contents of a synthetic R-JPEG.
pub struct Fixture {
    pub raw: Vec<u16>,
    pub payload: RawPayload,
    pub camera_info: Option<Vec<u8>>,
    pub visible: Option<(u32, u32)>,
    pub include_raw: bool,
    pub chunk_size: usize,
}

impl Default for Fixture {
    fn default() -> Self {
        let n = THERMAL_WIDTH as usize * THERMAL_HEIGHT as usize;
        Fixture {
            raw: (0..n).map(|i| 12000 + 97 * i as u16).collect(),
            payload: RawPayload::LittleEndian,
            camera_info: Some(camera_info_record()),
            visible: Some((32, 24)),
            include_raw: true,
            chunk_size: 600,
        }
    }
}

fn put(record: &mut [u8], offset: usize, bytes: &[u8]) {
    record[offset..offset + bytes.len()].copy_from_slice(bytes);
}

/// Little-endian camera-info record with typical values.
pub fn camera_info_record() -> Vec<u8> {
    let mut rec = vec![0u8; 0x384];
    put(&mut rec, 0, &2u16.to_le_bytes());
    for &(offset, val) in &[
        (0x20, 0.95f32),
        (0x24, 1.0),
        (0x28, 293.15),
        (0x2c, 293.15),
        (0x30, 293.15),
        (0x34, 1.0),
        (0x3c, 0.5),
        (0x58, 17096.654),
        (0x5c, 1428.),
        (0x60, 1.),
        (0x70, 0.006569),
        (0x74, 0.01262),
        (0x78, -0.002276),
        (0x7c, -0.00667),
        (0x80, 1.9),
        (0x30c, 0.046),
    ] {
        put(&mut rec, offset, &val.to_le_bytes());
    }
    put(&mut rec, 0x308, &(-7340i32).to_le_bytes());
    put(&mut rec, 0x310, &0u16.to_le_bytes());
    put(&mut rec, 0x312, &65535u16.to_le_bytes());
    put(&mut rec, 0xd4, b"FLIR TEST\0");
    rec
}

pub fn set_f32(record: &mut [u8], offset: usize, val: f32) {
    put(record, offset, &val.to_le_bytes());
}

fn image_record(width: u16, height: u16, payload: &[u8], big_endian: bool) -> Vec<u8> {
    let mut rec = vec![0u8; 0x20];
    let words = [2u16, width, height];
    for (i, w) in words.iter().enumerate() {
        let bytes = if big_endian {
            w.to_be_bytes()
        } else {
            w.to_le_bytes()
        };
        put(&mut rec, 2 * i, &bytes);
    }
    rec.extend_from_slice(payload);
    rec
}

fn encode_jpeg(width: u32, height: u32) -> Vec<u8> {
    let pixels: Vec<u8> = (0..width * height)
        .flat_map(|i| vec![(i % 256) as u8, 128, 255 - (i % 256) as u8])
        .collect();
    let mut out = Vec::new();
    JpegEncoder::new(&mut out)
        .encode(&pixels, width, height, ColorType::Rgb8)
        .expect("encode jpeg");
    out
}

fn encode_tiff16(values: &[u16], width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    tiff::encoder::TiffEncoder::new(&mut out)
        .expect("tiff encoder")
        .write_image::<tiff::encoder::colortype::Gray16>(width, height, values)
        .expect("encode tiff");
    out.into_inner()
}

fn encode_gray_jpeg(values: &[u16], width: u32, height: u32) -> Vec<u8> {
    let gray: Vec<u8> = values.iter().map(|&v| v as u8).collect();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 95)
        .encode(&gray, width, height, ColorType::L8)
        .expect("encode jpeg");
    out
}

fn encode_png16(values: &[u16], width: u32, height: u32) -> Vec<u8> {
    let stored: Vec<u16> = values.iter().map(|v| v.swap_bytes()).collect();
    let img: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_raw(width, height, stored).expect("buffer");
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageLuma16(img)
        .write_to(&mut out, ImageOutputFormat::Png)
        .expect("encode png");
    out.into_inner()
}

/// Big-endian FFF block holding the given records.
pub fn fff_block(records: &[(u16, Vec<u8>)]) -> Vec<u8> {
    let dir_offset = 0x40usize;
    let mut data_offset = dir_offset + 0x20 * records.len();

    let mut data = Vec::new();
    data.extend_from_slice(b"FFF\0");
    data.extend_from_slice(b"CAMCTRL\0\0\0\0\0\0\0\0\0");
    data.extend_from_slice(&100u32.to_be_bytes());
    data.extend_from_slice(&(dir_offset as u32).to_be_bytes());
    data.extend_from_slice(&(records.len() as u32).to_be_bytes());
    data.resize(dir_offset, 0);

    for (ty, rec) in records {
        data.extend_from_slice(&ty.to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&0x64u32.to_be_bytes());
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(&(data_offset as u32).to_be_bytes());
        data.extend_from_slice(&(rec.len() as u32).to_be_bytes());
        data.extend_from_slice(&[0; 12]);
        data_offset += rec.len();
    }
    for (_, rec) in records {
        data.extend_from_slice(rec);
    }
    data
}

/// Wrap FFF data into FLIR APP1 segments of a JPEG.
pub fn wrap_in_jpeg(fff: &[u8], chunk_size: usize) -> Vec<u8> {
    let chunks: Vec<&[u8]> = fff.chunks(chunk_size).collect();
    let last = (chunks.len() - 1) as u8;
    let segments: Vec<JpegSegment> = chunks
        .iter()
        .enumerate()
        .map(|(idx, chunk)| {
            let mut contents = b"FLIR\0\x01".to_vec();
            contents.push(idx as u8);
            contents.push(last);
            contents.extend_from_slice(chunk);
            JpegSegment::new_with_contents(markers::APP1, Bytes::from(contents))
        })
        .collect();

    let mut jpeg = Jpeg::from_bytes(Bytes::from(encode_jpeg(16, 16))).expect("parse jpeg");
    jpeg.segments_mut().splice(0..0, segments);
    jpeg.encoder().bytes().to_vec()
}

impl Fixture {
    pub fn records(&self) -> Vec<(u16, Vec<u8>)> {
        let mut records = vec![];
        if let Some(info) = &self.camera_info {
            records.push((0x20, info.clone()));
        }
        if self.include_raw {
            let (payload, big_endian) = match self.payload {
                RawPayload::LittleEndian => (
                    self.raw.iter().flat_map(|v| v.to_le_bytes()).collect(),
                    false,
                ),
                RawPayload::BigEndian => {
                    (self.raw.iter().flat_map(|v| v.to_be_bytes()).collect(), true)
                }
                RawPayload::Png => (
                    encode_png16(&self.raw, THERMAL_WIDTH as u32, THERMAL_HEIGHT as u32),
                    false,
                ),
                RawPayload::Tiff => (
                    encode_tiff16(&self.raw, THERMAL_WIDTH as u32, THERMAL_HEIGHT as u32),
                    false,
                ),
                RawPayload::Jpeg => (
                    encode_gray_jpeg(&self.raw, THERMAL_WIDTH as u32, THERMAL_HEIGHT as u32),
                    false,
                ),
            };
            records.push((
                0x01,
                image_record(THERMAL_WIDTH, THERMAL_HEIGHT, &payload, big_endian),
            ));
        }
        if let Some((w, h)) = self.visible {
            records.push((0x0e, image_record(w as u16, h as u16, &encode_jpeg(w, h), false)));
        }
        records
    }

    pub fn build(&self) -> Vec<u8> {
        wrap_in_jpeg(&fff_block(&self.records()), self.chunk_size)
    }
}
