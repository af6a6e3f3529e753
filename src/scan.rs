//! Locate FLIR records inside an R-JPEG.
//!
//! FLIR cameras store an "FFF" block split across JPEG APP1
//! segments. The block begins with a small header pointing to
//! a record directory; each directory entry gives the type,
//! offset and length of one record (raw thermal image,
//! embedded visible image, camera parameters, palette, ...).
//! Record positions vary between models and firmware, so
//! nothing here assumes a fixed offset beyond the header.
//!
//! The layouts follow [ExifTool]'s `FLIR.pm`.
//!
//! [ExifTool]: //exiftool.org
use byteordered::Endianness;
use img_parts::jpeg::{markers, Jpeg};
use img_parts::Bytes;
use tracing::debug;

use crate::error::{Error, Result};
use crate::parse::parse_at;

/// Size of the FLIR APP1 chunk header preceding FFF data.
const CHUNK_HEADER_LEN: usize = 8;
const RECORD_ENTRY_LEN: usize = 0x20;

/// Type of an FFF record, from its directory entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    RawData,
    EmbeddedImage,
    CameraInfo,
    Other(u16),
}

impl From<u16> for RecordKind {
    fn from(ty: u16) -> Self {
        match ty {
            0x01 => RecordKind::RawData,
            0x0e => RecordKind::EmbeddedImage,
            0x20 => RecordKind::CameraInfo,
            ty => RecordKind::Other(ty),
        }
    }
}

/// Position of one record inside the FFF block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordLocation {
    pub kind: RecordKind,
    /// Record subtype. For raw data: 1 = BE, 2 = LE, 3 = PNG.
    pub sub_type: u16,
    pub offset: usize,
    pub length: usize,
}

/// The reassembled FFF block and its record directory.
#[derive(Debug)]
pub struct FffBlock {
    data: Vec<u8>,
    records: Vec<RecordLocation>,
}

impl FffBlock {
    /// Scan a complete container buffer.
    ///
    /// Fails with [`Error::NotRJpeg`] if the buffer is not a
    /// JPEG or has no FLIR segment, and with
    /// [`Error::MissingThermalData`] if the directory has no
    /// raw thermal record.
    pub fn scan(bytes: &[u8]) -> Result<Self> {
        let jpeg = Jpeg::from_bytes(Bytes::copy_from_slice(bytes))
            .map_err(|e| Error::NotRJpeg(format!("not a JPEG: {}", e)))?;
        Self::from_jpeg(&jpeg)
    }

    pub fn from_jpeg(jpeg: &Jpeg) -> Result<Self> {
        let data = collect_flir_data(jpeg)?;
        let records = read_record_directory(&data)?;
        debug!(
            fff_len = data.len(),
            records = records.len(),
            "located FLIR records"
        );

        let block = FffBlock { data, records };
        if block.first(RecordKind::RawData).is_none() {
            return Err(Error::MissingThermalData);
        }
        Ok(block)
    }

    /// Record locations in directory order.
    pub fn records(&self) -> &[RecordLocation] {
        &self.records
    }

    /// Location of the first record of the given kind.
    pub fn locate(&self, kind: RecordKind) -> Option<&RecordLocation> {
        self.records.iter().find(|r| r.kind == kind)
    }

    /// Bytes of a record of this block.
    pub fn record(&self, loc: &RecordLocation) -> &[u8] {
        &self.data[loc.offset..loc.offset + loc.length]
    }

    /// Bytes of the first record of the given kind.
    pub fn first(&self, kind: RecordKind) -> Option<&[u8]> {
        self.locate(kind).map(|r| self.record(r))
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Collect FFF data from JPEG APP1 segments.
///
/// Each FLIR APP1 segment is laid out as:
///
/// - 0x0: signature: "FLIR\0"
/// - 0x5: format version
/// - 0x6: chunk number: zero-based idx
/// - 0x7: last chunk number (= total chunks - 1)
/// - 0x8..: data
fn collect_flir_data(image: &Jpeg) -> Result<Vec<u8>> {
    let mut chunks: Vec<Option<Bytes>> = vec![];
    let mut num_copied = 0;
    let mut total_len = 0;

    for segment in image.segments_by_marker(markers::APP1) {
        let contents = segment.contents();
        if contents.len() < CHUNK_HEADER_LEN || &contents[0..5] != b"FLIR\0" {
            continue;
        }

        let current = contents[6] as usize;
        let total = contents[7] as usize + 1;

        match chunks.len() {
            0 => chunks.resize(total, None),
            l if l != total => {
                return Err(Error::CorruptMetadata(format!(
                    "inconsistent count of total FLIR segments: {} != {}",
                    l, total
                )))
            }
            _ => (),
        }
        if current >= chunks.len() {
            return Err(Error::CorruptMetadata(format!(
                "FLIR segment idx out of bounds: {} >= {}",
                current,
                chunks.len()
            )));
        }

        let slot = &mut chunks[current];
        if slot.is_some() {
            return Err(Error::CorruptMetadata(format!(
                "duplicate FLIR segment: idx = {}",
                current
            )));
        }
        let chunk = contents.slice(CHUNK_HEADER_LEN..);
        total_len += chunk.len();
        *slot = Some(chunk);
        num_copied += 1;
    }

    if chunks.is_empty() {
        return Err(Error::NotRJpeg("no FLIR APP1 segment".into()));
    }
    if num_copied != chunks.len() {
        return Err(Error::CorruptMetadata(format!(
            "expected {} FLIR segments, found only {}",
            chunks.len(),
            num_copied
        )));
    }

    let mut data = Vec::with_capacity(total_len);
    for chunk in chunks.into_iter().flatten() {
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

declare_parseable_structs! {
    // # FLIR file header
    // # 0x00 - string[4] file format ID = "FFF\0"
    // # 0x04 - string[16] file creator: seen "\0","MTX IR\0","CAMCTRL\0"
    // # 0x14 - int32u file format version = 100
    // # 0x18 - int32u offset to record directory
    // # 0x1c - int32u number of entries in record directory
    // # 0x20 - int32u next free index ID = 2
    // # 0x24 - int16u swap pattern = 0 (?)
    // # 0x26 - int16u[7] spares
    // # 0x34 - int32u[2] reserved
    // # 0x3c - int32u checksum
    struct FffHeader {
        format => [u8; 4],
        creator => [u8; 16],
        version => u32,
        dir_offset => u32 as usize,
        num_entries => u32 as usize,
        next_free => u32,
        swap_pattern => u16,
        spares => [u16; 7],
        reserved => [u32; 2],
        checksum => u32,
    }

    // # FLIR record entry
    // # 0x00 - int16u record type
    // # 0x02 - int16u record subtype: RawData 1=BE, 2=LE, 3=PNG; 1 for other record types
    // # 0x04 - int32u record version: seen 0x64,0x66,0x67,0x68,0x6f,0x104
    // # 0x08 - int32u index id = 1
    // # 0x0c - int32u record offset from start of FLIR data
    // # 0x10 - int32u record length
    // # 0x14 - int32u parent = 0 (?)
    // # 0x18 - int32u object number = 0 (?)
    // # 0x1c - int32u checksum: 0 for no checksum
    struct RecordDirEntry {
        ty => u16,
        sub_type => u16,
        version => u32,
        id => u32,
        offset => u32 as usize,
        length => u32 as usize,
        parent => u32,
        obj_num => u32,
        checksum => u32,
    }
}

/// Header byte order: the version reads as 1xx in the
/// correct order.
fn header_endianness(data: &[u8]) -> Result<Endianness> {
    let version: u32 = parse_at(data, 0x14, Endianness::Little).map_err(Error::metadata)?;
    Ok(if (100..200).contains(&version) {
        Endianness::Little
    } else {
        Endianness::Big
    })
}

fn read_record_directory(data: &[u8]) -> Result<Vec<RecordLocation>> {
    if data.len() < 4 || &data[0..4] != b"FFF\0" {
        return Err(Error::NotRJpeg(
            "unexpected signature in FLIR segment".into(),
        ));
    }
    let endian = header_endianness(data)?;
    let hdr: FffHeader = parse_at(data, 0, endian).map_err(Error::metadata)?;
    debug!(
        version = hdr.version,
        entries = hdr.num_entries,
        ?endian,
        "FFF header"
    );

    let dir_fits = hdr
        .num_entries
        .checked_mul(RECORD_ENTRY_LEN)
        .and_then(|len| len.checked_add(hdr.dir_offset))
        .map_or(false, |end| end <= data.len());
    if !dir_fits {
        return Err(Error::CorruptMetadata(format!(
            "record directory of {} entries at {:#x} exceeds FLIR data of {} bytes",
            hdr.num_entries,
            hdr.dir_offset,
            data.len()
        )));
    }

    let mut records = Vec::with_capacity(hdr.num_entries);
    for idx in 0..hdr.num_entries {
        let at = hdr.dir_offset + idx * RECORD_ENTRY_LEN;
        let entry: RecordDirEntry = parse_at(data, at, endian)
            .map_err(|e| Error::metadata(e.context(format!("record directory entry {}", idx))))?;
        if entry.ty == 0 {
            continue;
        }

        let in_bounds = entry
            .offset
            .checked_add(entry.length)
            .map_or(false, |end| end <= data.len());
        if !in_bounds {
            return Err(Error::CorruptMetadata(format!(
                "record {} (type {:#x}) at {:#x}+{:#x} exceeds FLIR data of {} bytes",
                idx,
                entry.ty,
                entry.offset,
                entry.length,
                data.len()
            )));
        }

        records.push(RecordLocation {
            kind: entry.ty.into(),
            sub_type: entry.sub_type,
            offset: entry.offset,
            length: entry.length,
        });
    }
    Ok(records)
}
