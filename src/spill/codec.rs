//! # Spill Block Codec
//!
//! On-disk layout of sorted runs. The file is self-describing: a fixed
//! header, the schema, then length-prefixed columnar blocks, each
//! protected by a CRC-32 checksum.
//!
//! ```text
//! File        := FileHeader SchemaEntry* DataBlock*
//! FileHeader  := magic "VXSP" | version u32 | attribute_count u32 | reserved u32
//! SchemaEntry := name_len u16 | name bytes | type_tag u8 | nullable u8
//! DataBlock   := BlockHeader payload
//! BlockHeader := row_count u32 | payload_len u32 | checksum u32 | reserved u32
//! ```
//!
//! Within a block's payload, columns appear in schema order:
//! - nullable columns first store a packed null bitmap
//!   (`ceil(rows / 8)` bytes, LSB-first)
//! - fixed-width columns store one little-endian value per row (null
//!   rows hold zero placeholders)
//! - variable-length columns store a `u32` length then the bytes for
//!   each row (null rows store length 0)
//!
//! All integers are little-endian; headers are zerocopy structs so the
//! reader can parse them straight out of the mapped file.

use crc::{Crc, CRC_32_ISCSI};
use eyre::Result;
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::block::{Block, ColumnSlice, View};
use crate::config::{SPILL_FORMAT_VERSION, SPILL_MAGIC};
use crate::error::ErrorCode;
use crate::types::{Attribute, DataType, Datum, Nullability, TupleSchema};

pub(crate) const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct FileHeader {
    magic: [u8; 4],
    version: U32,
    attribute_count: U32,
    reserved: U32,
}

impl FileHeader {
    pub fn new(attribute_count: u32) -> Self {
        Self {
            magic: SPILL_MAGIC,
            version: U32::new(SPILL_FORMAT_VERSION),
            attribute_count: U32::new(attribute_count),
            reserved: U32::new(0),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.magic != SPILL_MAGIC {
            crate::engine_bail!(ErrorCode::SpillCorruption, "bad spill file magic");
        }
        if self.version() != SPILL_FORMAT_VERSION {
            crate::engine_bail!(
                ErrorCode::SpillCorruption,
                "unsupported spill format version {}",
                self.version()
            );
        }
        Ok(())
    }

    crate::le_u32_getters! {
        version,
        attribute_count,
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct BlockHeader {
    row_count: U32,
    payload_len: U32,
    checksum: U32,
    reserved: U32,
}

impl BlockHeader {
    pub fn new(row_count: u32, payload: &[u8]) -> Self {
        Self {
            row_count: U32::new(row_count),
            payload_len: U32::new(payload.len() as u32),
            checksum: U32::new(CRC32.checksum(payload)),
            reserved: U32::new(0),
        }
    }

    crate::le_u32_getters! {
        row_count,
        payload_len,
        checksum,
    }
}

/// Appends the schema section to `out`.
pub fn encode_schema(schema: &TupleSchema, out: &mut Vec<u8>) {
    for attribute in schema.attributes() {
        let name = attribute.name().as_bytes();
        debug_assert!(name.len() <= u16::MAX as usize);
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(name);
        out.push(attribute.data_type() as u8);
        out.push(attribute.is_nullable() as u8);
    }
}

/// Parses `attribute_count` schema entries; returns the schema and the
/// number of bytes consumed.
pub fn decode_schema(bytes: &[u8], attribute_count: usize) -> Result<(TupleSchema, usize)> {
    let mut offset = 0usize;
    let mut schema = TupleSchema::empty();
    for _ in 0..attribute_count {
        let name_len = read_u16(bytes, &mut offset)? as usize;
        let name = take(bytes, &mut offset, name_len)?;
        let name = std::str::from_utf8(name)
            .map_err(|_| corruption("attribute name is not UTF-8"))?
            .to_string();
        let tag = *take(bytes, &mut offset, 1)?.first().unwrap();
        let data_type =
            DataType::from_tag(tag).ok_or_else(|| corruption("unknown data type tag"))?;
        let nullable = *take(bytes, &mut offset, 1)?.first().unwrap();
        let nullability = if nullable != 0 {
            Nullability::Nullable
        } else {
            Nullability::NotNullable
        };
        schema.add_attribute(Attribute::new(name, data_type, nullability))?;
    }
    Ok((schema, offset))
}

/// Encodes a view's rows as one block payload.
pub fn encode_block_payload(view: &View<'_>, out: &mut Vec<u8>) {
    let rows = view.row_count();
    for column in view.columns() {
        let attribute_nullable = column.nulls().is_some();
        if attribute_nullable {
            let mut byte = 0u8;
            for row in 0..rows {
                if column.is_null(row) {
                    byte |= 1 << (row % 8);
                }
                if row % 8 == 7 {
                    out.push(byte);
                    byte = 0;
                }
            }
            if rows % 8 != 0 {
                out.push(byte);
            }
        }
        match column.values() {
            ColumnSlice::Int32(v) | ColumnSlice::Date(v) => {
                for value in v {
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
            ColumnSlice::UInt32(v) => {
                for value in v {
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
            ColumnSlice::Int64(v) | ColumnSlice::Datetime(v) => {
                for value in v {
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
            ColumnSlice::UInt64(v) => {
                for value in v {
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
            ColumnSlice::Float(v) => {
                for value in v {
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
            ColumnSlice::Double(v) => {
                for value in v {
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
            ColumnSlice::Bool(v) => {
                for value in v {
                    out.push(*value as u8);
                }
            }
            ColumnSlice::String(v) | ColumnSlice::Binary(v) => {
                for (row, value) in v.iter().enumerate() {
                    if column.is_null(row) {
                        out.extend_from_slice(&0u32.to_le_bytes());
                    } else {
                        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
                        out.extend_from_slice(value.as_bytes());
                    }
                }
            }
        }
    }
}

/// Decodes one block payload into `block`, which must be empty and
/// allocated for `rows` rows of the payload's schema.
pub fn decode_block_payload(payload: &[u8], rows: usize, block: &mut Block) -> Result<()> {
    debug_assert_eq!(block.row_count(), 0);
    let schema = block.schema().clone();
    let mut offset = 0usize;
    let mut columns: Vec<Vec<Datum>> = Vec::with_capacity(schema.attribute_count());
    for attribute in schema.attributes() {
        let nulls: Option<Vec<bool>> = if attribute.is_nullable() {
            let bitmap = take(payload, &mut offset, rows.div_ceil(8))?;
            Some(
                (0..rows)
                    .map(|row| bitmap[row / 8] & (1 << (row % 8)) != 0)
                    .collect(),
            )
        } else {
            None
        };
        let is_null = |row: usize| nulls.as_ref().map(|n| n[row]).unwrap_or(false);
        let mut values = Vec::with_capacity(rows);
        macro_rules! decode_fixed {
            ($width:literal, $native:ty, $variant:ident) => {
                for row in 0..rows {
                    let v = <$native>::from_le_bytes(
                        take(payload, &mut offset, $width)?.try_into().unwrap(),
                    );
                    values.push(if is_null(row) {
                        Datum::Null
                    } else {
                        Datum::$variant(v)
                    });
                }
            };
        }
        match attribute.data_type() {
            DataType::Int32 => decode_fixed!(4, i32, Int32),
            DataType::Date => decode_fixed!(4, i32, Date),
            DataType::UInt32 => decode_fixed!(4, u32, UInt32),
            DataType::Int64 => decode_fixed!(8, i64, Int64),
            DataType::Datetime => decode_fixed!(8, i64, Datetime),
            DataType::UInt64 => decode_fixed!(8, u64, UInt64),
            DataType::Float => decode_fixed!(4, f32, Float),
            DataType::Double => decode_fixed!(8, f64, Double),
            DataType::Bool => {
                for row in 0..rows {
                    let v = *take(payload, &mut offset, 1)?.first().unwrap() != 0;
                    values.push(if is_null(row) { Datum::Null } else { Datum::Bool(v) });
                }
            }
            DataType::String | DataType::Binary => {
                for row in 0..rows {
                    let len = read_u32(payload, &mut offset)? as usize;
                    let bytes = take(payload, &mut offset, len)?.to_vec();
                    values.push(if is_null(row) {
                        Datum::Null
                    } else if attribute.data_type() == DataType::Binary {
                        Datum::Binary(bytes)
                    } else {
                        Datum::String(bytes)
                    });
                }
            }
        }
        columns.push(values);
    }
    if offset != payload.len() {
        return Err(corruption("trailing bytes after block payload"));
    }

    let mut row_buffer = Vec::with_capacity(schema.attribute_count());
    for row in 0..rows {
        row_buffer.clear();
        for column in &mut columns {
            row_buffer.push(std::mem::replace(&mut column[row], Datum::Null));
        }
        block.append_datum_row(&row_buffer)?;
    }
    Ok(())
}

fn corruption(message: &str) -> eyre::Report {
    eyre::Report::new(crate::error::EngineError::new(
        ErrorCode::SpillCorruption,
        message.to_string(),
    ))
}

fn take<'a>(bytes: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = offset
        .checked_add(len)
        .ok_or_else(|| corruption("offset overflow"))?;
    if end > bytes.len() {
        return Err(corruption("truncated spill data"));
    }
    let slice = &bytes[*offset..end];
    *offset = end;
    Ok(slice)
}

fn read_u16(bytes: &[u8], offset: &mut usize) -> Result<u16> {
    Ok(u16::from_le_bytes(take(bytes, offset, 2)?.try_into().unwrap()))
}

fn read_u32(bytes: &[u8], offset: &mut usize) -> Result<u32> {
    Ok(u32::from_le_bytes(take(bytes, offset, 4)?.try_into().unwrap()))
}
