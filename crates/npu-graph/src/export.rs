// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Export container formats.
//!
//! Every size field is a little-endian `u32` written immediately before
//! its payload.
//!
//! With weights, one init stage:
//!
//! ```text
//! [descSize][desc][weightsSize][weights][mainSize][main][initSize][init]
//! ```
//!
//! With weights, several init stages:
//!
//! ```text
//! [descSize][desc][weightsSize][weights][mainSize][main]
//! [initCount][':'] ([initSize][init]) x initCount
//! ```
//!
//! The `':'` byte after the init count is kept for compatibility with
//! containers written by earlier runtimes; the reader insists on it.

use crate::{GraphError, GraphResult};
use npu_common::Model;
use std::io::{self, Read, Write};

/// Separator written between the init count and the first init blob.
pub const SPLIT_INIT_DELIMITER: u8 = b':';

const SIZE_FIELD: usize = std::mem::size_of::<u32>();

/// Rolling hash of a blob, logged next to exports to spot corruption.
///
/// `h = (h << 7) + h + byte` over every byte, seeded with `1171117`, all in
/// wrapping `u32` arithmetic.
pub fn blob_hash(bytes: &[u8]) -> u32 {
    bytes.iter().fold(1_171_117u32, |h, &b| {
        (h << 7).wrapping_add(h).wrapping_add(u32::from(b))
    })
}

fn size_field(len: usize) -> io::Result<[u8; SIZE_FIELD]> {
    u32::try_from(len)
        .map(u32::to_le_bytes)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "segment exceeds u32 size field"))
}

/// Writes `[len: u32][bytes]` and returns the number of bytes written.
pub fn write_segment<W: Write>(writer: &mut W, bytes: &[u8]) -> io::Result<usize> {
    writer.write_all(&size_field(bytes.len())?)?;
    writer.write_all(bytes)?;
    Ok(SIZE_FIELD + bytes.len())
}

/// Writes the single-init layout.
pub fn write_with_weights<W: Write>(
    writer: &mut W,
    description: &[u8],
    weights: &[u8],
    main_blob: &[u8],
    init_blob: &[u8],
) -> io::Result<usize> {
    let mut written = write_segment(writer, description)?;
    written += write_segment(writer, weights)?;
    written += write_segment(writer, main_blob)?;
    written += write_segment(writer, init_blob)?;
    writer.flush()?;
    Ok(written)
}

/// Writes the multi-init layout.
pub fn write_split_init<W: Write>(
    writer: &mut W,
    description: &[u8],
    weights: &[u8],
    main_blob: &[u8],
    init_blobs: &[&[u8]],
) -> io::Result<usize> {
    let mut written = write_segment(writer, description)?;
    written += write_segment(writer, weights)?;
    written += write_segment(writer, main_blob)?;
    writer.write_all(&size_field(init_blobs.len())?)?;
    writer.write_all(&[SPLIT_INIT_DELIMITER])?;
    written += SIZE_FIELD + 1;
    for blob in init_blobs {
        written += write_segment(writer, blob)?;
    }
    writer.flush()?;
    Ok(written)
}

/// A container read back from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportContainer {
    /// Serialised init model description.
    pub model_description: Vec<u8>,
    /// Serialised init model weights.
    pub model_weights: Vec<u8>,
    pub main_blob: Vec<u8>,
    /// Init blobs in stage order.
    pub init_blobs: Vec<Vec<u8>>,
}

impl ExportContainer {
    /// Reads the single-init layout.
    pub fn read_with_weights<R: Read>(reader: &mut R) -> GraphResult<Self> {
        let model_description = read_segment(reader, "model description")?;
        let model_weights = read_segment(reader, "model weights")?;
        let main_blob = read_segment(reader, "main blob")?;
        let init_blob = read_segment(reader, "init blob")?;
        expect_end(reader)?;
        Ok(Self {
            model_description,
            model_weights,
            main_blob,
            init_blobs: vec![init_blob],
        })
    }

    /// Reads the multi-init layout.
    pub fn read_split_init<R: Read>(reader: &mut R) -> GraphResult<Self> {
        let model_description = read_segment(reader, "model description")?;
        let model_weights = read_segment(reader, "model weights")?;
        let main_blob = read_segment(reader, "main blob")?;
        let count = read_u32(reader, "init count")? as usize;

        let mut delimiter = [0u8; 1];
        read_exact(reader, &mut delimiter, "delimiter")?;
        if delimiter[0] != SPLIT_INIT_DELIMITER {
            return Err(GraphError::Container(format!(
                "expected delimiter {:?} after init count, found {:#04x}",
                SPLIT_INIT_DELIMITER as char, delimiter[0]
            )));
        }

        let mut init_blobs = Vec::with_capacity(count.min(64));
        for index in 0..count {
            init_blobs.push(read_segment(reader, &format!("init blob {index}"))?);
        }
        expect_end(reader)?;
        Ok(Self {
            model_description,
            model_weights,
            main_blob,
            init_blobs,
        })
    }

    /// Rebuilds the init model carried by the container.
    pub fn init_model(&self) -> GraphResult<Model> {
        Ok(Model::deserialize(
            &self.model_description,
            &self.model_weights,
        )?)
    }
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> GraphResult<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            GraphError::Container(format!("stream ended inside {what}"))
        }
        _ => GraphError::Io(e),
    })
}

fn read_u32<R: Read>(reader: &mut R, what: &str) -> GraphResult<u32> {
    let mut bytes = [0u8; SIZE_FIELD];
    read_exact(reader, &mut bytes, what)?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_segment<R: Read>(reader: &mut R, what: &str) -> GraphResult<Vec<u8>> {
    let len = read_u32(reader, &format!("{what} size"))? as usize;
    let mut payload = Vec::new();
    let read = Read::take(&mut *reader, len as u64)
        .read_to_end(&mut payload)
        .map_err(GraphError::Io)?;
    if read != len {
        return Err(GraphError::Container(format!(
            "{what} declares {len} bytes, only {read} present"
        )));
    }
    Ok(payload)
}

fn expect_end<R: Read>(reader: &mut R) -> GraphResult<()> {
    let mut probe = [0u8; 1];
    match reader.read(&mut probe)? {
        0 => Ok(()),
        _ => Err(GraphError::Container("trailing bytes after last segment".into())),
    }
}
