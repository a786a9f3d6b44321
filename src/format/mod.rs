//! Self-describing tensor file format.
//!
//! Layout, little-endian, one contiguous stream:
//!
//! | field           | type           | notes                                 |
//! |-----------------|----------------|---------------------------------------|
//! | `ndim`          | `u32`          | rank                                  |
//! | `dims[ndim]`    | `u64` each     | stored shape                          |
//! | `precision`     | `u32`          | 0 = INT8, 1 = FP16, 2 = FP32          |
//! | `byte_length`   | `u64`          | payload size in bytes                 |
//! | `scale`         | `f32`          | only when `precision == 0`            |
//! | payload         | `byte_length`  | row-major elements                    |
//!
//! INT8 files also get a [`sidecar`] holding the same scale as text.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use half::f16;

use crate::errors::{PackError, Result};
use crate::tensor::Precision;

pub mod sidecar;

pub use sidecar::{read_scale_sidecar, sidecar_path, write_scale_sidecar, SCALE_EXTENSION};

// ===========================================================================
// Header
// ===========================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TensorHeader {
    pub shape: Vec<usize>,
    pub precision: Precision,
    pub byte_length: u64,
    /// Present exactly when `precision` is INT8.
    pub scale: Option<f32>,
}

impl TensorHeader {
    /// Number of elements, or `None` when the shape product overflows.
    pub fn element_count(&self) -> Option<usize> {
        self.shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }

    /// Payload size implied by shape and precision, or `None` on overflow.
    pub fn expected_byte_length(&self) -> Option<u64> {
        let count = u64::try_from(self.element_count()?).ok()?;
        count.checked_mul(self.precision.element_size() as u64)
    }

    /// Size of the encoded header in bytes.
    pub fn encoded_len(&self) -> usize {
        4 + 8 * self.shape.len() + 4 + 8 + if self.scale.is_some() { 4 } else { 0 }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_all(&(self.shape.len() as u32).to_le_bytes())?;
        for &dim in &self.shape {
            w.write_all(&(dim as u64).to_le_bytes())?;
        }
        w.write_all(&self.precision.code().to_le_bytes())?;
        w.write_all(&self.byte_length.to_le_bytes())?;
        if let Some(scale) = self.scale {
            w.write_all(&scale.to_le_bytes())?;
        }
        Ok(())
    }

    /// Parse a header from `r`. `path` is only used for error context.
    pub fn read_from<R: Read>(r: &mut R, path: &Path) -> Result<Self> {
        let truncated =
            |e: std::io::Error| PackError::malformed(path, format!("truncated header: {e}"));

        let ndim = read_u32(r).map_err(truncated)?;
        let mut shape = Vec::with_capacity(ndim.min(16) as usize);
        for _ in 0..ndim {
            let dim = read_u64(r).map_err(truncated)?;
            let dim = usize::try_from(dim).map_err(|_| {
                PackError::malformed(path, format!("dimension {dim} does not fit in memory"))
            })?;
            shape.push(dim);
        }

        let code = read_u32(r).map_err(truncated)?;
        let precision = Precision::from_code(code)
            .ok_or_else(|| PackError::malformed(path, format!("unknown precision code {code}")))?;

        let byte_length = read_u64(r).map_err(truncated)?;
        let scale = match precision {
            Precision::Int8 => Some(read_f32(r).map_err(truncated)?),
            _ => None,
        };

        Ok(Self {
            shape,
            precision,
            byte_length,
            scale,
        })
    }
}

fn read_u32<R: Read>(r: &mut R) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(r: &mut R) -> std::io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_f32<R: Read>(r: &mut R) -> std::io::Result<f32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

// ===========================================================================
// Writing
// ===========================================================================

/// Element data ready to be written, borrowed from the caller.
///
/// FP16 narrowing happens while the payload is streamed out, so no
/// intermediate half-precision buffer is held.
#[derive(Debug, Clone, Copy)]
pub enum TensorPayload<'a> {
    Int8 { codes: &'a [i8], scale: f32 },
    Float16(&'a [f32]),
    Float32(&'a [f32]),
}

impl TensorPayload<'_> {
    pub fn precision(&self) -> Precision {
        match self {
            TensorPayload::Int8 { .. } => Precision::Int8,
            TensorPayload::Float16(_) => Precision::Float16,
            TensorPayload::Float32(_) => Precision::Float32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorPayload::Int8 { codes, .. } => codes.len(),
            TensorPayload::Float16(v) | TensorPayload::Float32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_length(&self) -> u64 {
        (self.len() * self.precision().element_size()) as u64
    }

    pub fn scale(&self) -> Option<f32> {
        match self {
            TensorPayload::Int8 { scale, .. } => Some(*scale),
            _ => None,
        }
    }

    fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        match self {
            TensorPayload::Int8 { codes, .. } => {
                for &c in codes.iter() {
                    w.write_all(&c.to_le_bytes())?;
                }
            }
            TensorPayload::Float16(values) => {
                for &v in values.iter() {
                    w.write_all(&f16::from_f32(v).to_le_bytes())?;
                }
            }
            TensorPayload::Float32(values) => {
                for &v in values.iter() {
                    w.write_all(&v.to_le_bytes())?;
                }
            }
        }
        Ok(())
    }
}

/// Write header and payload to any sink.
pub fn encode_tensor<W: Write>(
    w: &mut W,
    shape: &[usize],
    payload: &TensorPayload<'_>,
) -> std::io::Result<TensorHeader> {
    let header = TensorHeader {
        shape: shape.to_vec(),
        precision: payload.precision(),
        byte_length: payload.byte_length(),
        scale: payload.scale(),
    };
    header.write_to(w)?;
    payload.write_to(w)?;
    Ok(header)
}

/// Write a tensor file at `path` and, for INT8 payloads, its `.scale`
/// sidecar.
///
/// # Errors
///
/// [`PackError::InvalidTensor`] when the payload length disagrees with
/// `shape`, [`PackError::WriteFailure`] on any I/O error.
pub fn write_tensor_file(
    path: &Path,
    shape: &[usize],
    payload: &TensorPayload<'_>,
) -> Result<TensorHeader> {
    let expected = shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim));
    if expected != Some(payload.len()) {
        return Err(PackError::InvalidTensor {
            reason: format!(
                "payload has {} elements but shape {:?} requires {}",
                payload.len(),
                shape,
                expected.map_or_else(|| "more than usize::MAX".to_string(), |n| n.to_string())
            ),
        });
    }

    let file = File::create(path).map_err(|e| PackError::write_failure(path, e))?;
    let mut writer = BufWriter::new(file);
    let header =
        encode_tensor(&mut writer, shape, payload).map_err(|e| PackError::write_failure(path, e))?;
    writer.flush().map_err(|e| PackError::write_failure(path, e))?;
    drop(writer);

    if let Some(scale) = header.scale {
        if let Err(e) = write_scale_sidecar(path, scale) {
            // An INT8 file is unusable without its sidecar
            let _ = std::fs::remove_file(path);
            return Err(e);
        }
    }

    Ok(header)
}

// ===========================================================================
// Reading
// ===========================================================================

/// Payload decoded back into typed elements.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedPayload {
    Int8(Vec<i8>),
    Float16(Vec<f16>),
    Float32(Vec<f32>),
}

/// A parsed tensor file.
#[derive(Debug, Clone)]
pub struct TensorFile {
    pub header: TensorHeader,
    pub payload: DecodedPayload,
}

impl TensorFile {
    /// Element values as `f32`; INT8 codes are multiplied by the inline scale.
    pub fn to_f32(&self) -> Vec<f32> {
        match &self.payload {
            DecodedPayload::Int8(codes) => {
                let scale = self.header.scale.unwrap_or(1.0);
                codes.iter().map(|&q| q as f32 * scale).collect()
            }
            DecodedPayload::Float16(values) => values.iter().map(|v| v.to_f32()).collect(),
            DecodedPayload::Float32(values) => values.clone(),
        }
    }
}

/// Read only the header of the tensor file at `path`.
pub fn read_header(path: &Path) -> Result<TensorHeader> {
    let mut file = File::open(path).map_err(|e| PackError::read_failure(path, e))?;
    TensorHeader::read_from(&mut file, path)
}

/// Read and validate a whole tensor file.
pub fn read_tensor_file(path: &Path) -> Result<TensorFile> {
    let bytes = std::fs::read(path).map_err(|e| PackError::read_failure(path, e))?;
    decode_tensor(&bytes, path)
}

/// Parse an in-memory tensor file. `path` is only used for error context.
pub fn decode_tensor(bytes: &[u8], path: &Path) -> Result<TensorFile> {
    let mut cursor = bytes;
    let header = TensorHeader::read_from(&mut cursor, path)?;

    let expected = header
        .expected_byte_length()
        .ok_or_else(|| PackError::malformed(path, format!("shape {:?} overflows", header.shape)))?;
    if header.byte_length != expected {
        return Err(PackError::malformed(
            path,
            format!(
                "byte length {} does not match shape {:?} at {} ({} bytes expected)",
                header.byte_length, header.shape, header.precision, expected
            ),
        ));
    }
    if (cursor.len() as u64) != header.byte_length {
        return Err(PackError::malformed(
            path,
            format!("payload is {} bytes, header declares {}", cursor.len(), header.byte_length),
        ));
    }

    let payload = match header.precision {
        Precision::Int8 => DecodedPayload::Int8(cursor.iter().map(|&b| b as i8).collect()),
        Precision::Float16 => DecodedPayload::Float16(
            cursor
                .chunks_exact(2)
                .map(|c| f16::from_le_bytes([c[0], c[1]]))
                .collect(),
        ),
        Precision::Float32 => DecodedPayload::Float32(
            cursor
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
    };

    Ok(TensorFile { header, payload })
}
