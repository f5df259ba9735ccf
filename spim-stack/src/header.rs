//! Stack header: geometry plus the calibration of the energy axis.
//!
//! Layout (little endian):
//!
//! | bytes | field                          |
//! |-------|--------------------------------|
//! | 8     | magic `SPIMSTK1`               |
//! | 4     | format version (`u32`)         |
//! | 4×3   | width, height, channels (`u32`)|
//! | 8×2   | energy offset, scale (`f64`)   |
//! | 2 + n | unit, length-prefixed UTF-8    |

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::reader::StackError;

// ─── Constants ──────────────────────────────────────────────────────────────

/// File signature.
pub const MAGIC: &[u8; 8] = b"SPIMSTK1";
/// Current format version.
pub const FORMAT_VERSION: u32 = 1;
/// Upper bound on any single dimension; guards against corrupt headers.
pub const MAX_DIMENSION: u32 = 1 << 16;
/// Upper bound on the total sample count (1 GiB of `f32`).
pub const MAX_SAMPLES: usize = 1 << 28;
/// Upper bound on the unit label length.
pub const MAX_UNIT_LEN: usize = 64;

/// Geometry and calibration of a stored stack.
#[derive(Debug, Clone, PartialEq)]
pub struct StackHeader {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    /// Energy of channel 0.
    pub offset: f64,
    /// Energy step per channel.
    pub scale: f64,
    pub unit: String,
}

impl Default for StackHeader {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            channels: 0,
            offset: 0.0,
            scale: 1.0,
            unit: "eV".to_string(),
        }
    }
}

impl StackHeader {
    pub fn new(width: u32, height: u32, channels: u32) -> Self {
        Self {
            width,
            height,
            channels,
            ..Default::default()
        }
    }

    pub fn with_calibration(mut self, offset: f64, scale: f64, unit: &str) -> Self {
        self.offset = offset;
        self.scale = scale;
        self.unit = unit.to_string();
        self
    }

    /// Number of samples following the header.
    pub fn sample_count(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }

    /// Check dimensions and calibration for sanity.
    pub fn validate(&self) -> Result<(), StackError> {
        for (name, v) in [
            ("width", self.width),
            ("height", self.height),
            ("channels", self.channels),
        ] {
            if v == 0 || v > MAX_DIMENSION {
                return Err(StackError::InvalidHeader(format!(
                    "{} out of range: {}",
                    name, v
                )));
            }
        }
        if self.sample_count() > MAX_SAMPLES {
            return Err(StackError::InvalidHeader(format!(
                "{}x{}x{} stack exceeds {} samples",
                self.width, self.height, self.channels, MAX_SAMPLES
            )));
        }
        if !self.offset.is_finite() || !self.scale.is_finite() {
            return Err(StackError::InvalidHeader(
                "non-finite energy calibration".to_string(),
            ));
        }
        if self.unit.len() > MAX_UNIT_LEN {
            return Err(StackError::InvalidHeader(format!(
                "unit label too long ({} bytes)",
                self.unit.len()
            )));
        }
        Ok(())
    }

    /// Serialize the header.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), StackError> {
        self.validate()?;
        writer.write_all(MAGIC)?;
        writer.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        writer.write_u32::<LittleEndian>(self.width)?;
        writer.write_u32::<LittleEndian>(self.height)?;
        writer.write_u32::<LittleEndian>(self.channels)?;
        writer.write_f64::<LittleEndian>(self.offset)?;
        writer.write_f64::<LittleEndian>(self.scale)?;
        writer.write_u16::<LittleEndian>(self.unit.len() as u16)?;
        writer.write_all(self.unit.as_bytes())?;
        Ok(())
    }

    /// Parse a header, leaving the reader positioned at the first sample.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, StackError> {
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(StackError::BadMagic(magic));
        }
        let version = reader.read_u32::<LittleEndian>()?;
        if version != FORMAT_VERSION {
            return Err(StackError::UnsupportedVersion(version));
        }
        let width = reader.read_u32::<LittleEndian>()?;
        let height = reader.read_u32::<LittleEndian>()?;
        let channels = reader.read_u32::<LittleEndian>()?;
        let offset = reader.read_f64::<LittleEndian>()?;
        let scale = reader.read_f64::<LittleEndian>()?;
        let unit_len = reader.read_u16::<LittleEndian>()? as usize;
        if unit_len > MAX_UNIT_LEN {
            return Err(StackError::InvalidHeader(format!(
                "unit label too long ({} bytes)",
                unit_len
            )));
        }
        let mut unit = vec![0u8; unit_len];
        reader.read_exact(&mut unit)?;
        let unit = String::from_utf8(unit)
            .map_err(|_| StackError::InvalidHeader("unit label is not UTF-8".to_string()))?;

        let header = Self {
            width,
            height,
            channels,
            offset,
            scale,
            unit,
        };
        header.validate()?;
        Ok(header)
    }
}
