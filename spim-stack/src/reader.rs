//! Stack reader: header + sample data from files or streams.

use byteorder::{ByteOrder, LittleEndian};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use thiserror::Error;

use crate::header::StackHeader;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Not a spectrum stack (magic {0:?})")]
    BadMagic([u8; 8]),
    #[error("Unsupported stack format version {0}")]
    UnsupportedVersion(u32),
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
    #[error("Data truncated: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
    #[error("Sample count mismatch: header declares {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },
}

/// Read `count` little-endian f32 samples.
pub fn read_samples<R: Read>(reader: &mut R, count: usize) -> Result<Vec<f32>, StackError> {
    let expected = count * 4;
    // No pre-allocation: `count` comes from an untrusted header.
    let mut buf = Vec::new();
    reader.take(expected as u64).read_to_end(&mut buf)?;
    if buf.len() != expected {
        return Err(StackError::Truncated {
            expected,
            got: buf.len(),
        });
    }

    let mut data = vec![0f32; count];
    LittleEndian::read_f32_into(&buf, &mut data);
    Ok(data)
}

/// Read a complete stack: header + all samples.
pub fn read_stack<R: Read>(reader: &mut R) -> Result<(StackHeader, Vec<f32>), StackError> {
    let header = StackHeader::read_from(reader)?;
    let data = read_samples(reader, header.sample_count())?;
    Ok((header, data))
}

/// Open and read a stack file.
pub fn read_stack_file(path: &Path) -> Result<(StackHeader, Vec<f32>), StackError> {
    let mut reader = BufReader::new(File::open(path)?);
    read_stack(&mut reader)
}
