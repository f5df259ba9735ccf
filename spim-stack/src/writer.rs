//! Stack writer: header + sample data to files or streams.

use byteorder::{ByteOrder, LittleEndian};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::header::StackHeader;
use crate::reader::StackError;

/// Write samples as little-endian f32.
pub fn write_samples<W: Write>(writer: &mut W, data: &[f32]) -> Result<(), StackError> {
    let mut buf = vec![0u8; data.len() * 4];
    LittleEndian::write_f32_into(data, &mut buf);
    writer.write_all(&buf)?;
    Ok(())
}

/// Write a complete stack. The sample count must match the header.
pub fn write_stack<W: Write>(
    writer: &mut W,
    header: &StackHeader,
    data: &[f32],
) -> Result<(), StackError> {
    if data.len() != header.sample_count() {
        return Err(StackError::LengthMismatch {
            expected: header.sample_count(),
            got: data.len(),
        });
    }
    header.write_to(writer)?;
    write_samples(writer, data)?;
    Ok(())
}

/// Create (or overwrite) a stack file.
pub fn write_stack_file(path: &Path, header: &StackHeader, data: &[f32]) -> Result<(), StackError> {
    let mut out = BufWriter::new(File::create(path)?);
    write_stack(&mut out, header, data)?;
    out.flush()?;
    Ok(())
}
