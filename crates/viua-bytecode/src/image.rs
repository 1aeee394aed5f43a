//! On-disk bytecode image format
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! [u32 jump_count, u32 jump_offset * jump_count]   libraries only
//! u16 block_table_size
//! (cstring name, u16 offset)*                      block address table
//! u16 function_table_size
//! (cstring name, u16 offset)*                      function address table
//! u16 code_size
//! u8[code_size]                                    bytecode
//! ```
//!
//! The jump table lists byte positions inside the code whose 4-byte
//! contents must be rewritten when the module is concatenated into a
//! host image at a non-zero offset.

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use std::path::Path;
use thiserror::Error;

/// Image loading/decoding errors
#[derive(Debug, Error)]
pub enum ImageError {
    /// File could not be read or written
    #[error("could not access image file: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed image contents
    #[error("malformed image: {0}")]
    Decode(#[from] DecodeError),

    /// Table declared more bytes than its entries occupy
    #[error("address table size mismatch: declared {declared}, consumed {consumed}")]
    TableSizeMismatch { declared: usize, consumed: usize },
}

/// Whether an image carries a relocation jump table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// A complete program: no jump table, expects an `__entry` function
    Executable,
    /// A linkable module: jump table first
    Library,
}

/// A loaded or assembled bytecode image
#[derive(Debug, Clone, Default)]
pub struct Image {
    /// Byte positions of jump fields to relocate at link time
    pub jump_table: Vec<u32>,
    /// Block names with their code offsets, in image order
    pub blocks: Vec<(String, u16)>,
    /// Function names with their code offsets, in image order
    pub functions: Vec<(String, u16)>,
    /// Raw bytecode
    pub code: Vec<u8>,
}

impl Image {
    /// Load an executable image (no jump table) from a file
    pub fn load_executable<P: AsRef<Path>>(path: P) -> Result<Self, ImageError> {
        let data = std::fs::read(path)?;
        Self::decode(&data, ImageKind::Executable)
    }

    /// Load a library image (jump table first) from a file
    pub fn load_library<P: AsRef<Path>>(path: P) -> Result<Self, ImageError> {
        let data = std::fs::read(path)?;
        Self::decode(&data, ImageKind::Library)
    }

    /// Write this image to a file
    pub fn write<P: AsRef<Path>>(&self, path: P, kind: ImageKind) -> Result<(), ImageError> {
        std::fs::write(path, self.encode(kind))?;
        Ok(())
    }

    /// Decode an image from raw bytes
    pub fn decode(data: &[u8], kind: ImageKind) -> Result<Self, ImageError> {
        let mut reader = BytecodeReader::new(data);

        let mut jump_table = Vec::new();
        if kind == ImageKind::Library {
            let count = reader.read_u32()? as usize;
            jump_table.reserve(count);
            for _ in 0..count {
                jump_table.push(reader.read_u32()?);
            }
        }

        let blocks = Self::decode_table(&mut reader)?;
        let functions = Self::decode_table(&mut reader)?;

        let code_size = reader.read_u16()? as usize;
        let code = reader.read_bytes(code_size)?;

        Ok(Self {
            jump_table,
            blocks,
            functions,
            code,
        })
    }

    fn decode_table(reader: &mut BytecodeReader) -> Result<Vec<(String, u16)>, ImageError> {
        let declared = reader.read_u16()? as usize;
        let start = reader.position();
        let mut entries = Vec::new();
        while reader.position() - start < declared {
            let name = reader.read_cstr()?;
            let offset = reader.read_u16()?;
            entries.push((name, offset));
        }
        let consumed = reader.position() - start;
        if consumed != declared {
            return Err(ImageError::TableSizeMismatch { declared, consumed });
        }
        Ok(entries)
    }

    /// Encode this image to raw bytes
    pub fn encode(&self, kind: ImageKind) -> Vec<u8> {
        let mut writer = BytecodeWriter::with_capacity(self.code.len() + 64);

        if kind == ImageKind::Library {
            writer.emit_u32(self.jump_table.len() as u32);
            for &jump in &self.jump_table {
                writer.emit_u32(jump);
            }
        }

        Self::encode_table(&mut writer, &self.blocks);
        Self::encode_table(&mut writer, &self.functions);

        writer.emit_u16(self.code.len() as u16);
        writer.emit_bytes(&self.code);

        writer.into_bytes()
    }

    fn encode_table(writer: &mut BytecodeWriter, entries: &[(String, u16)]) {
        let size: usize = entries.iter().map(|(name, _)| name.len() + 1 + 2).sum();
        writer.emit_u16(size as u16);
        for (name, offset) in entries {
            writer.emit_str(name);
            writer.emit_u16(*offset);
        }
    }

    /// Function names in image order
    pub fn function_names(&self) -> Vec<&str> {
        self.functions.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Block names in image order
    pub fn block_names(&self) -> Vec<&str> {
        self.blocks.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Code offset of a function, if present
    pub fn function_address(&self, name: &str) -> Option<u16> {
        self.functions
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, offset)| *offset)
    }

    /// Code offset of a block, if present
    pub fn block_address(&self, name: &str) -> Option<u16> {
        self.blocks
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, offset)| *offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_image() -> Image {
        Image {
            jump_table: vec![4, 19],
            blocks: vec![("handler".to_string(), 0)],
            functions: vec![("main".to_string(), 7), ("helper".to_string(), 30)],
            code: vec![1, 2, 3, 4, 5],
        }
    }

    #[test]
    fn test_executable_roundtrip() {
        let image = sample_image();
        let bytes = image.encode(ImageKind::Executable);
        let decoded = Image::decode(&bytes, ImageKind::Executable).unwrap();

        assert!(decoded.jump_table.is_empty());
        assert_eq!(decoded.blocks, image.blocks);
        assert_eq!(decoded.functions, image.functions);
        assert_eq!(decoded.code, image.code);
    }

    #[test]
    fn test_library_roundtrip() {
        let image = sample_image();
        let bytes = image.encode(ImageKind::Library);
        let decoded = Image::decode(&bytes, ImageKind::Library).unwrap();

        assert_eq!(decoded.jump_table, vec![4, 19]);
        assert_eq!(decoded.functions, image.functions);
    }

    #[test]
    fn test_address_lookup() {
        let image = sample_image();
        assert_eq!(image.function_address("main"), Some(7));
        assert_eq!(image.function_address("nowhere"), None);
        assert_eq!(image.block_address("handler"), Some(0));
        assert_eq!(image.function_names(), vec!["main", "helper"]);
    }

    #[test]
    fn test_truncated_image() {
        let image = sample_image();
        let mut bytes = image.encode(ImageKind::Executable);
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            Image::decode(&bytes, ImageKind::Executable),
            Err(ImageError::Decode(DecodeError::UnexpectedEnd(_)))
        ));
    }

    #[test]
    fn test_empty_image() {
        let image = Image::default();
        let bytes = image.encode(ImageKind::Executable);
        let decoded = Image::decode(&bytes, ImageKind::Executable).unwrap();
        assert!(decoded.functions.is_empty());
        assert!(decoded.code.is_empty());
    }
}
