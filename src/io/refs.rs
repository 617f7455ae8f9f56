//! Typed references to objects stored in data files.

use anyhow::{bail, Result};

use super::scanner::FileScanner;
use super::writer::FileWriter;
use super::FileOffset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RefType {
    None = 0,
    Node = 1,
    Area = 2,
    Way = 3,
}

impl RefType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(RefType::None),
            1 => Some(RefType::Node),
            2 => Some(RefType::Area),
            3 => Some(RefType::Way),
            _ => None,
        }
    }
}

/// A type tag plus the file offset (or id) of the referenced object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectFileRef {
    pub offset: FileOffset,
    pub ref_type: RefType,
}

impl ObjectFileRef {
    pub fn new(offset: FileOffset, ref_type: RefType) -> Self {
        ObjectFileRef { offset, ref_type }
    }
}

/// Space-efficient writer for an ascending sequence of ObjectFileRefs.
///
/// Each reference is stored as one byte carrying the type tag in the high
/// six bits and the low two delta bits, followed by the remaining delta as
/// a variable-length number. The delta to the previous offset is limited
/// to 62 bits; a descending sequence is a fatal encoding error.
pub struct ObjectFileRefStreamWriter<'a> {
    writer: &'a mut FileWriter,
    last_offset: FileOffset,
}

impl<'a> ObjectFileRefStreamWriter<'a> {
    pub fn new(writer: &'a mut FileWriter) -> Self {
        ObjectFileRefStreamWriter {
            writer,
            last_offset: 0,
        }
    }

    pub fn reset(&mut self) {
        self.last_offset = 0;
    }

    pub fn write(&mut self, reference: &ObjectFileRef) -> Result<()> {
        if reference.offset < self.last_offset {
            bail!(
                "Object reference stream is not sorted: {} after {}",
                reference.offset,
                self.last_offset
            );
        }

        let delta = reference.offset - self.last_offset;
        if delta >> 62 != 0 {
            bail!("Object reference delta {} exceeds 62 bits", delta);
        }

        let tag = ((reference.ref_type as u8) << 2) | (delta & 0x3) as u8;
        self.writer.write_u8(tag)?;
        self.writer.write_number_u64(delta >> 2)?;

        self.last_offset = reference.offset;
        Ok(())
    }
}

/// Counterpart of [`ObjectFileRefStreamWriter`].
pub struct ObjectFileRefStreamReader<'a> {
    scanner: &'a mut FileScanner,
    last_offset: FileOffset,
}

impl<'a> ObjectFileRefStreamReader<'a> {
    pub fn new(scanner: &'a mut FileScanner) -> Self {
        ObjectFileRefStreamReader {
            scanner,
            last_offset: 0,
        }
    }

    pub fn reset(&mut self) {
        self.last_offset = 0;
    }

    pub fn read(&mut self) -> Result<ObjectFileRef> {
        let tag = self.scanner.read_u8()?;
        let ref_type = match RefType::from_u8(tag >> 2) {
            Some(ref_type) => ref_type,
            None => bail!("Invalid object reference type tag {}", tag >> 2),
        };

        let high = self.scanner.read_number_u64()?;
        let delta = (high << 2) | u64::from(tag & 0x3);

        self.last_offset += delta;
        Ok(ObjectFileRef::new(self.last_offset, ref_type))
    }
}
