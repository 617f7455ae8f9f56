//! Sequential binary file reading, mirroring the writer's codecs.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use memmap2::Mmap;

use super::refs::{ObjectFileRef, RefType};
use super::FileOffset;
use crate::geo::GeoCoord;

enum Backend {
    Buffered(BufReader<File>),
    Mapped { map: Mmap, pos: usize },
}

/// Reads typed values from a file at a current position.
///
/// The backing storage is either a buffered file or a memory-mapped view,
/// chosen at open time; both behave identically through this interface.
pub struct FileScanner {
    path: PathBuf,
    backend: Option<Backend>,
}

impl FileScanner {
    pub fn open<P: AsRef<Path>>(path: P, memory_mapped: bool) -> Result<Self> {
        let file = File::open(path.as_ref())
            .with_context(|| format!("Failed to open {}", path.as_ref().display()))?;

        let backend = if memory_mapped {
            // Safety: the mapped files are pipeline artifacts that are not
            // mutated while the build is running.
            let map = unsafe { Mmap::map(&file) }
                .with_context(|| format!("Failed to map {}", path.as_ref().display()))?;
            Backend::Mapped { map, pos: 0 }
        } else {
            Backend::Buffered(BufReader::new(file))
        };

        Ok(FileScanner {
            path: path.as_ref().to_path_buf(),
            backend: Some(backend),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    fn inner(&mut self) -> Result<&mut Backend> {
        match self.backend.as_mut() {
            Some(backend) => Ok(backend),
            None => bail!("{}: file is not open", self.path.display()),
        }
    }

    pub fn pos(&mut self) -> Result<FileOffset> {
        let path = self.path.clone();
        match self.inner()? {
            Backend::Buffered(reader) => reader
                .stream_position()
                .with_context(|| format!("Failed to get position in {}", path.display())),
            Backend::Mapped { pos, .. } => Ok(*pos as FileOffset),
        }
    }

    pub fn set_pos(&mut self, target: FileOffset) -> Result<()> {
        let path = self.path.clone();
        match self.inner()? {
            Backend::Buffered(reader) => {
                reader
                    .seek(SeekFrom::Start(target))
                    .with_context(|| format!("Failed to seek to {} in {}", target, path.display()))?;
            }
            Backend::Mapped { map, pos } => {
                if target > map.len() as u64 {
                    bail!(
                        "{}: seek to {} is past the end of the file ({} bytes)",
                        path.display(),
                        target,
                        map.len()
                    );
                }
                *pos = target as usize;
            }
        }
        Ok(())
    }

    pub fn goto_begin(&mut self) -> Result<()> {
        self.set_pos(0)
    }

    pub fn close(mut self) -> Result<()> {
        if self.backend.take().is_none() {
            bail!("{}: file is not open", self.path.display());
        }
        Ok(())
    }

    pub fn close_failsafe(mut self) {
        self.backend.take();
    }

    pub fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<()> {
        let path = self.path.clone();
        match self.inner()? {
            Backend::Buffered(reader) => reader
                .read_exact(buffer)
                .with_context(|| format!("Failed to read from {}", path.display())),
            Backend::Mapped { map, pos } => {
                let end = *pos + buffer.len();
                if end > map.len() {
                    bail!("{}: unexpected end of file", path.display());
                }
                buffer.copy_from_slice(&map[*pos..end]);
                *pos = end;
                Ok(())
            }
        }
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buffer = [0u8; N];
        self.read_bytes(&mut buffer)?;
        Ok(buffer)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_array::<1>()?[0] != 0)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(i8::from_le_bytes(self.read_array()?))
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    fn read_widened(&mut self, bytes: usize, max: usize) -> Result<u64> {
        if bytes == 0 || bytes > max {
            bail!(
                "{}: invalid truncated width {} (valid: 1..={})",
                self.path.display(),
                bytes,
                max
            );
        }

        let mut raw = [0u8; 8];
        self.read_bytes(&mut raw[..bytes])?;
        Ok(u64::from_le_bytes(raw))
    }

    pub fn read_u16_bytes(&mut self, bytes: usize) -> Result<u16> {
        Ok(self.read_widened(bytes, 2)? as u16)
    }

    pub fn read_u32_bytes(&mut self, bytes: usize) -> Result<u32> {
        Ok(self.read_widened(bytes, 4)? as u32)
    }

    pub fn read_u64_bytes(&mut self, bytes: usize) -> Result<u64> {
        self.read_widened(bytes, 8)
    }

    /// UTF-8 bytes up to (and consuming) the 0 terminator.
    pub fn read_str(&mut self) -> Result<String> {
        let mut bytes = Vec::new();
        loop {
            let byte = self.read_u8()?;
            if byte == 0 {
                break;
            }
            bytes.push(byte);
        }

        // Real-world map data occasionally carries malformed UTF-8.
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn read_number_u64(&mut self) -> Result<u64> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            let payload = u64::from(byte & 0x7f);

            if shift >= 64 || (shift == 63 && payload > 1) {
                bail!("{}: variable-length number overflows 64 bits", self.path.display());
            }

            value |= payload << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    pub fn read_number_u32(&mut self) -> Result<u32> {
        let value = self.read_number_u64()?;
        u32::try_from(value)
            .with_context(|| format!("{}: number {} overflows 32 bits", self.path.display(), value))
    }

    pub fn read_number_u16(&mut self) -> Result<u16> {
        let value = self.read_number_u64()?;
        u16::try_from(value)
            .with_context(|| format!("{}: number {} overflows 16 bits", self.path.display(), value))
    }

    pub fn read_number_i64(&mut self) -> Result<i64> {
        let first = self.read_u8()?;
        let negative = first & 0x80 != 0;
        let mut magnitude = u64::from(first & 0x3f);

        if first & 0x40 != 0 {
            let rest = self.read_number_u64()?;
            if rest.leading_zeros() < 6 {
                bail!("{}: signed number overflows 64 bits", self.path.display());
            }
            magnitude |= rest << 6;
        }

        if negative {
            if magnitude > i64::MAX as u64 + 1 {
                bail!("{}: signed number overflows 64 bits", self.path.display());
            }
            Ok((magnitude as i64).wrapping_neg())
        } else {
            i64::try_from(magnitude).with_context(|| {
                format!("{}: signed number overflows 64 bits", self.path.display())
            })
        }
    }

    pub fn read_number_i32(&mut self) -> Result<i32> {
        let value = self.read_number_i64()?;
        i32::try_from(value)
            .with_context(|| format!("{}: number {} overflows 32 bits", self.path.display(), value))
    }

    pub fn read_number_i16(&mut self) -> Result<i16> {
        let value = self.read_number_i64()?;
        i16::try_from(value)
            .with_context(|| format!("{}: number {} overflows 16 bits", self.path.display(), value))
    }

    pub fn read_file_offset(&mut self) -> Result<FileOffset> {
        self.read_u64()
    }

    pub fn read_file_offset_bytes(&mut self, bytes: usize) -> Result<FileOffset> {
        self.read_widened(bytes, 8)
    }

    /// Decodes the coordinate pair; the invalid sentinel yields
    /// [`GeoCoord::invalid`].
    pub fn read_coord(&mut self) -> Result<GeoCoord> {
        let lat = self.read_u32()?;
        let lon = self.read_u32()?;

        if lat == u32::MAX && lon == u32::MAX {
            return Ok(GeoCoord::invalid());
        }
        Ok(GeoCoord::decode(lat, lon))
    }

    pub fn read_object_file_ref(&mut self) -> Result<ObjectFileRef> {
        let tag = self.read_u8()?;
        let ref_type = RefType::from_u8(tag)
            .with_context(|| format!("{}: invalid object reference type {}", self.path.display(), tag))?;
        let offset = self.read_number_u64()?;
        Ok(ObjectFileRef { offset, ref_type })
    }

    pub fn read_polyline(&mut self) -> Result<Vec<GeoCoord>> {
        let count = self.read_number_u32()? as usize;
        if count == 0 {
            return Ok(Vec::new());
        }

        let min_lat = self.read_u32()?;
        let min_lon = self.read_u32()?;

        let mut nodes = Vec::with_capacity(count);
        for _ in 0..count {
            let lat = self.read_number_u32()?;
            let lon = self.read_number_u32()?;
            match (min_lat.checked_add(lat), min_lon.checked_add(lon)) {
                (Some(lat), Some(lon)) => nodes.push(GeoCoord::decode(lat, lon)),
                _ => bail!("{}: polyline delta overflows the grid", self.path.display()),
            }
        }
        Ok(nodes)
    }
}
