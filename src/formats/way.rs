//! Way records as stored in `ways.dat`.
//!
//! Record layout:
//!
//!   id          number u64
//!   type        number u16
//!   flags       u8
//!   max_speed   u8        (km/h, 0 = unknown)
//!   node_count  number u32
//!   min_lat     u32        (grid units, minimum over all points)
//!   min_lon     u32
//!   per point:  lat delta number u32, lon delta number u32
//!   id_count    number u32
//!   if id_count > 0:
//!     min_id    number u64
//!     per known id: point index number u32, id delta number u64
//!
//! Point ids are sparse: id 0 means "no id known" and such points are
//! omitted from the id table on the wire.

use anyhow::{bail, Result};

use crate::geo::GeoCoord;
use crate::io::{FileOffset, FileScanner, FileWriter};
use crate::types::TypeId;

pub const WAY_HAS_ACCESS: u8 = 1 << 0;
pub const WAY_IS_ONEWAY: u8 = 1 << 1;
pub const WAY_IS_AREA: u8 = 1 << 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WayPoint {
    /// Node id, 0 when unknown.
    pub id: u64,
    pub coord: GeoCoord,
}

/// An ordered polyline with routing attributes. Immutable after read.
#[derive(Debug, Clone)]
pub struct Way {
    pub id: u64,
    pub type_id: TypeId,
    pub flags: u8,
    pub max_speed: u8,
    pub nodes: Vec<WayPoint>,
    /// Byte position of this record in the way file it was read from.
    pub file_offset: FileOffset,
}

impl Way {
    pub fn has_access(&self) -> bool {
        self.flags & WAY_HAS_ACCESS != 0
    }

    pub fn is_oneway(&self) -> bool {
        self.flags & WAY_IS_ONEWAY != 0
    }

    pub fn is_area(&self) -> bool {
        self.flags & WAY_IS_AREA != 0
    }

    pub fn max_speed(&self) -> u8 {
        self.max_speed
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn read(scanner: &mut FileScanner) -> Result<Way> {
        let file_offset = scanner.pos()?;

        let id = scanner.read_number_u64()?;
        let type_id = scanner.read_number_u16()?;
        let flags = scanner.read_u8()?;
        let max_speed = scanner.read_u8()?;

        let node_count = scanner.read_number_u32()? as usize;
        let min_lat = scanner.read_u32()?;
        let min_lon = scanner.read_u32()?;

        let mut nodes = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            let lat = scanner.read_number_u32()?;
            let lon = scanner.read_number_u32()?;
            let (lat, lon) = match (min_lat.checked_add(lat), min_lon.checked_add(lon)) {
                (Some(lat), Some(lon)) => (lat, lon),
                _ => bail!("Way {}: coordinate delta overflows the grid", id),
            };
            nodes.push(WayPoint {
                id: 0,
                coord: GeoCoord::decode(lat, lon),
            });
        }

        let id_count = scanner.read_number_u32()?;
        if id_count > 0 {
            let min_id = scanner.read_number_u64()?;
            for _ in 0..id_count {
                let index = scanner.read_number_u32()? as usize;
                let delta = scanner.read_number_u64()?;
                if index >= nodes.len() {
                    bail!(
                        "Way {}: node id index {} is out of bounds ({} points)",
                        id,
                        index,
                        nodes.len()
                    );
                }
                nodes[index].id = min_id + delta;
            }
        }

        Ok(Way {
            id,
            type_id,
            flags,
            max_speed,
            nodes,
            file_offset,
        })
    }

    pub fn write(&self, writer: &mut FileWriter) -> Result<()> {
        if self.nodes.is_empty() {
            bail!("Way {} has no points", self.id);
        }

        writer.write_number_u64(self.id)?;
        writer.write_number_u16(self.type_id)?;
        writer.write_u8(self.flags)?;
        writer.write_u8(self.max_speed)?;

        writer.write_number_u32(self.nodes.len() as u32)?;

        let (mut min_lat, mut min_lon) = self.nodes[0].coord.encode();
        for node in &self.nodes[1..] {
            let (lat, lon) = node.coord.encode();
            min_lat = min_lat.min(lat);
            min_lon = min_lon.min(lon);
        }
        writer.write_u32(min_lat)?;
        writer.write_u32(min_lon)?;

        for node in &self.nodes {
            let (lat, lon) = node.coord.encode();
            writer.write_number_u32(lat - min_lat)?;
            writer.write_number_u32(lon - min_lon)?;
        }

        let known: Vec<(usize, u64)> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.id != 0)
            .map(|(index, node)| (index, node.id))
            .collect();

        writer.write_number_u32(known.len() as u32)?;
        if let Some(min_id) = known.iter().map(|&(_, id)| id).min() {
            writer.write_number_u64(min_id)?;
            for &(index, id) in &known {
                writer.write_number_u32(index as u32)?;
                writer.write_number_u64(id - min_id)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_way() -> Way {
        Way {
            id: 4711,
            type_id: 3,
            flags: WAY_HAS_ACCESS | WAY_IS_ONEWAY,
            max_speed: 50,
            nodes: vec![
                WayPoint {
                    id: 101,
                    coord: GeoCoord::new(52.5200, 13.4050),
                },
                WayPoint {
                    id: 0,
                    coord: GeoCoord::new(52.5204, 13.4061),
                },
                WayPoint {
                    id: 93,
                    coord: GeoCoord::new(52.5209, 13.4070),
                },
            ],
            file_offset: 0,
        }
    }

    #[test]
    fn roundtrip_preserves_sparse_ids_and_grid_coords() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ways.dat");
        let way = sample_way();

        let mut writer = FileWriter::create(&path).unwrap();
        way.write(&mut writer).unwrap();
        writer.close().unwrap();

        let mut scanner = FileScanner::open(&path, false).unwrap();
        let read = Way::read(&mut scanner).unwrap();
        scanner.close().unwrap();

        assert_eq!(read.id, way.id);
        assert_eq!(read.type_id, way.type_id);
        assert!(read.has_access());
        assert!(read.is_oneway());
        assert!(!read.is_area());
        assert_eq!(read.max_speed(), 50);
        assert_eq!(read.file_offset, 0);

        assert_eq!(read.nodes.len(), 3);
        assert_eq!(read.nodes[0].id, 101);
        assert_eq!(read.nodes[1].id, 0);
        assert_eq!(read.nodes[2].id, 93);
        for (decoded, original) in read.nodes.iter().zip(&way.nodes) {
            assert_eq!(decoded.coord.encode(), original.coord.encode());
        }
    }

    #[test]
    fn file_offset_tracks_the_record_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ways.dat");

        let first = sample_way();
        let mut second = sample_way();
        second.id = 4712;

        let mut writer = FileWriter::create(&path).unwrap();
        first.write(&mut writer).unwrap();
        let second_offset = writer.pos().unwrap();
        second.write(&mut writer).unwrap();
        writer.close().unwrap();

        let mut scanner = FileScanner::open(&path, false).unwrap();
        assert_eq!(Way::read(&mut scanner).unwrap().file_offset, 0);
        let read = Way::read(&mut scanner).unwrap();
        assert_eq!(read.file_offset, second_offset);
        assert_eq!(read.id, 4712);
        scanner.close().unwrap();
    }

    #[test]
    fn empty_way_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FileWriter::create(dir.path().join("ways.dat")).unwrap();

        let way = Way {
            id: 1,
            type_id: 1,
            flags: 0,
            max_speed: 0,
            nodes: Vec::new(),
            file_offset: 0,
        };
        assert!(way.write(&mut writer).is_err());
        writer.close_failsafe();
    }
}
