//! Route node records as stored in `route.dat`.
//!
//! Record layout:
//!
//!   id           number u64
//!   way_count    number u32
//!   way ids as an ObjectFileRef delta stream (sorted ascending)
//!   path_count   number u32
//!   per path:
//!     id         number u64
//!     way_index  number u32
//!     type       number u16
//!     max_speed  u8
//!     flags      u8
//!     lat        u32   (grid units)
//!     lon        u32
//!     distance   f64   (kilometers)
//!   exclude_count  number u32
//!   per exclude: source_way number u64, target_path number u32

use anyhow::{bail, Result};

use crate::geo::GeoCoord;
use crate::io::{
    FileScanner, FileWriter, ObjectFileRef, ObjectFileRefStreamReader, ObjectFileRefStreamWriter,
    RefType,
};
use crate::types::TypeId;

/// Traffic is allowed onto the path's way.
pub const PATH_HAS_ACCESS: u8 = 1 << 0;

/// A directed edge from a junction to a neighboring junction along one
/// way, with the attributes the route search needs cached inline.
#[derive(Debug, Clone)]
pub struct Path {
    /// Neighbor junction node id.
    pub id: u64,
    /// Index into the enclosing route node's way list.
    pub way_index: u32,
    pub type_id: TypeId,
    pub max_speed: u8,
    pub flags: u8,
    pub coord: GeoCoord,
    /// Spherical distance along the way in kilometers.
    pub distance: f64,
}

/// A forbidden (incoming way, outgoing path) pair at a junction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclude {
    pub source_way: u64,
    pub target_path: u32,
}

#[derive(Debug, Clone, Default)]
pub struct RouteNode {
    /// Junction node id.
    pub id: u64,
    /// Ids of the ways meeting at this junction, strictly ascending.
    pub ways: Vec<u64>,
    pub paths: Vec<Path>,
    pub excludes: Vec<Exclude>,
}

impl RouteNode {
    pub fn write(&self, writer: &mut FileWriter) -> Result<()> {
        writer.write_number_u64(self.id)?;

        writer.write_number_u32(self.ways.len() as u32)?;
        let mut stream = ObjectFileRefStreamWriter::new(writer);
        for &way_id in &self.ways {
            stream.write(&ObjectFileRef::new(way_id, RefType::Way))?;
        }

        writer.write_number_u32(self.paths.len() as u32)?;
        for path in &self.paths {
            if path.way_index as usize >= self.ways.len() {
                bail!(
                    "Route node {}: path way index {} is out of bounds",
                    self.id,
                    path.way_index
                );
            }
            writer.write_number_u64(path.id)?;
            writer.write_number_u32(path.way_index)?;
            writer.write_number_u16(path.type_id)?;
            writer.write_u8(path.max_speed)?;
            writer.write_u8(path.flags)?;
            writer.write_coord(&path.coord)?;
            writer.write_f64(path.distance)?;
        }

        writer.write_number_u32(self.excludes.len() as u32)?;
        for exclude in &self.excludes {
            if exclude.target_path as usize >= self.paths.len() {
                bail!(
                    "Route node {}: exclude path index {} is out of bounds",
                    self.id,
                    exclude.target_path
                );
            }
            writer.write_number_u64(exclude.source_way)?;
            writer.write_number_u32(exclude.target_path)?;
        }
        Ok(())
    }

    pub fn read(scanner: &mut FileScanner) -> Result<RouteNode> {
        let id = scanner.read_number_u64()?;

        let way_count = scanner.read_number_u32()? as usize;
        let mut ways = Vec::with_capacity(way_count);
        let mut stream = ObjectFileRefStreamReader::new(scanner);
        for _ in 0..way_count {
            ways.push(stream.read()?.offset);
        }

        let path_count = scanner.read_number_u32()? as usize;
        let mut paths = Vec::with_capacity(path_count);
        for _ in 0..path_count {
            let path_id = scanner.read_number_u64()?;
            let way_index = scanner.read_number_u32()?;
            let type_id = scanner.read_number_u16()?;
            let max_speed = scanner.read_u8()?;
            let flags = scanner.read_u8()?;
            let coord = scanner.read_coord()?;
            let distance = scanner.read_f64()?;
            paths.push(Path {
                id: path_id,
                way_index,
                type_id,
                max_speed,
                flags,
                coord,
                distance,
            });
        }

        let exclude_count = scanner.read_number_u32()? as usize;
        let mut excludes = Vec::with_capacity(exclude_count);
        for _ in 0..exclude_count {
            let source_way = scanner.read_number_u64()?;
            let target_path = scanner.read_number_u32()?;
            excludes.push(Exclude {
                source_way,
                target_path,
            });
        }

        Ok(RouteNode {
            id,
            ways,
            paths,
            excludes,
        })
    }
}
