//! Junction discovery: two streaming passes over the way file.
//!
//! The first pass counts, for every known node id, how many routable way
//! points reference it; ids used at least twice are junctions. The second
//! pass records which ways touch each junction. Both passes keep only
//! per-node aggregates in memory, never the ways themselves.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::builder::{BuildParameters, WAYS_FILE};
use crate::formats::Way;
use crate::io::FileScanner;
use crate::progress::Progress;
use crate::types::{TypeConfig, TYPE_IGNORE};

/// Junction node id to the ids of the ways touching it, in way-file order.
/// The ordered map fixes the emission order of the route nodes.
pub type NodeWayMap = BTreeMap<u64, Vec<u64>>;

pub(crate) fn is_routable(way: &Way, type_config: &TypeConfig) -> bool {
    if way.type_id == TYPE_IGNORE {
        return false;
    }

    let info = type_config.type_info(way.type_id);
    !info.ignore() && info.can_be_route()
}

fn scan_ways<F>(
    parameter: &BuildParameters,
    progress: &mut dyn Progress,
    type_config: &TypeConfig,
    mut visit: F,
) -> Result<()>
where
    F: FnMut(&Way),
{
    let path = parameter.destination_directory.join(WAYS_FILE);
    let mut scanner = FileScanner::open(&path, parameter.way_data_memory_mapped)
        .with_context(|| format!("Cannot open '{}'", path.display()))?;

    let way_count = scanner
        .read_u32()
        .context("Error while reading number of data entries in file")?;

    for index in 1..=way_count {
        progress.set_progress(u64::from(index), u64::from(way_count));

        let way = Way::read(&mut scanner).with_context(|| {
            format!(
                "Error while reading data entry {} of {} in file '{}'",
                index,
                way_count,
                path.display()
            )
        })?;

        if is_routable(&way, type_config) {
            visit(&way);
        }
    }

    scanner
        .close()
        .with_context(|| format!("Cannot close file '{}'", path.display()))
}

/// First pass: the set of node ids referenced by two or more routable way
/// points (counted with multiplicity).
pub fn read_junctions(
    parameter: &BuildParameters,
    progress: &mut dyn Progress,
    type_config: &TypeConfig,
) -> Result<FxHashSet<u64>> {
    let mut node_use: FxHashMap<u64, u32> = FxHashMap::default();

    scan_ways(parameter, progress, type_config, |way| {
        for point in &way.nodes {
            if point.id != 0 {
                *node_use.entry(point.id).or_insert(0) += 1;
            }
        }
    })?;

    Ok(node_use
        .into_iter()
        .filter(|&(_, uses)| uses >= 2)
        .map(|(id, _)| id)
        .collect())
}

/// Second pass: for every junction, the ids of the routable ways that
/// contain it.
pub fn read_way_endpoints(
    parameter: &BuildParameters,
    progress: &mut dyn Progress,
    type_config: &TypeConfig,
    junctions: &FxHashSet<u64>,
) -> Result<NodeWayMap> {
    let mut node_way_map = NodeWayMap::new();

    scan_ways(parameter, progress, type_config, |way| {
        for point in &way.nodes {
            if point.id != 0 && junctions.contains(&point.id) {
                node_way_map.entry(point.id).or_default().push(way.id);
            }
        }
    })?;

    Ok(node_way_map)
}
