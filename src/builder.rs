//! The graph builder: turns the junction map into `route.dat`.
//!
//! Junctions are processed in bounded blocks. For each block the union of
//! the touching way ids is resolved through the numeric index, the way
//! records are read once, and every junction in the block is expanded into
//! a route node: outgoing paths per way shape, then exclusion edges from
//! the turn restrictions, then streamed to the output file.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rustc_hash::FxHashMap;

use crate::formats::{Exclude, Path as RoutePath, RouteNode, Way, PATH_HAS_ACCESS};
use crate::geo::spherical_distance_km;
use crate::index::NumericIndex;
use crate::io::{FileScanner, FileWriter};
use crate::junctions::{read_junctions, read_way_endpoints, NodeWayMap};
use crate::progress::Progress;
use crate::restrictions::{read_restriction_relations, Restriction, RestrictionKind};
use crate::types::TypeConfig;

pub const WAYS_FILE: &str = "ways.dat";
pub const WAY_INDEX_FILE: &str = "way.idx";
pub const RAW_RELATIONS_FILE: &str = "rawrels.dat";
pub const ROUTE_FILE: &str = "route.dat";
pub const TYPES_FILE: &str = "types.dat";

/// Knobs supplied by the external driver.
#[derive(Debug, Clone)]
pub struct BuildParameters {
    pub destination_directory: PathBuf,
    pub way_data_memory_mapped: bool,
    pub way_index_memory_mapped: bool,
    /// Decoded index pages kept in memory.
    pub way_index_cache_size: usize,
    /// Junctions expanded per block; bounds the ways held in memory.
    pub route_node_block_size: usize,
}

impl BuildParameters {
    pub fn new<P: AsRef<Path>>(destination_directory: P) -> Self {
        BuildParameters {
            destination_directory: destination_directory.as_ref().to_path_buf(),
            way_data_memory_mapped: false,
            way_index_memory_mapped: false,
            way_index_cache_size: 1000,
            route_node_block_size: 500_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildSummary {
    pub route_nodes: u32,
    pub paths: u64,
    pub excludes: u64,
}

/// Runs the full pipeline: restrictions, junctions, endpoints, and the
/// route node output. On success `route.dat` carries a leading count equal
/// to the number of records that follow; on failure the partially written
/// file is abandoned.
pub fn build_route_data(
    parameter: &BuildParameters,
    progress: &mut dyn Progress,
    type_config: &TypeConfig,
) -> Result<BuildSummary> {
    progress.set_action("Scanning for restriction relations");
    let restrictions = read_restriction_relations(parameter, progress, type_config)?;

    progress.set_action("Scanning for junctions");
    let junctions = read_junctions(parameter, progress, type_config)?;
    progress.info(&format!("{} junctions found", junctions.len()));

    progress.set_action("Collecting ways intersecting junctions");
    let node_way_map = read_way_endpoints(parameter, progress, type_config, &junctions)?;
    drop(junctions);
    progress.info(&format!("{} route nodes collected", node_way_map.len()));

    let index_path = parameter.destination_directory.join(WAY_INDEX_FILE);
    let mut way_index = NumericIndex::open(
        &index_path,
        parameter.way_index_memory_mapped,
        parameter.way_index_cache_size,
    )?;

    progress.set_action("Writing route nodes");

    let ways_path = parameter.destination_directory.join(WAYS_FILE);
    let mut scanner = FileScanner::open(&ways_path, parameter.way_data_memory_mapped)
        .with_context(|| format!("Cannot open '{}'", ways_path.display()))?;

    let route_path = parameter.destination_directory.join(ROUTE_FILE);
    let mut writer = FileWriter::create(&route_path)
        .with_context(|| format!("Cannot create '{}'", route_path.display()))?;

    let result = write_route_nodes(
        parameter,
        progress,
        &restrictions,
        &node_way_map,
        &mut way_index,
        &mut scanner,
        &mut writer,
    );

    match result {
        Ok(summary) => {
            scanner
                .close()
                .with_context(|| format!("Cannot close file '{}'", ways_path.display()))?;
            writer
                .close()
                .with_context(|| format!("Cannot close file '{}'", route_path.display()))?;
            progress.info(&format!(
                "{} route node(s) and {} path(s) written",
                summary.route_nodes, summary.paths
            ));
            Ok(summary)
        }
        Err(error) => {
            scanner.close_failsafe();
            writer.close_failsafe();
            Err(error)
        }
    }
}

fn write_route_nodes(
    parameter: &BuildParameters,
    progress: &mut dyn Progress,
    restrictions: &crate::restrictions::RestrictionMap,
    node_way_map: &NodeWayMap,
    way_index: &mut NumericIndex,
    scanner: &mut FileScanner,
    writer: &mut FileWriter,
) -> Result<BuildSummary> {
    // Placeholder, patched once the real count is known.
    writer.write_u32(0)?;

    let block_size = parameter.route_node_block_size.max(1);
    let mut summary = BuildSummary::default();
    let mut pending = node_way_map.iter();

    loop {
        let block: Vec<(&u64, &Vec<u64>)> = pending.by_ref().take(block_size).collect();
        if block.is_empty() {
            break;
        }

        let mut way_ids: BTreeSet<u64> = BTreeSet::new();
        for (_, touching) in &block {
            way_ids.extend(touching.iter().copied());
        }

        let ways_map = load_ways(scanner, way_index, &way_ids)?;

        for (&node_id, touching) in block {
            let mut route_node = RouteNode {
                id: node_id,
                ..Default::default()
            };

            let mut sorted_ways = touching.clone();
            sorted_ways.sort_unstable();
            sorted_ways.dedup();
            route_node.ways = sorted_ways;

            for position in 0..route_node.ways.len() {
                let way_id = route_node.ways[position];
                let way = match ways_map.get(&way_id) {
                    Some(way) => way,
                    None => {
                        progress.error(&format!(
                            "Error while loading way {} for route node {}",
                            way_id, node_id
                        ));
                        continue;
                    }
                };
                resolve_paths(&mut route_node, position as u32, way, node_way_map, progress);
            }

            if let Some(node_restrictions) = restrictions.get(&node_id) {
                apply_restrictions(&mut route_node, node_restrictions);
            }

            route_node.write(writer)?;
            summary.route_nodes += 1;
            summary.paths += route_node.paths.len() as u64;
            summary.excludes += route_node.excludes.len() as u64;
            progress.set_progress(u64::from(summary.route_nodes), node_way_map.len() as u64);
        }
    }

    writer.set_pos(0)?;
    writer.write_u32(summary.route_nodes)?;
    Ok(summary)
}

/// Reads the way records for `ids` through the index, preserving the
/// scanner's streaming position across the detour.
fn load_ways(
    scanner: &mut FileScanner,
    way_index: &mut NumericIndex,
    ids: &BTreeSet<u64>,
) -> Result<FxHashMap<u64, Way>> {
    let offsets = way_index.get_offsets(ids)?;
    let old_pos = scanner.pos()?;

    let mut ways = FxHashMap::default();
    for offset in offsets {
        scanner.set_pos(offset)?;
        let way = Way::read(scanner)
            .with_context(|| format!("Error while loading way at offset {}", offset))?;
        ways.insert(way.id, way);
    }

    scanner.set_pos(old_pos)?;
    Ok(ways)
}

/// Resolves the outgoing paths a single way contributes at a junction.
///
/// Three shapes: areas walk both directions with wrap-around and never
/// consult the one-way flag; closed rings walk the same but honor one-way
/// for the backward direction; open polylines walk to either end. In every
/// shape the walk stops at the first node that is itself a junction.
fn resolve_paths(
    route_node: &mut RouteNode,
    way_index: u32,
    way: &Way,
    node_way_map: &NodeWayMap,
    progress: &mut dyn Progress,
) {
    let junction = route_node.id;
    let start = match way.nodes.iter().position(|point| point.id == junction) {
        Some(start) => start,
        None => {
            progress.error(&format!(
                "Way {} does not contain route node {}",
                way.id, junction
            ));
            return;
        }
    };

    let wrap = way.is_area() || is_ring(way);
    let forward = walk_to_junction(way, start, 1, wrap, node_way_map);
    let backward = if way.is_area() || !way.is_oneway() {
        walk_to_junction(way, start, -1, wrap, node_way_map)
    } else {
        None
    };

    if let Some((index, distance)) = forward {
        route_node
            .paths
            .push(make_path(way, way_index, index, distance));
    }

    if let Some((index, distance)) = backward {
        // A wrapped walk can reach the node the forward walk already
        // produced; emit it once.
        if forward.map(|(forward_index, _)| forward_index) != Some(index) {
            route_node
                .paths
                .push(make_path(way, way_index, index, distance));
        }
    }
}

fn is_ring(way: &Way) -> bool {
    match (way.nodes.first(), way.nodes.last()) {
        (Some(first), Some(last)) => {
            way.nodes.len() > 1 && first.id != 0 && first.id == last.id
        }
        _ => false,
    }
}

/// Steps from `start` one node at a time (`step` = ±1), accumulating
/// spherical distance, until it reaches a node present in the junction
/// map. Returns `None` when the way ends first, or when a wrapped walk
/// comes back around to `start`.
fn walk_to_junction(
    way: &Way,
    start: usize,
    step: i64,
    wrap: bool,
    node_way_map: &NodeWayMap,
) -> Option<(usize, f64)> {
    let len = way.nodes.len() as i64;
    if len < 2 {
        return None;
    }

    let advance = |index: i64| -> Option<i64> {
        let next = index + step;
        if wrap {
            Some(next.rem_euclid(len))
        } else if next < 0 || next >= len {
            None
        } else {
            Some(next)
        }
    };

    let mut distance = 0.0;
    let mut previous = start as i64;
    let mut current = advance(previous)?;

    loop {
        distance += spherical_distance_km(
            &way.nodes[previous as usize].coord,
            &way.nodes[current as usize].coord,
        );

        if current == start as i64 {
            return None;
        }
        if node_way_map.contains_key(&way.nodes[current as usize].id) {
            return Some((current as usize, distance));
        }

        previous = current;
        current = advance(current)?;
    }
}

fn make_path(way: &Way, way_index: u32, node_index: usize, distance: f64) -> RoutePath {
    let mut flags = 0;
    if way.has_access() {
        flags |= PATH_HAS_ACCESS;
    }

    RoutePath {
        id: way.nodes[node_index].id,
        way_index,
        type_id: way.type_id,
        max_speed: way.max_speed,
        flags,
        coord: way.nodes[node_index].coord,
        distance,
    }
}

/// Converts the junction's restrictions into exclusion edges: for every
/// ordered (source, destination) way pair that may not be turned through,
/// the first path leaving via the destination way is excluded. Pairs whose
/// destination contributed no path produce nothing.
fn apply_restrictions(route_node: &mut RouteNode, restrictions: &[Restriction]) {
    let mut excludes = Vec::new();

    for &source in &route_node.ways {
        for &destination in &route_node.ways {
            if source == destination || can_turn(restrictions, source, destination) {
                continue;
            }

            let target = route_node
                .paths
                .iter()
                .position(|path| route_node.ways[path.way_index as usize] == destination);

            if let Some(target_path) = target {
                excludes.push(Exclude {
                    source_way: source,
                    target_path: target_path as u32,
                });
            }
        }
    }

    route_node.excludes = excludes;
}

/// Whether turning from way `from` onto way `to` is permitted under the
/// junction's restriction list.
///
/// Allow entries turn the list into an allow-list for their source way:
/// once one is seen, everything not explicitly allowed is forbidden.
/// Forbid entries only forbid their own pair. The list is evaluated in
/// stored order, which keeps the original's behavior when somebody mixes
/// allow and forbid for the same source way.
pub fn can_turn(restrictions: &[Restriction], from: u64, to: u64) -> bool {
    let mut default_return = true;

    for restriction in restrictions {
        if restriction.from != from {
            continue;
        }

        match restriction.kind {
            RestrictionKind::Allow => {
                if restriction.to == to {
                    return true;
                }
                default_return = false;
            }
            RestrictionKind::Forbid => {
                if restriction.to == to {
                    return false;
                }
                default_return = true;
            }
        }
    }

    default_return
}
