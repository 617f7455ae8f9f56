//! End-to-end tests: write fixture input files into a temporary directory,
//! run the full build, and decode the resulting route.dat.

use std::path::Path;

use waygraph::builder::{
    build_route_data, BuildParameters, BuildSummary, RAW_RELATIONS_FILE, ROUTE_FILE,
    WAYS_FILE, WAY_INDEX_FILE,
};
use waygraph::formats::{
    Member, MemberKind, RawRelation, RouteNode, Way, WayPoint, PATH_HAS_ACCESS, WAY_HAS_ACCESS,
    WAY_IS_AREA, WAY_IS_ONEWAY,
};
use waygraph::geo::{spherical_distance_km, GeoCoord};
use waygraph::index::NumericIndexWriter;
use waygraph::io::{FileScanner, FileWriter};
use waygraph::progress::SilentProgress;
use waygraph::types::TypeConfig;

const ROAD_TYPE: u16 = 1;

fn road_config() -> TypeConfig {
    let mut config = TypeConfig::new();
    config.register_type("highway_residential", false, true);
    for name in [
        "restriction_only_right_turn",
        "restriction_only_left_turn",
        "restriction_only_u_turn",
        "restriction_only_straight_on",
        "restriction_no_right_turn",
        "restriction_no_left_turn",
        "restriction_no_u_turn",
        "restriction_no_straight_on",
    ] {
        config.register_relation_type(name);
    }
    config
}

/// Deterministic position per node id; distinct ids below 100 always get
/// distinct positions.
fn coord_for(node_id: u64) -> GeoCoord {
    GeoCoord::new(
        50.0 + (node_id % 10) as f64 * 0.001,
        8.0 + (node_id / 10) as f64 * 0.001,
    )
}

fn road(id: u64, flags: u8, node_ids: &[u64]) -> Way {
    Way {
        id,
        type_id: ROAD_TYPE,
        flags: flags | WAY_HAS_ACCESS,
        max_speed: 50,
        nodes: node_ids
            .iter()
            .map(|&node_id| WayPoint {
                id: node_id,
                coord: coord_for(node_id),
            })
            .collect(),
        file_offset: 0,
    }
}

fn restriction(id: u64, kind: &str, from: u64, via: u64, to: u64) -> RawRelation {
    let config = road_config();
    RawRelation {
        id,
        type_id: config.relation_type_id(kind),
        members: vec![
            Member {
                kind: MemberKind::Way,
                id: from,
                role: "from".to_string(),
            },
            Member {
                kind: MemberKind::Node,
                id: via,
                role: "via".to_string(),
            },
            Member {
                kind: MemberKind::Way,
                id: to,
                role: "to".to_string(),
            },
        ],
    }
}

/// Writes ways.dat, way.idx and rawrels.dat. Way ids listed in
/// `unindexed` are written to ways.dat but left out of the index.
fn write_fixture(dir: &Path, ways: &[Way], relations: &[RawRelation], unindexed: &[u64]) {
    let mut sorted: Vec<&Way> = ways.iter().collect();
    sorted.sort_by_key(|way| way.id);

    let mut writer = FileWriter::create(dir.join(WAYS_FILE)).unwrap();
    let mut index = NumericIndexWriter::create(dir.join(WAY_INDEX_FILE), 64).unwrap();
    writer.write_u32(sorted.len() as u32).unwrap();
    for way in sorted {
        let offset = writer.pos().unwrap();
        if !unindexed.contains(&way.id) {
            index.push(way.id, offset).unwrap();
        }
        way.write(&mut writer).unwrap();
    }
    writer.close().unwrap();
    index.finish().unwrap();

    let mut writer = FileWriter::create(dir.join(RAW_RELATIONS_FILE)).unwrap();
    writer.write_u32(relations.len() as u32).unwrap();
    for relation in relations {
        relation.write(&mut writer).unwrap();
    }
    writer.close().unwrap();
}

fn run_build(dir: &Path) -> (BuildSummary, SilentProgress) {
    let parameter = BuildParameters::new(dir);
    let mut progress = SilentProgress::new();
    let summary = build_route_data(&parameter, &mut progress, &road_config()).unwrap();
    (summary, progress)
}

/// Decodes all route nodes and checks the header count and that the file
/// holds nothing beyond the counted records.
fn read_route_nodes(dir: &Path) -> Vec<RouteNode> {
    let mut scanner = FileScanner::open(dir.join(ROUTE_FILE), false).unwrap();
    let count = scanner.read_u32().unwrap();
    let nodes: Vec<RouteNode> = (0..count)
        .map(|_| RouteNode::read(&mut scanner).unwrap())
        .collect();
    assert!(scanner.read_u8().is_err(), "trailing bytes after last record");
    nodes
}

fn node<'a>(nodes: &'a [RouteNode], id: u64) -> &'a RouteNode {
    nodes
        .iter()
        .find(|node| node.id == id)
        .unwrap_or_else(|| panic!("no route node {}", id))
}

fn path_target_ids(node: &RouteNode) -> Vec<u64> {
    node.paths.iter().map(|path| path.id).collect()
}

fn path_via<'a>(node: &'a RouteNode, way_id: u64, target: u64) -> &'a waygraph::formats::Path {
    node.paths
        .iter()
        .find(|path| node.ways[path.way_index as usize] == way_id && path.id == target)
        .unwrap_or_else(|| panic!("no path to {} via way {}", target, way_id))
}

#[test]
fn crossroads_of_two_ways() {
    let dir = tempfile::tempdir().unwrap();

    // W10 and W11 cross at node 2; stub ways make the four arms end in
    // junctions so each arm yields a path.
    let ways = vec![
        road(10, 0, &[1, 2, 3]),
        road(11, 0, &[4, 2, 5]),
        road(20, 0, &[1, 81]),
        road(21, 0, &[3, 82]),
        road(22, 0, &[4, 83]),
        road(23, 0, &[5, 84]),
    ];
    write_fixture(dir.path(), &ways, &[], &[]);

    let (summary, progress) = run_build(dir.path());
    assert!(progress.errors.is_empty());
    assert_eq!(summary.route_nodes, 5);

    let nodes = read_route_nodes(dir.path());
    assert_eq!(nodes.len(), 5);

    // Emission order follows ascending junction node id.
    let emitted: Vec<u64> = nodes.iter().map(|node| node.id).collect();
    assert_eq!(emitted, vec![1, 2, 3, 4, 5]);

    let crossing = node(&nodes, 2);
    assert_eq!(crossing.ways, vec![10, 11]);

    // Per way: forward first, then backward.
    assert_eq!(path_target_ids(crossing), vec![3, 1, 5, 4]);
    assert_eq!(
        crossing
            .paths
            .iter()
            .map(|path| path.way_index)
            .collect::<Vec<u32>>(),
        vec![0, 0, 1, 1]
    );

    for path in &crossing.paths {
        assert_eq!(path.type_id, ROAD_TYPE);
        assert_eq!(path.max_speed, 50);
        assert_eq!(path.flags, PATH_HAS_ACCESS);
        assert_eq!(path.coord.encode(), coord_for(path.id).encode());
        assert!(path.distance > 0.0 && path.distance.is_finite());
    }
    assert!(crossing.excludes.is_empty());
}

#[test]
fn open_way_paths_are_symmetric() {
    let dir = tempfile::tempdir().unwrap();

    // Junctions 1 and 3 joined by way 10 through the plain node 2.
    let ways = vec![
        road(10, 0, &[1, 2, 3]),
        road(20, 0, &[1, 81]),
        road(21, 0, &[3, 82]),
    ];
    write_fixture(dir.path(), &ways, &[], &[]);

    run_build(dir.path());
    let nodes = read_route_nodes(dir.path());

    let forth = path_via(node(&nodes, 1), 10, 3);
    let back = path_via(node(&nodes, 3), 10, 1);

    let expected = spherical_distance_km(&coord_for(1), &coord_for(2))
        + spherical_distance_km(&coord_for(2), &coord_for(3));
    assert!((forth.distance - expected).abs() < 1e-9);
    assert!((forth.distance - back.distance).abs() < 1e-9);
}

#[test]
fn oneway_contributes_only_the_forward_direction() {
    let dir = tempfile::tempdir().unwrap();

    // Way 10 runs one-way from junction 1 to junction 2; way 11 is an
    // ordinary two-way street between junctions 2 and 3.
    let ways = vec![
        road(10, WAY_IS_ONEWAY, &[1, 2]),
        road(11, 0, &[2, 3]),
        road(20, 0, &[1, 81]),
        road(21, 0, &[3, 82]),
    ];
    write_fixture(dir.path(), &ways, &[], &[]);

    run_build(dir.path());
    let nodes = read_route_nodes(dir.path());

    // A→B along the one-way exists...
    path_via(node(&nodes, 1), 10, 2);
    // ...B→A does not.
    let at_two = node(&nodes, 2);
    assert!(at_two
        .paths
        .iter()
        .all(|path| at_two.ways[path.way_index as usize] != 10));

    // The two-way neighbor is reachable from both sides.
    path_via(at_two, 11, 3);
    path_via(node(&nodes, 3), 11, 2);
}

#[test]
fn area_walks_both_directions_and_ignores_oneway() {
    let dir = tempfile::tempdir().unwrap();

    // Square area 1-2-3-4 (stored without a closing duplicate) with
    // junctions at 1, 2 and 4. The stray one-way flag must have no effect.
    let ways = vec![
        road(10, WAY_IS_AREA | WAY_IS_ONEWAY, &[1, 2, 3, 4]),
        road(20, 0, &[1, 81]),
        road(21, 0, &[2, 82]),
        road(22, 0, &[4, 83]),
    ];
    write_fixture(dir.path(), &ways, &[], &[]);

    run_build(dir.path());
    let nodes = read_route_nodes(dir.path());

    let corner = node(&nodes, 1);
    let forward = path_via(corner, 10, 2);
    let backward = path_via(corner, 10, 4);

    let to_b = spherical_distance_km(&coord_for(1), &coord_for(2));
    let to_d = spherical_distance_km(&coord_for(1), &coord_for(4));
    assert!((forward.distance - to_b).abs() < 1e-9);
    assert!((backward.distance - to_d).abs() < 1e-9);

    // Forward is emitted before backward.
    assert_eq!(path_target_ids(corner)[0..2], [2, 4]);
}

#[test]
fn oneway_ring_only_walks_forward() {
    let dir = tempfile::tempdir().unwrap();

    // Closed one-way ring 1-2-3-4-1 (closing node duplicated). Node 1 is
    // a junction through its own duplication; a stub makes node 3 one.
    let ways = vec![
        road(10, WAY_IS_ONEWAY, &[1, 2, 3, 4, 1]),
        road(20, 0, &[3, 81]),
    ];
    write_fixture(dir.path(), &ways, &[], &[]);

    run_build(dir.path());
    let nodes = read_route_nodes(dir.path());

    let closure = node(&nodes, 1);
    assert_eq!(closure.ways, vec![10]);
    assert_eq!(path_target_ids(closure), vec![3]);
    let along = path_via(closure, 10, 3);
    let expected = spherical_distance_km(&coord_for(1), &coord_for(2))
        + spherical_distance_km(&coord_for(2), &coord_for(3));
    assert!((along.distance - expected).abs() < 1e-9);

    // From node 3 the ring continues forward through 4 back to 1; the
    // backward walk toward 2 is forbidden by the one-way flag.
    let midway = node(&nodes, 3);
    assert_eq!(path_target_ids(midway), vec![1]);
}

#[test]
fn forbid_restriction_excludes_one_target_path() {
    let dir = tempfile::tempdir().unwrap();

    // Three ways meet at junction 2; turning from way 10 onto way 11 is
    // forbidden, way 12 stays reachable.
    let ways = vec![
        road(10, 0, &[1, 2]),
        road(11, 0, &[2, 3]),
        road(12, 0, &[2, 4]),
        road(20, 0, &[1, 81]),
        road(21, 0, &[3, 82]),
        road(22, 0, &[4, 83]),
    ];
    let relations = vec![
        restriction(900, "restriction_no_left_turn", 10, 2, 11),
        // Missing "to" member: dropped without effect.
        RawRelation {
            id: 901,
            type_id: road_config().relation_type_id("restriction_no_right_turn"),
            members: vec![
                Member {
                    kind: MemberKind::Way,
                    id: 10,
                    role: "from".to_string(),
                },
                Member {
                    kind: MemberKind::Node,
                    id: 2,
                    role: "via".to_string(),
                },
            ],
        },
    ];
    write_fixture(dir.path(), &ways, &relations, &[]);

    let (summary, _) = run_build(dir.path());
    assert_eq!(summary.excludes, 1);

    let nodes = read_route_nodes(dir.path());
    let via = node(&nodes, 2);
    assert_eq!(via.ways, vec![10, 11, 12]);
    assert_eq!(path_target_ids(via), vec![1, 3, 4]);

    assert_eq!(via.excludes.len(), 1);
    let exclude = &via.excludes[0];
    assert_eq!(exclude.source_way, 10);

    let excluded_path = &via.paths[exclude.target_path as usize];
    assert_eq!(via.ways[excluded_path.way_index as usize], 11);
    assert_ne!(via.ways[excluded_path.way_index as usize], exclude.source_way);
}

#[test]
fn allow_restriction_excludes_everything_else() {
    let dir = tempfile::tempdir().unwrap();

    let ways = vec![
        road(10, 0, &[1, 2]),
        road(11, 0, &[2, 3]),
        road(12, 0, &[2, 4]),
        road(20, 0, &[1, 81]),
        road(21, 0, &[3, 82]),
        road(22, 0, &[4, 83]),
    ];
    let relations = vec![restriction(900, "restriction_only_straight_on", 10, 2, 11)];
    write_fixture(dir.path(), &ways, &relations, &[]);

    run_build(dir.path());
    let nodes = read_route_nodes(dir.path());
    let via = node(&nodes, 2);

    // Entering via way 10 only way 11 remains; the path onto way 12 is
    // excluded. The other sources are untouched.
    assert_eq!(via.excludes.len(), 1);
    assert_eq!(via.excludes[0].source_way, 10);
    let excluded_path = &via.paths[via.excludes[0].target_path as usize];
    assert_eq!(via.ways[excluded_path.way_index as usize], 12);
}

#[test]
fn dangling_way_is_reported_and_skipped() {
    let dir = tempfile::tempdir().unwrap();

    // Way 11 exists in ways.dat but is missing from the index, so the
    // block loader cannot resolve it.
    let ways = vec![road(10, 0, &[1, 2]), road(11, 0, &[2, 3])];
    write_fixture(dir.path(), &ways, &[], &[11]);

    let (summary, progress) = run_build(dir.path());
    assert_eq!(summary.route_nodes, 1);
    assert_eq!(progress.errors.len(), 1);
    assert!(progress.errors[0].contains("way 11"));

    let nodes = read_route_nodes(dir.path());
    let junction = node(&nodes, 2);
    assert_eq!(junction.ways, vec![10, 11]);
    // Node 1 and 3 are dead ends, and way 11 could not be loaded: no
    // paths at all, but the node itself is still present.
    assert!(junction.paths.is_empty());
}

#[test]
fn block_size_does_not_change_the_output() {
    let big = tempfile::tempdir().unwrap();
    let small = tempfile::tempdir().unwrap();

    let ways = vec![
        road(10, 0, &[1, 2, 3]),
        road(11, 0, &[4, 2, 5]),
        road(12, WAY_IS_ONEWAY, &[3, 4]),
        road(20, 0, &[1, 81]),
        road(21, 0, &[5, 82]),
    ];
    let relations = vec![restriction(900, "restriction_no_u_turn", 10, 2, 11)];

    for dir in [big.path(), small.path()] {
        write_fixture(dir, &ways, &relations, &[]);
    }

    let mut progress = SilentProgress::new();
    let config = road_config();

    let parameter = BuildParameters::new(big.path());
    build_route_data(&parameter, &mut progress, &config).unwrap();

    let mut parameter = BuildParameters::new(small.path());
    parameter.route_node_block_size = 1;
    parameter.way_index_cache_size = 1;
    build_route_data(&parameter, &mut progress, &config).unwrap();

    let big_bytes = std::fs::read(big.path().join(ROUTE_FILE)).unwrap();
    let small_bytes = std::fs::read(small.path().join(ROUTE_FILE)).unwrap();
    assert_eq!(big_bytes, small_bytes);
}

#[test]
fn header_count_matches_the_records() {
    let dir = tempfile::tempdir().unwrap();

    let ways = vec![
        road(10, 0, &[1, 2, 3]),
        road(11, 0, &[2, 4]),
        road(12, 0, &[3, 4]),
    ];
    write_fixture(dir.path(), &ways, &[], &[]);

    let (summary, _) = run_build(dir.path());
    let nodes = read_route_nodes(dir.path());

    assert_eq!(nodes.len() as u32, summary.route_nodes);

    // Every emitted junction really is shared by two routable ways, and
    // every exclude points at a valid path of a different way.
    for route_node in &nodes {
        assert!(route_node.ways.len() >= 2);
        assert!(route_node.ways.windows(2).all(|pair| pair[0] < pair[1]));
        for path in &route_node.paths {
            assert!((path.way_index as usize) < route_node.ways.len());
        }
        for exclude in &route_node.excludes {
            let excluded = &route_node.paths[exclude.target_path as usize];
            assert_ne!(route_node.ways[excluded.way_index as usize], exclude.source_way);
        }
    }
}
