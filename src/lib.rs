//! Waygraph: routing graph construction for OpenStreetMap-derived map data.
//!
//! Pipeline:
//! - Restrictions: scan `rawrels.dat` for turn restriction relations
//! - Junctions: find node ids shared by two or more routable ways
//! - Endpoints: record which ways touch each junction
//! - Builder: expand junctions into route nodes and stream `route.dat`
//!
//! The input files (`ways.dat`, `way.idx`, `rawrels.dat`) are produced by
//! the upstream import stages; the output `route.dat` is a directed,
//! attributed graph the route search reads with random access. Junctions
//! are processed in bounded blocks so memory stays proportional to the
//! block size, not the map size.

pub mod builder;
pub mod formats;
pub mod geo;
pub mod index;
pub mod io;
pub mod junctions;
pub mod progress;
pub mod restrictions;
pub mod types;

pub use builder::{build_route_data, BuildParameters, BuildSummary, ROUTE_FILE, TYPES_FILE};
pub use formats::{RawRelation, RouteNode, Way};
pub use geo::GeoCoord;
pub use progress::{ConsoleProgress, Progress, SilentProgress};
pub use types::{TypeConfig, TypeId, TYPE_IGNORE};
