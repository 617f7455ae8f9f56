//! Bit-exact record formats for the pipeline data files.

pub mod relation;
pub mod route_node;
pub mod way;

pub use relation::{Member, MemberKind, RawRelation};
pub use route_node::{Exclude, Path, RouteNode, PATH_HAS_ACCESS};
pub use way::{Way, WayPoint, WAY_HAS_ACCESS, WAY_IS_AREA, WAY_IS_ONEWAY};
