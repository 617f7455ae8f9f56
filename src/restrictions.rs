//! Turn restriction loading: one scan over the raw relations, keyed by the
//! via node for the graph builder.

use std::collections::{BTreeMap, HashSet};

use anyhow::{Context, Result};

use crate::builder::{BuildParameters, RAW_RELATIONS_FILE};
use crate::formats::{MemberKind, RawRelation};
use crate::io::FileScanner;
use crate::progress::Progress;
use crate::types::{TypeConfig, TypeId, TYPE_IGNORE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestrictionKind {
    /// Only the (from, to) pair is permitted when entering via `from`.
    Allow,
    /// The (from, to) pair is not permitted.
    Forbid,
}

#[derive(Debug, Clone)]
pub struct Restriction {
    pub kind: RestrictionKind,
    pub from: u64,
    pub to: u64,
}

/// Restrictions grouped by via node id.
pub type RestrictionMap = BTreeMap<u64, Vec<Restriction>>;

const POSITIVE_RESTRICTIONS: [&str; 4] = [
    "restriction_only_right_turn",
    "restriction_only_left_turn",
    "restriction_only_u_turn",
    "restriction_only_straight_on",
];

const NEGATIVE_RESTRICTIONS: [&str; 4] = [
    "restriction_no_right_turn",
    "restriction_no_left_turn",
    "restriction_no_u_turn",
    "restriction_no_straight_on",
];

/// Scans `rawrels.dat` for turn restriction relations.
///
/// A usable restriction has a way member in role `from`, a node member in
/// role `via`, and a way member in role `to`; relations missing any of the
/// three are skipped without complaint, as are relation types the
/// configuration does not know. Real-world relation data is noisy.
pub fn read_restriction_relations(
    parameter: &BuildParameters,
    progress: &mut dyn Progress,
    type_config: &TypeConfig,
) -> Result<RestrictionMap> {
    let mut positive: HashSet<TypeId> = HashSet::new();
    let mut negative: HashSet<TypeId> = HashSet::new();

    for name in POSITIVE_RESTRICTIONS {
        let id = type_config.relation_type_id(name);
        if id != TYPE_IGNORE {
            positive.insert(id);
        }
    }
    for name in NEGATIVE_RESTRICTIONS {
        let id = type_config.relation_type_id(name);
        if id != TYPE_IGNORE {
            negative.insert(id);
        }
    }

    let path = parameter.destination_directory.join(RAW_RELATIONS_FILE);
    let mut scanner = FileScanner::open(&path, false)
        .with_context(|| format!("Cannot open '{}'", path.display()))?;

    let relation_count = scanner
        .read_u32()
        .context("Error while reading number of data entries in file")?;

    let mut restrictions = RestrictionMap::new();

    for index in 1..=relation_count {
        progress.set_progress(u64::from(index), u64::from(relation_count));

        let relation = RawRelation::read(&mut scanner).with_context(|| {
            format!(
                "Error while reading data entry {} of {} in file '{}'",
                index,
                relation_count,
                path.display()
            )
        })?;

        let kind = if positive.contains(&relation.type_id) {
            RestrictionKind::Allow
        } else if negative.contains(&relation.type_id) {
            RestrictionKind::Forbid
        } else {
            continue;
        };

        let mut from = 0u64;
        let mut via = 0u64;
        let mut to = 0u64;

        for member in &relation.members {
            match (member.kind, member.role.as_str()) {
                (MemberKind::Way, "from") => from = member.id,
                (MemberKind::Node, "via") => via = member.id,
                (MemberKind::Way, "to") => to = member.id,
                _ => {}
            }
        }

        if from != 0 && via != 0 && to != 0 {
            restrictions
                .entry(via)
                .or_default()
                .push(Restriction { kind, from, to });
        }
    }

    scanner
        .close()
        .with_context(|| format!("Cannot close file '{}'", path.display()))?;

    progress.info(&format!("Found {} restrictions", restrictions.len()));
    Ok(restrictions)
}
