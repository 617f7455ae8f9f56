//! Raw relation records as stored in `rawrels.dat`.
//!
//! Record layout:
//!
//!   id            number u64
//!   type          number u16
//!   member_count  number u32
//!   per member:   kind u8, id number u64, role string

use anyhow::{bail, Result};

use crate::io::{FileScanner, FileWriter};
use crate::types::TypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Node = 0,
    Way = 1,
    Relation = 2,
}

impl MemberKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(MemberKind::Node),
            1 => Some(MemberKind::Way),
            2 => Some(MemberKind::Relation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Member {
    pub kind: MemberKind,
    pub id: u64,
    pub role: String,
}

#[derive(Debug, Clone)]
pub struct RawRelation {
    pub id: u64,
    pub type_id: TypeId,
    pub members: Vec<Member>,
}

impl RawRelation {
    pub fn read(scanner: &mut FileScanner) -> Result<RawRelation> {
        let id = scanner.read_number_u64()?;
        let type_id = scanner.read_number_u16()?;
        let member_count = scanner.read_number_u32()?;

        let mut members = Vec::with_capacity(member_count as usize);
        for _ in 0..member_count {
            let kind_byte = scanner.read_u8()?;
            let kind = match MemberKind::from_u8(kind_byte) {
                Some(kind) => kind,
                None => bail!("Relation {}: invalid member kind {}", id, kind_byte),
            };
            let member_id = scanner.read_number_u64()?;
            let role = scanner.read_str()?;
            members.push(Member {
                kind,
                id: member_id,
                role,
            });
        }

        Ok(RawRelation {
            id,
            type_id,
            members,
        })
    }

    pub fn write(&self, writer: &mut FileWriter) -> Result<()> {
        writer.write_number_u64(self.id)?;
        writer.write_number_u16(self.type_id)?;
        writer.write_number_u32(self.members.len() as u32)?;

        for member in &self.members {
            writer.write_u8(member.kind as u8)?;
            writer.write_number_u64(member.id)?;
            writer.write_str(&member.role)?;
        }
        Ok(())
    }
}
