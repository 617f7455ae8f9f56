//! Object type registry: which way types are routable, and which relation
//! types encode turn restrictions.
//!
//! The registry is produced by the upstream tag-classification stage; this
//! crate only consumes it. Ids are assigned in registration order starting
//! at 1, with 0 reserved as the ignore marker, so a registry persisted with
//! [`TypeConfig::save`] reloads with identical ids.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

use crate::io::{FileScanner, FileWriter};

pub type TypeId = u16;

/// Marker for "no type" / "not of interest".
pub const TYPE_IGNORE: TypeId = 0;

#[derive(Debug, Clone)]
pub struct TypeInfo {
    name: String,
    ignore: bool,
    can_be_route: bool,
}

impl TypeInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ignore(&self) -> bool {
        self.ignore
    }

    pub fn can_be_route(&self) -> bool {
        self.can_be_route
    }
}

#[derive(Debug, Clone)]
pub struct TypeConfig {
    types: Vec<TypeInfo>,
    name_to_type: HashMap<String, TypeId>,
    relation_types: Vec<String>,
    name_to_relation: HashMap<String, TypeId>,
}

impl Default for TypeConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeConfig {
    pub fn new() -> Self {
        TypeConfig {
            // Slot 0 backs TYPE_IGNORE lookups.
            types: vec![TypeInfo {
                name: String::new(),
                ignore: true,
                can_be_route: false,
            }],
            name_to_type: HashMap::new(),
            relation_types: Vec::new(),
            name_to_relation: HashMap::new(),
        }
    }

    pub fn register_type(&mut self, name: &str, ignore: bool, can_be_route: bool) -> TypeId {
        if let Some(&id) = self.name_to_type.get(name) {
            return id;
        }

        let id = self.types.len() as TypeId;
        self.types.push(TypeInfo {
            name: name.to_string(),
            ignore,
            can_be_route,
        });
        self.name_to_type.insert(name.to_string(), id);
        id
    }

    pub fn register_relation_type(&mut self, name: &str) -> TypeId {
        if let Some(&id) = self.name_to_relation.get(name) {
            return id;
        }

        let id = (self.relation_types.len() + 1) as TypeId;
        self.relation_types.push(name.to_string());
        self.name_to_relation.insert(name.to_string(), id);
        id
    }

    /// `TYPE_IGNORE` for names the configuration does not know.
    pub fn type_id(&self, name: &str) -> TypeId {
        self.name_to_type.get(name).copied().unwrap_or(TYPE_IGNORE)
    }

    /// `TYPE_IGNORE` for names the configuration does not know.
    pub fn relation_type_id(&self, name: &str) -> TypeId {
        self.name_to_relation
            .get(name)
            .copied()
            .unwrap_or(TYPE_IGNORE)
    }

    pub fn type_info(&self, id: TypeId) -> &TypeInfo {
        self.types.get(id as usize).unwrap_or(&self.types[0])
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = FileWriter::create(path)?;

        writer.write_u32((self.types.len() - 1) as u32)?;
        for info in &self.types[1..] {
            writer.write_str(&info.name)?;
            writer.write_bool(info.ignore)?;
            writer.write_bool(info.can_be_route)?;
        }

        writer.write_u32(self.relation_types.len() as u32)?;
        for name in &self.relation_types {
            writer.write_str(name)?;
        }

        writer.close()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut scanner = FileScanner::open(path.as_ref(), false)
            .with_context(|| format!("Cannot open '{}'", path.as_ref().display()))?;
        let mut config = TypeConfig::new();

        let type_count = scanner.read_u32()?;
        for _ in 0..type_count {
            let name = scanner.read_str()?;
            let ignore = scanner.read_bool()?;
            let can_be_route = scanner.read_bool()?;
            config.register_type(&name, ignore, can_be_route);
        }

        let relation_count = scanner.read_u32()?;
        for _ in 0..relation_count {
            let name = scanner.read_str()?;
            config.register_relation_type(&name);
        }

        scanner.close()?;
        Ok(config)
    }
}
