//! # Entity Schema Module
//!
//! Declared keyvalue types per entity class. The collapser only needs to know,
//! for each field, what kind of value it holds so it can be moved, rotated or
//! renamed correctly.
//!
//! The built-in database covers the common engine entities and is embedded in
//! the binary. A game-specific file in the same JSON layout can be loaded with
//! `Schema::load` or `Schema::from_json`:
//!
//! ```json
//! { "entities": { "light_spot": { "bases": ["light"], "keyvalues": { "pitch": "angle_negative_pitch" } } } }
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{CollapseError, Result};

/// Record used for classnames the schema does not know.
pub const BASE_ENTITY: &str = "_CBaseEntity_";

const BUILTIN_SCHEMA: &str = include_str!("data/entities.json");

// ═══════════════════════════════════════════════════════════════════════════════
// VALUE TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    Integer,
    Float,
    Boolean,
    Choices,
    Flags,
    Color255,
    Color1,
    Studio,
    Sprite,
    Sound,
    Decal,
    Material,
    Scene,
    Script,
    Scriptlist,
    Sidelist,
    Angle,
    AngleNegativePitch,
    TargetSource,
    TargetDestination,
    TargetNameOrClass,
    Filterclass,
    Npcclass,
    Pointentityclass,
    NodeId,
    NodeDest,
    Vector,
    Vecline,
    Origin,
    Axis,
    VectorDirection,
    InstanceFile,
    InstanceParm,
    InstanceVariable,
}

const VALUE_TYPE_TAGS: &[(&str, ValueType)] = &[
    ("string", ValueType::String),
    ("integer", ValueType::Integer),
    ("float", ValueType::Float),
    ("boolean", ValueType::Boolean),
    ("choices", ValueType::Choices),
    ("flags", ValueType::Flags),
    ("color255", ValueType::Color255),
    ("color1", ValueType::Color1),
    ("studio", ValueType::Studio),
    ("sprite", ValueType::Sprite),
    ("sound", ValueType::Sound),
    ("decal", ValueType::Decal),
    ("material", ValueType::Material),
    ("scene", ValueType::Scene),
    ("script", ValueType::Script),
    ("scriptlist", ValueType::Scriptlist),
    ("sidelist", ValueType::Sidelist),
    ("angle", ValueType::Angle),
    ("angle_negative_pitch", ValueType::AngleNegativePitch),
    ("target_source", ValueType::TargetSource),
    ("target_destination", ValueType::TargetDestination),
    ("target_name_or_class", ValueType::TargetNameOrClass),
    ("filterclass", ValueType::Filterclass),
    ("npcclass", ValueType::Npcclass),
    ("pointentityclass", ValueType::Pointentityclass),
    ("node_id", ValueType::NodeId),
    ("node_dest", ValueType::NodeDest),
    ("vector", ValueType::Vector),
    ("vecline", ValueType::Vecline),
    ("origin", ValueType::Origin),
    ("axis", ValueType::Axis),
    ("vector_direction", ValueType::VectorDirection),
    ("instance_file", ValueType::InstanceFile),
    ("instance_parm", ValueType::InstanceParm),
    ("instance_variable", ValueType::InstanceVariable),
];

impl ValueType {
    pub fn tag(&self) -> &'static str {
        VALUE_TYPE_TAGS
            .iter()
            .find(|(_, ty)| ty == self)
            .map(|(tag, _)| *tag)
            .unwrap_or("string")
    }

    /// Whether values of this type name another entity.
    pub fn is_entity_name(&self) -> bool {
        matches!(
            self,
            ValueType::TargetSource | ValueType::TargetDestination | ValueType::Filterclass
        )
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(tag: &str) -> std::result::Result<Self, Self::Err> {
        let folded = tag.trim().to_ascii_lowercase();
        VALUE_TYPE_TAGS
            .iter()
            .find(|(name, _)| *name == folded)
            .map(|(_, ty)| *ty)
            .ok_or_else(|| format!("unknown value type \"{}\"", tag))
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEFINITIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct KeyValueDef {
    pub name: String,
    /// `None` when the schema used a tag this crate does not understand.
    pub value_type: Option<ValueType>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityDef {
    pub classname: String,
    pub is_base: bool,
    /// Own and inherited keyvalues, keyed by lowercase name.
    keyvalues: IndexMap<String, KeyValueDef>,
}

impl EntityDef {
    pub fn kv(&self, name: &str) -> Option<&KeyValueDef> {
        self.keyvalues.get(&name.to_lowercase())
    }
}

// On-disk layout.
#[derive(Debug, Deserialize)]
struct SchemaFile {
    entities: IndexMap<String, RawEntity>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    #[serde(default)]
    base: bool,
    #[serde(default)]
    bases: Vec<String>,
    #[serde(default)]
    keyvalues: IndexMap<String, String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCHEMA
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct Schema {
    entities: HashMap<String, EntityDef>,
    /// Lowercase names of every spawnable class.
    classnames: HashSet<String>,
    fallback: EntityDef,
}

impl Schema {
    /// The embedded engine database.
    pub fn builtin() -> Result<Schema> {
        Schema::from_json(BUILTIN_SCHEMA)
    }

    pub fn load(path: &Path) -> Result<Schema> {
        let text = std::fs::read_to_string(path).map_err(|source| CollapseError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Schema::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Schema> {
        let file: SchemaFile =
            serde_json::from_str(text).map_err(|e| CollapseError::Schema(e.to_string()))?;
        let raw: HashMap<String, &RawEntity> = file
            .entities
            .iter()
            .map(|(name, ent)| (name.to_lowercase(), ent))
            .collect();

        let mut entities = HashMap::new();
        let mut classnames = HashSet::new();
        for (name, ent) in &file.entities {
            let mut keyvalues = IndexMap::new();
            let mut visiting = HashSet::new();
            flatten(&raw, name, &mut keyvalues, &mut visiting)?;
            let folded = name.to_lowercase();
            if !ent.base {
                classnames.insert(folded.clone());
            }
            entities.insert(
                folded,
                EntityDef {
                    classname: name.clone(),
                    is_base: ent.base,
                    keyvalues,
                },
            );
        }

        let fallback = match entities.get(&BASE_ENTITY.to_lowercase()) {
            Some(def) => def.clone(),
            None => {
                log::warn!("Schema has no {} definition", BASE_ENTITY);
                EntityDef {
                    classname: BASE_ENTITY.to_string(),
                    is_base: true,
                    keyvalues: IndexMap::new(),
                }
            }
        };

        log::debug!("Loaded schema with {} entity classes", entities.len());
        Ok(Schema {
            entities,
            classnames,
            fallback,
        })
    }

    pub fn lookup(&self, classname: &str) -> Option<&EntityDef> {
        self.entities.get(&classname.to_lowercase())
    }

    /// The record for `classname`, or the generic base record.
    pub fn resolve(&self, classname: &str) -> &EntityDef {
        self.lookup(classname).unwrap_or(&self.fallback)
    }

    /// Whether `folded` (already lowercase) names a spawnable class.
    pub fn is_classname(&self, folded: &str) -> bool {
        self.classnames.contains(folded)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Collect keyvalues from `name` and its bases. Bases come first so a class can
/// override an inherited field's type.
fn flatten(
    raw: &HashMap<String, &RawEntity>,
    name: &str,
    out: &mut IndexMap<String, KeyValueDef>,
    visiting: &mut HashSet<String>,
) -> Result<()> {
    let folded = name.to_lowercase();
    if !visiting.insert(folded.clone()) {
        return Err(CollapseError::Schema(format!(
            "\"{}\" inherits from itself",
            name
        )));
    }
    let ent = raw
        .get(&folded)
        .ok_or_else(|| CollapseError::Schema(format!("unknown base class \"{}\"", name)))?;
    for base in &ent.bases {
        flatten(raw, base, out, visiting)?;
    }
    for (key, tag) in &ent.keyvalues {
        let value_type = tag.parse().ok();
        if value_type.is_none() {
            log::debug!("{}.{} has unrecognised type \"{}\"", name, key, tag);
        }
        out.insert(
            key.to_lowercase(),
            KeyValueDef {
                name: key.clone(),
                value_type,
            },
        );
    }
    visiting.remove(&folded);
    Ok(())
}
