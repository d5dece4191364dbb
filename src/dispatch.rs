//! Field Type Dispatcher
//!
//! Maps a declared keyvalue type to the rule that moves a copied value into its
//! new instance: positions are transformed, names are scoped, face and node ids
//! are remapped. Adding a type means adding one row to `rule_for`.

use crate::document::{IdAllocator, IdRemap};
use crate::frame::{Angle, Frame, Vec3};
use crate::schema::{Schema, ValueType};
use crate::scope::{rename, FixupStyle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    /// Absolute point: rotate and translate.
    Position,
    Angle,
    EntityName,
    /// Entity name, unless the value is a known classname.
    EntityNameOrClass,
    /// Rotate only.
    Direction,
    SideList,
    NodeId,
    /// Two comma-separated absolute points.
    AxisPair,
    Opaque,
    /// Types only valid on one special field; anywhere else the field is skipped.
    Reject,
}

pub fn rule_for(value_type: ValueType) -> FieldRule {
    match value_type {
        ValueType::Vector | ValueType::Origin | ValueType::Vecline => FieldRule::Position,
        ValueType::Angle => FieldRule::Angle,
        ty if ty.is_entity_name() => FieldRule::EntityName,
        ValueType::TargetNameOrClass => FieldRule::EntityNameOrClass,
        ValueType::VectorDirection => FieldRule::Direction,
        ValueType::Sidelist => FieldRule::SideList,
        ValueType::NodeId | ValueType::NodeDest => FieldRule::NodeId,
        ValueType::Axis => FieldRule::AxisPair,
        ValueType::AngleNegativePitch | ValueType::InstanceVariable => FieldRule::Reject,
        _ => FieldRule::Opaque,
    }
}

/// Everything a rule may need about the instance being expanded.
pub struct FieldContext<'a> {
    pub frame: &'a Frame,
    pub instance_name: &'a str,
    pub style: FixupStyle,
    pub schema: &'a Schema,
    pub remap: &'a mut IdRemap,
    pub node_ids: &'a mut IdAllocator,
}

impl FieldContext<'_> {
    pub fn rename(&self, name: &str) -> String {
        rename(name, self.style, self.instance_name)
    }
}

/// Apply `rule` to one value. `Reject` returns the value untouched; callers are
/// expected to have filtered it out already.
pub fn rewrite(rule: FieldRule, value: &str, ctx: &mut FieldContext<'_>) -> String {
    match rule {
        FieldRule::Position => ctx.frame.transform_point(Vec3::parse(value)).to_string(),
        FieldRule::Angle => ctx.frame.compose_angle(&Angle::parse(value)).to_string(),
        FieldRule::EntityName => ctx.rename(value),
        FieldRule::EntityNameOrClass => {
            if ctx.schema.is_classname(&value.to_lowercase()) {
                value.to_string()
            } else {
                ctx.rename(value)
            }
        }
        FieldRule::Direction => ctx.frame.transform_direction(Vec3::parse(value)).to_string(),
        FieldRule::SideList => remap_side_list(value, ctx.remap),
        FieldRule::NodeId => remap_node(value, ctx.remap, ctx.node_ids),
        FieldRule::AxisPair => match value.split_once(',') {
            Some((first, second)) => format!(
                "{}, {}",
                ctx.frame.transform_point(Vec3::parse(first)),
                ctx.frame.transform_point(Vec3::parse(second))
            ),
            None => ctx.frame.transform_point(Vec3::parse(value)).to_string(),
        },
        FieldRule::Opaque | FieldRule::Reject => value.to_string(),
    }
}

pub fn remap_side_list(value: &str, remap: &IdRemap) -> String {
    let mut sides: Vec<u32> = value
        .split_whitespace()
        .filter_map(|tok| tok.parse::<u32>().ok())
        .filter_map(|old| remap.faces.get(&old).copied())
        .collect();
    sides.sort_unstable();
    sides
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn remap_node(value: &str, remap: &mut IdRemap, node_ids: &mut IdAllocator) -> String {
    let Ok(old) = value.trim().parse::<u32>() else {
        return value.to_string();
    };
    remap
        .nodes
        .entry(old)
        .or_insert_with(|| node_ids.fresh())
        .to_string()
}
