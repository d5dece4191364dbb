//! # Map Document Module
//!
//! Arena-backed model of a map file: worldspawn with its brushes, entities,
//! and the visgroup tree. Entities live in a flat slot vector and are addressed
//! by `EntityHandle`; removing one leaves an empty slot so handles taken earlier
//! in a round stay valid.
//!
//! ## Key Invariants
//!
//! 1. **Unique Ids**: every entity, solid, face, pathing node and visgroup id is
//!    handed out by the document's own `IdAllocators`, so ids never collide.
//! 2. **Fresh Copies**: `copy` never reuses a source id. The old→new pairs are
//!    recorded in an `IdRemap` so later passes can translate references.
//! 3. **Document Order**: iteration follows slot order, which is file order for
//!    parsed entities and append order for copied ones.

use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ParseError;
use crate::frame::{format_float, parse_float, Frame, Vec3};
use crate::keyvalues::{self, Block, Item};
use crate::output::Output;
use crate::scope::{FixupValue, InstanceVars};

lazy_static! {
    static ref PLANE_POINT_RE: Regex = Regex::new(r"\(([^)]*)\)").unwrap();
    static ref UV_AXIS_RE: Regex =
        Regex::new(r"^\s*\[\s*(\S+)\s+(\S+)\s+(\S+)\s+(\S+)\s*\]\s*(\S+)\s*$").unwrap();
    static ref REPLACE_KEY_RE: Regex = Regex::new(r"(?i)^replace(\d+)$").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// IDS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdAllocator {
    used: HashSet<u32>,
    next: u32,
}

impl IdAllocator {
    /// A brand new id, never handed out or claimed before.
    pub fn fresh(&mut self) -> u32 {
        loop {
            self.next += 1;
            if self.used.insert(self.next) {
                return self.next;
            }
        }
    }

    /// Keep `desired` if it is still free, otherwise hand out a fresh id.
    pub fn claim(&mut self, desired: u32) -> u32 {
        if desired != 0 && self.used.insert(desired) {
            desired
        } else {
            self.fresh()
        }
    }

    pub fn is_used(&self, id: u32) -> bool {
        self.used.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdAllocators {
    pub entity: IdAllocator,
    pub solid: IdAllocator,
    pub face: IdAllocator,
    pub node: IdAllocator,
    pub visgroup: IdAllocator,
}

/// Old→new id tables built while copying one instance.
#[derive(Debug, Clone, Default)]
pub struct IdRemap {
    pub entities: HashMap<u32, u32>,
    pub faces: HashMap<u32, u32>,
    pub solids: HashMap<u32, u32>,
    pub nodes: HashMap<u32, u32>,
    pub visgroups: HashMap<u32, u32>,
}

impl IdRemap {
    /// Visgroup membership translated through the visgroup table, or `ungrouped`
    /// if nothing survives.
    pub fn map_visgroups(&self, old: &BTreeSet<u32>, ungrouped: &BTreeSet<u32>) -> BTreeSet<u32> {
        let mapped: BTreeSet<u32> = old
            .iter()
            .filter_map(|id| self.visgroups.get(id).copied())
            .collect();
        if mapped.is_empty() {
            ungrouped.clone()
        } else {
            mapped
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// KEYVALUES
// ═══════════════════════════════════════════════════════════════════════════════

/// Ordered keyvalues with case-insensitive keys; the first spelling is kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyValues {
    entries: IndexMap<String, (String, String)>,
}

impl KeyValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_lowercase())
            .map(|(_, v)| v.as_str())
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_lowercase())
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.get_mut(&key.to_lowercase()) {
            Some(slot) => slot.1 = value,
            None => {
                self.entries
                    .insert(key.to_lowercase(), (key.to_string(), value));
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries
            .shift_remove(&key.to_lowercase())
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.values().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EDITOR STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Contents of an `editor` block: visgroup membership plus anything else Hammer stores.
#[derive(Debug, Clone, PartialEq)]
pub struct EditorInfo {
    pub visgroup_ids: BTreeSet<u32>,
    pub vis_shown: bool,
    pub extra: Vec<(String, String)>,
}

impl Default for EditorInfo {
    fn default() -> Self {
        EditorInfo {
            visgroup_ids: BTreeSet::new(),
            vis_shown: true,
            extra: Vec::new(),
        }
    }
}

impl EditorInfo {
    fn from_block(block: &Block) -> Self {
        let mut info = EditorInfo::default();
        for (key, value) in block.pairs() {
            if key.eq_ignore_ascii_case("visgroupid") {
                if let Ok(id) = value.trim().parse() {
                    info.visgroup_ids.insert(id);
                }
            } else if key.eq_ignore_ascii_case("visgroupshown") {
                info.vis_shown = value.trim() != "0";
            } else {
                info.extra.push((key.to_string(), value.to_string()));
            }
        }
        info
    }

    fn to_block(&self) -> Block {
        let mut block = Block::new("editor");
        for (key, value) in &self.extra {
            block.push_pair(key.clone(), value.clone());
        }
        for id in &self.visgroup_ids {
            block.push_pair("visgroupid", id.to_string());
        }
        block.push_pair("visgroupshown", if self.vis_shown { "1" } else { "0" });
        block
    }

    fn copy(&self, keep_vis: bool) -> EditorInfo {
        if keep_vis {
            self.clone()
        } else {
            EditorInfo {
                visgroup_ids: BTreeSet::new(),
                vis_shown: true,
                extra: self.extra.clone(),
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BRUSHES
// ═══════════════════════════════════════════════════════════════════════════════

/// Texture projection axis: `"[x y z offset] scale"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UVAxis {
    pub axis: Vec3,
    pub offset: f64,
    pub scale: f64,
}

impl Default for UVAxis {
    fn default() -> Self {
        UVAxis {
            axis: Vec3::ZERO,
            offset: 0.0,
            scale: 0.25,
        }
    }
}

impl UVAxis {
    pub fn parse(text: &str) -> Self {
        match UV_AXIS_RE.captures(text) {
            Some(caps) => UVAxis {
                axis: Vec3::new(
                    parse_float(&caps[1]),
                    parse_float(&caps[2]),
                    parse_float(&caps[3]),
                ),
                offset: parse_float(&caps[4]),
                scale: parse_float(&caps[5]),
            },
            None => UVAxis::default(),
        }
    }

    /// Rotate with the brush and shift the offset so the texture stays put on it.
    pub fn localise(&self, frame: &Frame) -> UVAxis {
        let axis = frame.transform_direction(self.axis);
        let offset = if self.scale != 0.0 {
            self.offset - frame.position.dot(&axis) / self.scale
        } else {
            self.offset
        };
        UVAxis {
            axis,
            offset,
            scale: self.scale,
        }
    }
}

impl std::fmt::Display for UVAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} {}] {}",
            self.axis,
            format_float(self.offset),
            format_float(self.scale)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Side {
    pub id: u32,
    pub plane: [Vec3; 3],
    pub material: String,
    pub uaxis: UVAxis,
    pub vaxis: UVAxis,
    /// Remaining keys and child blocks (`rotation`, `lightmapscale`, `dispinfo`, ...).
    pub extra: Vec<Item>,
}

impl Side {
    fn from_block(block: &Block, ids: &mut IdAllocators) -> Side {
        let mut side = Side::default();
        let mut desired = 0;
        for item in &block.items {
            match item {
                Item::Pair(key, value) => match key.to_lowercase().as_str() {
                    "id" => desired = value.trim().parse().unwrap_or(0),
                    "plane" => {
                        for (slot, caps) in side
                            .plane
                            .iter_mut()
                            .zip(PLANE_POINT_RE.captures_iter(value))
                        {
                            *slot = Vec3::parse(&caps[1]);
                        }
                    }
                    "material" => side.material = value.clone(),
                    "uaxis" => side.uaxis = UVAxis::parse(value),
                    "vaxis" => side.vaxis = UVAxis::parse(value),
                    _ => side.extra.push(item.clone()),
                },
                Item::Block(_) => side.extra.push(item.clone()),
            }
        }
        side.id = ids.face.claim(desired);
        side
    }

    fn to_block(&self) -> Block {
        let mut block = Block::new("side");
        block.push_pair("id", self.id.to_string());
        block.push_pair(
            "plane",
            format!(
                "({}) ({}) ({})",
                self.plane[0], self.plane[1], self.plane[2]
            ),
        );
        block.push_pair("material", self.material.clone());
        block.push_pair("uaxis", self.uaxis.to_string());
        block.push_pair("vaxis", self.vaxis.to_string());
        block.items.extend(self.extra.iter().cloned());
        block
    }

    pub fn localise(&mut self, frame: &Frame) {
        for point in self.plane.iter_mut() {
            *point = frame.transform_point(*point);
        }
        self.uaxis = self.uaxis.localise(frame);
        self.vaxis = self.vaxis.localise(frame);
        for item in self.extra.iter_mut() {
            if let Item::Block(block) = item {
                if block.name.eq_ignore_ascii_case("dispinfo") {
                    localise_dispinfo(block, frame);
                }
            }
        }
    }
}

fn localise_dispinfo(block: &mut Block, frame: &Frame) {
    for item in block.items.iter_mut() {
        if let Item::Pair(key, value) = item {
            if key.eq_ignore_ascii_case("startposition") {
                *value = format!("[{}]", frame.transform_point(Vec3::parse(value)));
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Solid {
    pub id: u32,
    pub sides: Vec<Side>,
    pub editor: EditorInfo,
    pub hidden: bool,
    pub extra: Vec<Block>,
}

impl Solid {
    fn from_block(block: &Block, ids: &mut IdAllocators, hidden: bool) -> Solid {
        let mut solid = Solid {
            hidden,
            ..Default::default()
        };
        let mut desired = 0;
        for item in &block.items {
            match item {
                Item::Pair(key, value) if key.eq_ignore_ascii_case("id") => {
                    desired = value.trim().parse().unwrap_or(0);
                }
                Item::Pair(..) => {}
                Item::Block(child) if child.name.eq_ignore_ascii_case("side") => {
                    solid.sides.push(Side::from_block(child, ids));
                }
                Item::Block(child) if child.name.eq_ignore_ascii_case("editor") => {
                    solid.editor = EditorInfo::from_block(child);
                }
                Item::Block(child) => solid.extra.push(child.clone()),
            }
        }
        solid.id = ids.solid.claim(desired);
        solid
    }

    fn to_block(&self) -> Block {
        let mut block = Block::new("solid");
        block.push_pair("id", self.id.to_string());
        for side in &self.sides {
            block.push_block(side.to_block());
        }
        for extra in &self.extra {
            block.push_block(extra.clone());
        }
        block.push_block(self.editor.to_block());
        block
    }

    /// Copy with fresh solid and face ids, recording both in `remap`.
    pub fn copy(&self, ids: &mut IdAllocators, remap: &mut IdRemap, keep_vis: bool) -> Solid {
        let id = ids.solid.fresh();
        remap.solids.insert(self.id, id);
        let sides = self
            .sides
            .iter()
            .map(|side| {
                let new_id = ids.face.fresh();
                remap.faces.insert(side.id, new_id);
                Side {
                    id: new_id,
                    ..side.clone()
                }
            })
            .collect();
        Solid {
            id,
            sides,
            editor: self.editor.copy(keep_vis),
            hidden: self.hidden,
            extra: self.extra.clone(),
        }
    }

    pub fn localise(&mut self, frame: &Frame) {
        for side in self.sides.iter_mut() {
            side.localise(frame);
        }
    }

    pub fn is_visible(&self) -> bool {
        !self.hidden && self.editor.vis_shown
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTITIES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityHandle(pub usize);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Entity {
    pub id: u32,
    pub keys: KeyValues,
    pub fixup: InstanceVars,
    pub outputs: Vec<Output>,
    pub solids: Vec<Solid>,
    pub editor: EditorInfo,
    pub hidden: bool,
    /// How many instance expansions produced this entity. Never written to disk.
    pub recursion_depth: u32,
    pub extra: Vec<Block>,
}

impl Entity {
    pub fn new(classname: &str) -> Self {
        let mut ent = Entity::default();
        ent.keys.set("classname", classname);
        ent
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.keys.get(key)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.keys.get_or(key, default)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.keys.set(key, value);
    }

    pub fn classname(&self) -> &str {
        self.keys.get_or("classname", "")
    }

    pub fn targetname(&self) -> &str {
        self.keys.get_or("targetname", "")
    }

    pub fn is_class(&self, classname: &str) -> bool {
        self.classname().eq_ignore_ascii_case(classname)
    }

    pub fn is_visible(&self) -> bool {
        !self.hidden && self.editor.vis_shown
    }

    fn from_block(block: &Block, ids: &mut IdAllocators, hidden: bool) -> Entity {
        let mut ent = Entity {
            hidden,
            ..Default::default()
        };
        let mut desired = 0;
        for item in &block.items {
            match item {
                Item::Pair(key, value) => {
                    if key.eq_ignore_ascii_case("id") {
                        desired = value.trim().parse().unwrap_or(0);
                    } else if let Some(fixup) = parse_replace_key(key, value) {
                        ent.fixup.insert(fixup);
                    } else {
                        if key.eq_ignore_ascii_case("nodeid") {
                            if let Ok(node) = value.trim().parse() {
                                ids.node.claim(node);
                            }
                        }
                        ent.keys.set(key, value.clone());
                    }
                }
                Item::Block(child) => match child.name.to_lowercase().as_str() {
                    "connections" => {
                        for (key, value) in child.pairs() {
                            match Output::parse(key, value) {
                                Some(out) => ent.outputs.push(out),
                                None => log::warn!("Malformed output \"{}\" \"{}\"", key, value),
                            }
                        }
                    }
                    "solid" => ent.solids.push(Solid::from_block(child, ids, false)),
                    "hidden" => {
                        for solid in child.find_all("solid") {
                            ent.solids.push(Solid::from_block(solid, ids, true));
                        }
                    }
                    "editor" => ent.editor = EditorInfo::from_block(child),
                    _ => ent.extra.push(child.clone()),
                },
            }
        }
        ent.id = ids.entity.claim(desired);
        ent
    }

    fn to_block(&self, name: &str) -> Block {
        let mut block = Block::new(name);
        block.push_pair("id", self.id.to_string());
        for (key, value) in self.keys.iter() {
            block.push_pair(key, value);
        }
        for fixup in self.fixup.iter() {
            block.push_pair(
                format!("replace{:02}", fixup.index),
                format!("${} {}", fixup.name, fixup.value),
            );
        }
        if !self.outputs.is_empty() {
            let mut conn = Block::new("connections");
            for out in &self.outputs {
                conn.push_pair(out.key(), out.value());
            }
            block.push_block(conn);
        }
        for solid in self.solids.iter().filter(|s| !s.hidden) {
            block.push_block(solid.to_block());
        }
        for solid in self.solids.iter().filter(|s| s.hidden) {
            let mut hidden = Block::new("hidden");
            hidden.push_block(solid.to_block());
            block.push_block(hidden);
        }
        for extra in &self.extra {
            block.push_block(extra.clone());
        }
        if name != "world" {
            block.push_block(self.editor.to_block());
        }
        block
    }

    /// Copy with a fresh entity id; contained brushes go through `Solid::copy`.
    pub fn copy(&self, ids: &mut IdAllocators, remap: &mut IdRemap, keep_vis: bool) -> Entity {
        let id = ids.entity.fresh();
        remap.entities.insert(self.id, id);
        let solids = self
            .solids
            .iter()
            .map(|solid| solid.copy(ids, remap, keep_vis))
            .collect();
        Entity {
            id,
            keys: self.keys.clone(),
            fixup: self.fixup.clone(),
            outputs: self.outputs.clone(),
            solids,
            editor: self.editor.copy(keep_vis),
            hidden: self.hidden,
            recursion_depth: self.recursion_depth,
            extra: self.extra.clone(),
        }
    }
}

fn parse_replace_key(key: &str, value: &str) -> Option<FixupValue> {
    let caps = REPLACE_KEY_RE.captures(key)?;
    let body = value.strip_prefix('$')?;
    let (name, var_value) = body.split_once(' ').unwrap_or((body, ""));
    Some(FixupValue {
        name: name.to_string(),
        value: var_value.to_string(),
        index: caps[1].parse().unwrap_or(0),
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// VISGROUPS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VisGroup {
    pub id: u32,
    pub name: String,
    pub color: String,
    pub children: Vec<VisGroup>,
}

impl VisGroup {
    fn from_block(block: &Block, ids: &mut IdAllocators) -> VisGroup {
        let desired = block
            .get("visgroupid")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(0);
        VisGroup {
            id: ids.visgroup.claim(desired),
            name: block.get_or("name", "").to_string(),
            color: block.get_or("color", "").to_string(),
            children: block
                .find_all("visgroup")
                .map(|child| VisGroup::from_block(child, ids))
                .collect(),
        }
    }

    fn to_block(&self) -> Block {
        let mut block = Block::new("visgroup");
        block.push_pair("name", self.name.clone());
        block.push_pair("visgroupid", self.id.to_string());
        block.push_pair("color", self.color.clone());
        for child in &self.children {
            block.push_block(child.to_block());
        }
        block
    }

    /// Deep copy with fresh ids, recording old→new in `mapping`.
    pub fn copy(&self, ids: &mut IdAllocators, mapping: &mut HashMap<u32, u32>) -> VisGroup {
        let id = ids.visgroup.fresh();
        mapping.insert(self.id, id);
        VisGroup {
            id,
            name: self.name.clone(),
            color: self.color.clone(),
            children: self
                .children
                .iter()
                .map(|child| child.copy(ids, mapping))
                .collect(),
        }
    }

    fn find_mut(&mut self, id: u32) -> Option<&mut VisGroup> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|child| child.find_mut(id))
    }

    fn find_by_name(&self, name: &str) -> Option<&VisGroup> {
        if self.name.eq_ignore_ascii_case(name) {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find_by_name(name))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DOCUMENT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Worldspawn; its `solids` are the world brushes.
    pub world: Entity,
    entities: Vec<Option<Entity>>,
    pub vis_tree: Vec<VisGroup>,
    /// Unrecognised top-level blocks before `world` (`versioninfo`, `viewsettings`...).
    pub leading_blocks: Vec<Block>,
    /// Unrecognised top-level blocks after `world` (`cameras`, `cordons`...).
    pub trailing_blocks: Vec<Block>,
    pub ids: IdAllocators,
}

impl Default for Document {
    fn default() -> Self {
        let mut ids = IdAllocators::default();
        let mut world = Entity::new("worldspawn");
        world.id = ids.entity.fresh();
        Document {
            world,
            entities: Vec::new(),
            vis_tree: Vec::new(),
            leading_blocks: Vec::new(),
            trailing_blocks: Vec::new(),
            ids,
        }
    }
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(source: &str, file: &str) -> Result<Document, ParseError> {
        let tree = keyvalues::parse(source, file)?;
        Ok(Document::from_tree(&tree))
    }

    /// Build a document from a parsed tree, keeping the stored ids where they are unique.
    pub fn from_tree(tree: &Block) -> Document {
        let mut ids = IdAllocators::default();
        let mut world = None;
        let mut entities = Vec::new();
        let mut vis_tree = Vec::new();
        let mut leading_blocks = Vec::new();
        let mut trailing_blocks = Vec::new();

        for block in tree.blocks() {
            match block.name.to_lowercase().as_str() {
                "world" => world = Some(Entity::from_block(block, &mut ids, false)),
                "entity" => entities.push(Some(Entity::from_block(block, &mut ids, false))),
                "hidden" => {
                    for ent in block.find_all("entity") {
                        entities.push(Some(Entity::from_block(ent, &mut ids, true)));
                    }
                }
                "visgroups" => {
                    for group in block.find_all("visgroup") {
                        vis_tree.push(VisGroup::from_block(group, &mut ids));
                    }
                }
                _ if world.is_none() && entities.is_empty() => leading_blocks.push(block.clone()),
                _ => trailing_blocks.push(block.clone()),
            }
        }

        let world = world.unwrap_or_else(|| {
            let mut world = Entity::new("worldspawn");
            world.id = ids.entity.fresh();
            world
        });

        Document {
            world,
            entities,
            vis_tree,
            leading_blocks,
            trailing_blocks,
            ids,
        }
    }

    pub fn to_tree(&self) -> Block {
        let mut root = Block::new("");
        let mut leading = self.leading_blocks.iter();
        // versioninfo conventionally comes first, ahead of visgroups.
        if let Some(first) = self.leading_blocks.first() {
            if first.name.eq_ignore_ascii_case("versioninfo") {
                root.push_block(first.clone());
                leading.next();
            }
        }
        let mut visgroups = Block::new("visgroups");
        for group in &self.vis_tree {
            visgroups.push_block(group.to_block());
        }
        root.push_block(visgroups);
        for block in leading {
            root.push_block(block.clone());
        }
        root.push_block(self.world.to_block("world"));
        for ent in self.entities() {
            if ent.hidden {
                let mut hidden = Block::new("hidden");
                hidden.push_block(ent.to_block("entity"));
                root.push_block(hidden);
            } else {
                root.push_block(ent.to_block("entity"));
            }
        }
        for block in &self.trailing_blocks {
            root.push_block(block.clone());
        }
        root
    }

    pub fn export(&self) -> String {
        keyvalues::write(&self.to_tree())
    }

    // ── entity arena ──────────────────────────────────────────────────────────

    /// Append an entity. Its id must come from this document's allocator; `0`
    /// asks for a fresh one.
    pub fn add_entity(&mut self, mut ent: Entity) -> EntityHandle {
        if ent.id == 0 {
            ent.id = self.ids.entity.fresh();
        }
        self.entities.push(Some(ent));
        EntityHandle(self.entities.len() - 1)
    }

    pub fn remove_entity(&mut self, handle: EntityHandle) -> Option<Entity> {
        self.entities.get_mut(handle.0).and_then(Option::take)
    }

    pub fn entity(&self, handle: EntityHandle) -> Option<&Entity> {
        self.entities.get(handle.0).and_then(Option::as_ref)
    }

    pub fn entity_mut(&mut self, handle: EntityHandle) -> Option<&mut Entity> {
        self.entities.get_mut(handle.0).and_then(Option::as_mut)
    }

    /// An entity together with the id allocators, for edits that allocate ids.
    pub fn entity_and_ids_mut(
        &mut self,
        handle: EntityHandle,
    ) -> Option<(&mut Entity, &mut IdAllocators)> {
        let ent = self.entities.get_mut(handle.0).and_then(Option::as_mut)?;
        Some((ent, &mut self.ids))
    }

    /// Live entities in document order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().flatten()
    }

    pub fn entities_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.iter_mut().flatten()
    }

    pub fn handles(&self) -> Vec<EntityHandle> {
        self.entities
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| EntityHandle(i))
            .collect()
    }

    pub fn by_class(&self, classname: &str) -> Vec<EntityHandle> {
        self.entities
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Some(ent) if ent.is_class(classname) => Some(EntityHandle(i)),
                _ => None,
            })
            .collect()
    }

    pub fn entity_count(&self) -> usize {
        self.entities().count()
    }

    /// Drop empty slots. Invalidates every handle previously handed out.
    pub fn compact(&mut self) {
        self.entities.retain(Option::is_some);
    }

    // ── brushes & visgroups ───────────────────────────────────────────────────

    pub fn brushes(&self) -> &[Solid] {
        &self.world.solids
    }

    /// Append a world brush. As with `add_entity`, id `0` asks for a fresh one.
    pub fn add_brush(&mut self, mut solid: Solid) {
        if solid.id == 0 {
            solid.id = self.ids.solid.fresh();
        }
        self.world.solids.push(solid);
    }

    pub fn find_visgroup_mut(&mut self, id: u32) -> Option<&mut VisGroup> {
        self.vis_tree.iter_mut().find_map(|group| group.find_mut(id))
    }

    pub fn find_visgroup_by_name(&self, name: &str) -> Option<&VisGroup> {
        self.vis_tree.iter().find_map(|group| group.find_by_name(name))
    }

    /// Create a new top-level visgroup and return its id.
    pub fn create_visgroup(&mut self, name: &str) -> u32 {
        let id = self.ids.visgroup.fresh();
        self.vis_tree.push(VisGroup {
            id,
            name: name.to_string(),
            color: "255 255 255".to_string(),
            children: Vec::new(),
        });
        id
    }
}
