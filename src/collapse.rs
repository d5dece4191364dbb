//! # Collapse Module
//!
//! Flattens `func_instance` references into the map that places them.
//!
//! ## Rounds
//!
//! Every round snapshots the references currently in the map and expands each
//! one in document order. References that an expansion copies in are only seen
//! by the next round, so nesting depth is bounded by the round limit. A map that
//! still holds references after the last round is rejected.
//!
//! ## One expansion
//!
//! 1. Visgroups of the instance file are copied (or stripped).
//! 2. World brushes are copied and moved into place. This fills the face id
//!    table that `sidelist` fields are remapped through in step 5.
//! 3. Signals already in the map that enter the instance through its proxy are
//!    rerouted to their internal target.
//! 4. Entities are copied with fresh ids.
//! 5. Every copied keyvalue is rewritten according to its declared type, and
//!    names are scoped to the instance.
//! 6. Signals on the reference that leave through the proxy are attached to the
//!    internal entity that fires them.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::InstanceCache;
use crate::diagnostics::CollapseLog;
use crate::dispatch::{rewrite, rule_for, FieldContext, FieldRule};
use crate::document::{Document, Entity, EntityHandle, IdRemap};
use crate::error::{CollapseError, Result};
use crate::filesys::FileSystem;
use crate::frame::{format_float, parse_float, Angle, Frame, Vec3};
use crate::manifest::{self, ManifestEntry};
use crate::output::Output;
use crate::proxy::RoutedSubDocument;
use crate::schema::{Schema, ValueType};
use crate::scope::{is_literal_value, rename, FixupStyle, InstanceVars};

pub const INSTANCE_CLASS: &str = "func_instance";
pub const DEFAULT_RECURSION_LIMIT: u32 = 100;

/// Keyvalues every entity interprets the same way. They are rewritten (or left
/// alone) directly instead of going through the schema.
const HARDCODED_KEYS: &[&str] = &[
    "origin",
    "angles",
    "pitch",
    "yaw",
    "classname",
    "hammerid",
    "spawnflags",
    "nodeid",
];

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// What happens to the visgroups of collapsed instances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisgroupMode {
    #[default]
    Strip,
    Keep,
    /// Keep them, nested under a top-level group with this name.
    Nest(String),
}

impl std::str::FromStr for VisgroupMode {
    type Err = String;

    fn from_str(text: &str) -> std::result::Result<Self, Self::Err> {
        match text {
            "strip" => Ok(VisgroupMode::Strip),
            "keep" => Ok(VisgroupMode::Keep),
            _ => match text.strip_prefix("nest:") {
                Some(name) if !name.is_empty() => Ok(VisgroupMode::Nest(name.to_string())),
                _ => Err(format!(
                    "expected strip, keep or nest:<name>, got \"{}\"",
                    text
                )),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollapseOptions {
    pub recursion_limit: u32,
    pub visgroups: VisgroupMode,
    /// Schema JSON to use instead of the built-in database.
    pub schema_path: Option<PathBuf>,
    /// Extra directories searched after the map's own.
    pub search_paths: Vec<PathBuf>,
    /// Read and parse each round's new instance files in parallel.
    pub parallel_preload: bool,
}

impl Default for CollapseOptions {
    fn default() -> Self {
        CollapseOptions {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            visgroups: VisgroupMode::Strip,
            schema_path: None,
            search_paths: Vec::new(),
            parallel_preload: true,
        }
    }
}

impl CollapseOptions {
    pub fn from_json(text: &str) -> Result<CollapseOptions> {
        serde_json::from_str(text).map_err(|e| CollapseError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<CollapseOptions> {
        let text = std::fs::read_to_string(path).map_err(|source| CollapseError::Io {
            path: path.display().to_string(),
            source,
        })?;
        CollapseOptions::from_json(&text)
    }
}

/// Summary of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollapseReport {
    pub rounds: u32,
    pub instances_collapsed: usize,
    pub max_depth: u32,
    pub cached_paths: usize,
    pub distinct_files: usize,
    pub warnings: usize,
}

// ═══════════════════════════════════════════════════════════════════════════════
// INSTANCE
// ═══════════════════════════════════════════════════════════════════════════════

/// A `func_instance` taken out of the map, with everything needed to expand it.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub name: String,
    pub filename: String,
    pub frame: Frame,
    pub style: FixupStyle,
    pub fixup: InstanceVars,
    pub outputs: Vec<Output>,
    pub recursion_depth: u32,
}

impl Instance {
    pub fn new(name: &str, filename: &str, frame: Frame, style: FixupStyle) -> Self {
        Instance {
            name: name.to_string(),
            filename: filename.to_string(),
            frame,
            style,
            fixup: InstanceVars::new(),
            outputs: Vec::new(),
            recursion_depth: 0,
        }
    }

    pub fn from_entity(ent: &Entity) -> Instance {
        let name = ent.targetname();
        let filename = ent.get_or("file", "");
        let style_text = ent.get_or("fixup_style", "0");
        let style = FixupStyle::from_keyvalue(style_text).unwrap_or_else(|| {
            log::warn!(
                "Invalid fixup style \"{}\" on func_instance \"{}\" at {} ({})",
                style_text,
                name,
                ent.get_or("origin", ""),
                filename
            );
            FixupStyle::Prefix
        });
        let frame = Frame::new(
            Vec3::parse(ent.get_or("origin", "")),
            Angle::parse(ent.get_or("angles", "")),
        );
        Instance {
            name: name.to_string(),
            filename: filename.to_string(),
            frame,
            style,
            fixup: ent.fixup.clone(),
            outputs: ent.outputs.clone(),
            recursion_depth: ent.recursion_depth,
        }
    }

    pub fn rename(&self, name: &str) -> String {
        rename(name, self.style, &self.name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DRIVER
// ═══════════════════════════════════════════════════════════════════════════════

/// State for one collapse run.
pub struct Collapser<'a> {
    fsys: &'a dyn FileSystem,
    schema: &'a Schema,
    options: CollapseOptions,
    cache: InstanceCache,
    log: CollapseLog,
    auto_counter: u32,
    report: CollapseReport,
}

impl<'a> Collapser<'a> {
    pub fn new(fsys: &'a dyn FileSystem, schema: &'a Schema, options: CollapseOptions) -> Self {
        Collapser {
            fsys,
            schema,
            options,
            cache: InstanceCache::new(),
            log: CollapseLog::new(),
            auto_counter: 0,
            report: CollapseReport::default(),
        }
    }

    /// Expand references round by round until none remain.
    pub fn collapse_all(&mut self, doc: &mut Document) -> Result<CollapseReport> {
        let limit = self.options.recursion_limit;
        for round in 1..=limit {
            let refs = doc.by_class(INSTANCE_CLASS);
            if refs.is_empty() {
                return Ok(self.finish());
            }
            log::debug!("Round {}: {} instances", round, refs.len());

            if self.options.parallel_preload {
                let paths: Vec<String> = refs
                    .iter()
                    .filter_map(|h| doc.entity(*h))
                    .map(|ent| ent.get_or("file", "").to_string())
                    .collect();
                self.cache.preload(self.fsys, &paths)?;
            }

            for handle in refs {
                self.collapse_reference(doc, handle)?;
            }
            doc.compact();
            self.report.rounds = round;
        }

        let remaining = doc.by_class(INSTANCE_CLASS);
        match remaining.first().and_then(|h| doc.entity(*h)) {
            None => Ok(self.finish()),
            Some(example) => Err(CollapseError::RecursionLimit {
                limit,
                remaining: remaining.len(),
                example: example.get_or("file", "").to_string(),
            }),
        }
    }

    /// Merge a manifest's sub-maps into one document. Warnings share this run's log.
    pub fn merge_manifest(&mut self, entries: &[ManifestEntry]) -> Result<Document> {
        manifest::merge_manifest(
            entries,
            self.fsys,
            self.schema,
            &self.options.visgroups,
            &mut self.log,
        )
    }

    fn collapse_reference(&mut self, doc: &mut Document, handle: EntityHandle) -> Result<()> {
        let Some(ent) = doc.remove_entity(handle) else {
            return Ok(());
        };
        let mut inst = Instance::from_entity(&ent);
        if inst.name.is_empty() {
            self.auto_counter += 1;
            inst.name = format!("InstanceAuto{}", self.auto_counter);
        }
        log::debug!(
            "Collapse {} as \"{}\" @ {}",
            inst.filename,
            inst.name,
            inst.frame.position
        );
        let file = self.cache.get(self.fsys, &inst.filename)?;
        collapse_one(
            doc,
            &inst,
            &file,
            self.schema,
            &self.options.visgroups,
            &mut self.log,
        );
        self.report.instances_collapsed += 1;
        self.report.max_depth = self.report.max_depth.max(inst.recursion_depth + 1);
        Ok(())
    }

    fn finish(&mut self) -> CollapseReport {
        let stats = self.cache.stats();
        self.report.cached_paths = stats.paths;
        self.report.distinct_files = stats.distinct_files;
        self.report.warnings = self.log.warning_count();
        self.report.clone()
    }
}

/// Collapse every reference in `doc` with a fresh cache and log.
pub fn collapse_all(
    doc: &mut Document,
    fsys: &dyn FileSystem,
    schema: &Schema,
    options: &CollapseOptions,
) -> Result<CollapseReport> {
    Collapser::new(fsys, schema, options.clone()).collapse_all(doc)
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPANSION
// ═══════════════════════════════════════════════════════════════════════════════

/// Copy one instance file into `doc`. The reference itself must already be removed.
/// Returns the old→new id tables.
pub fn collapse_one(
    doc: &mut Document,
    inst: &Instance,
    file: &RoutedSubDocument,
    schema: &Schema,
    visgroups: &VisgroupMode,
    log: &mut CollapseLog,
) -> IdRemap {
    let mut remap = IdRemap::default();
    let frame = &inst.frame;
    let keep_vis = *visgroups != VisgroupMode::Strip;
    let substitute = |text: &str| inst.fixup.substitute_with(text, |name| file.default_for(name));

    // 1. Visgroups.
    let nest_id = match visgroups {
        VisgroupMode::Nest(name) => Some(match doc.find_visgroup_by_name(name) {
            Some(group) => group.id,
            None => doc.create_visgroup(name),
        }),
        _ => None,
    };
    if keep_vis {
        for group in &file.tree.vis_tree {
            let copy = group.copy(&mut doc.ids, &mut remap.visgroups);
            match nest_id.and_then(|id| doc.find_visgroup_mut(id)) {
                Some(parent) => parent.children.push(copy),
                None => doc.vis_tree.push(copy),
            }
        }
    }
    let ungrouped: BTreeSet<u32> = nest_id.into_iter().collect();

    // 2. World brushes.
    for old in file.tree.brushes().iter().filter(|s| s.is_visible()) {
        let mut brush = old.copy(&mut doc.ids, &mut remap, keep_vis);
        brush.localise(frame);
        if keep_vis {
            brush.editor.visgroup_ids = remap.map_visgroups(&old.editor.visgroup_ids, &ungrouped);
        }
        doc.add_brush(brush);
    }

    // 3. Signals entering through the proxy.
    for ent in doc.entities_mut() {
        for out in ent.outputs.iter_mut() {
            if !out.target.eq_ignore_ascii_case(&inst.name) {
                continue;
            }
            let Some(entry) = &out.inst_in else {
                continue;
            };
            let key = (entry.to_lowercase(), out.input.to_lowercase());
            // No match is fine: another reference may share this name.
            if let Some(relay) = file.proxy_inputs.get(&key) {
                // The relay names an entity inside the instance, which is
                // copied under its scoped name, so the target is scoped here too.
                let target = inst.rename(&substitute(&relay.target));
                out.reroute(relay, target);
            }
        }
    }

    // 4. Entities.
    let mut copied: Vec<EntityHandle> = Vec::new();
    let mut by_old_id: HashMap<u32, EntityHandle> = HashMap::new();
    for old in file.tree.entities().filter(|e| e.is_visible()) {
        let mut ent = old.copy(&mut doc.ids, &mut remap, keep_vis);
        if keep_vis {
            ent.editor.visgroup_ids = remap.map_visgroups(&old.editor.visgroup_ids, &ungrouped);
        }
        for (old_brush, brush) in old.solids.iter().zip(ent.solids.iter_mut()) {
            brush.localise(frame);
            if keep_vis {
                brush.editor.visgroup_ids =
                    remap.map_visgroups(&old_brush.editor.visgroup_ids, &ungrouped);
            }
        }
        let handle = doc.add_entity(ent);
        by_old_id.insert(old.id, handle);
        copied.push(handle);
    }

    // 5. Keyvalues, variables and output targets.
    for handle in &copied {
        let Some((ent, ids)) = doc.entity_and_ids_mut(*handle) else {
            continue;
        };
        let classname = ent.classname().to_string();
        let def = schema.resolve(&classname);
        if ent.is_class(INSTANCE_CLASS) {
            ent.recursion_depth = inst.recursion_depth + 1;
        }

        let mut angles = Angle::parse(ent.get_or("angles", ""));
        if let Some(pitch) = ent.get("pitch") {
            angles.set_pitch(parse_float(pitch));
        }
        if let Some(yaw) = ent.get("yaw") {
            angles.set_yaw(parse_float(yaw));
        }
        let angles = frame.compose_angle(&angles);

        let mut ctx = FieldContext {
            frame,
            instance_name: &inst.name,
            style: inst.style,
            schema,
            remap: &mut remap,
            node_ids: &mut ids.node,
        };
        let keys: Vec<(String, String)> = ent
            .keys
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        for (key, raw) in keys {
            let folded = key.to_lowercase();
            if HARDCODED_KEYS.contains(&folded.as_str()) {
                let value = substitute(&raw);
                match folded.as_str() {
                    "origin" => ent.set(&key, frame.transform_point(Vec3::parse(&value)).to_string()),
                    "angles" => ent.set(&key, angles.to_string()),
                    "pitch" => ent.set(&key, format_float(angles.pitch)),
                    "yaw" => ent.set(&key, format_float(angles.yaw)),
                    _ => {}
                }
                continue;
            }

            let Some(kv) = def.kv(&folded) else {
                // Hammer mirrors instance variables as `$name` keys on func_instance.
                if folded.starts_with('$') && classname.eq_ignore_ascii_case(INSTANCE_CLASS) {
                    continue;
                }
                log.warn_once(&classname, &key, || {
                    format!("Unknown keyvalue {}.{}", classname, key)
                });
                continue;
            };
            let Some(value_type) = kv.value_type else {
                log.warn_once(&classname, &key, || {
                    format!("Unrecognised value type for {}.{}", classname, key)
                });
                continue;
            };
            let rule = rule_for(value_type);
            if rule == FieldRule::Reject {
                log.warn_once(&classname, &key, || {
                    format!(
                        "{} should only be applied to {}, not {}.{}",
                        value_type,
                        if value_type == ValueType::AngleNegativePitch {
                            "pitch"
                        } else {
                            "replaceXX"
                        },
                        classname,
                        key
                    )
                });
                continue;
            }
            let value = substitute(&raw);
            let new_value = rewrite(rule, &value, &mut ctx);
            ent.set(&key, new_value);
        }

        for var in ent.fixup.iter_mut() {
            if !var.value.is_empty() && !is_literal_value(&var.value) {
                var.value = inst.rename(&var.value);
            }
        }
        for out in ent.outputs.iter_mut() {
            out.target = inst.rename(&substitute(&out.target));
        }
    }

    // 6. Signals leaving through the proxy.
    for out in &inst.outputs {
        let Some(exit) = &out.inst_out else {
            continue;
        };
        let key = (exit.to_lowercase(), out.output.to_lowercase());
        let Some((old_id, reaction)) = file.proxy_outputs.get(&key) else {
            log::info!("No output {},{} in {}", exit, out.output, inst.filename);
            continue;
        };
        match by_old_id.get(old_id).and_then(|h| doc.entity_mut(*h)) {
            Some(ent) => ent.outputs.push(Output::combine(reaction, out)),
            None => log::info!(
                "Output {},{} in {} comes from an entity that was not copied",
                exit,
                out.output,
                inst.filename
            ),
        }
    }

    remap
}
