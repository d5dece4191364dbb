//! # Instance Collapser
//!
//! Flattens `func_instance` references in Source engine maps: every reference is
//! replaced by a transformed copy of the map it points at, recursively, until the
//! map is self-contained.
//!
//! ## Collapse Invariants
//!
//! 1. **Fresh Ids**: every copied entity, brush, face, pathing node and visgroup
//!    gets an id allocated from the destination map. Source ids are never reused.
//!
//! 2. **Brushes Before Keyvalues**: brushes are copied before any keyvalue is
//!    rewritten, so `sidelist` fields always see a complete face id table.
//!
//! 3. **Typed Rewriting**: each keyvalue is rewritten according to the type the
//!    entity schema declares for it. Unknown fields are reported once per
//!    `(classname, field)` and left alone.
//!
//! 4. **Scoped Names**: copied names become `<instance>-<name>` (prefix),
//!    `<name>-<instance>` (suffix) or stay unchanged. Names starting with `@` or
//!    `!` are never scoped.
//!
//! 5. **Breadth-First Rounds**: references copied in by one round are expanded by
//!    the next. References left after `recursion_limit` rounds are an error
//!    (COLLAPSE-E001).
//!
//! 6. **Proxy Routing**: signals crossing an instance boundary
//!    (`instance:<name>;<action>`) are routed through the instance's
//!    `func_instance_io_proxy` tables. Unmatched signals are not an error.

use std::path::Path;

pub mod cache;
pub mod collapse;
pub mod diagnostics;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod filesys;
pub mod frame;
pub mod keyvalues;
pub mod manifest;
pub mod output;
pub mod proxy;
pub mod schema;
pub mod scope;

#[cfg(test)]
mod collapse_tests;

pub use collapse::{
    collapse_all, collapse_one, CollapseOptions, CollapseReport, Collapser, Instance,
    VisgroupMode,
};
pub use document::{Document, Entity, EntityHandle, IdRemap};
pub use error::{CollapseError, ParseError, Result};
pub use filesys::{
    instance_search_paths, FileSystem, FileSystemChain, MemoryFileSystem, RawFileSystem,
};
pub use frame::{Angle, Frame, Matrix, Vec3};
pub use output::Output;
pub use proxy::{ParameterDeclaration, RoutedSubDocument};
pub use schema::{Schema, ValueType};
pub use scope::FixupStyle;

/// Load a map (`.vmf`) or manifest (`.vmm`) from disk and collapse every instance in it.
pub fn collapse_path(input: &Path, options: &CollapseOptions) -> Result<(Document, CollapseReport)> {
    let schema = match &options.schema_path {
        Some(path) => Schema::load(path)?,
        None => Schema::builtin()?,
    };
    let mut fsys = instance_search_paths(input);
    for path in &options.search_paths {
        fsys.add_sys(RawFileSystem::new(path));
    }

    let source = std::fs::read_to_string(input).map_err(|source| CollapseError::Io {
        path: input.display().to_string(),
        source,
    })?;
    let file_name = input.display().to_string();
    let is_manifest = input
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("vmm"));

    let mut collapser = Collapser::new(&fsys, &schema, options.clone());
    let mut doc = if is_manifest {
        let entries = manifest::parse_manifest(&source, &file_name)?;
        log::info!("Merging {} sub-maps from {}", entries.len(), file_name);
        collapser.merge_manifest(&entries)?
    } else {
        Document::parse(&source, &file_name)?
    };
    let report = collapser.collapse_all(&mut doc)?;
    log::info!(
        "Collapsed {} instances in {} rounds",
        report.instances_collapsed,
        report.rounds
    );
    Ok((doc, report))
}
