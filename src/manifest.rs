//! Map manifests (`.vmm`): a list of sub-maps edited separately and merged
//! into one map before compiling.
//!
//! ```text
//! Maps
//! {
//!     VMF { "Name" "lighting" "File" "level/lighting.vmf" "InternalID" "2" "TopLevel" "0" }
//! }
//! ```

use serde::Serialize;

use crate::collapse::{collapse_one, Instance, VisgroupMode};
use crate::diagnostics::CollapseLog;
use crate::document::Document;
use crate::error::{CollapseError, Result};
use crate::filesys::FileSystem;
use crate::frame::Frame;
use crate::keyvalues;
use crate::proxy::RoutedSubDocument;
use crate::schema::Schema;
use crate::scope::FixupStyle;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestEntry {
    pub name: String,
    pub file: String,
    pub internal_id: i64,
    /// Supplies the worldspawn keyvalues of the merged map.
    pub top_level: bool,
}

impl ManifestEntry {
    /// Sub-maps are merged in place with their names untouched.
    pub fn to_instance(&self) -> Instance {
        Instance::new(&self.name, &self.file, Frame::identity(), FixupStyle::None)
    }
}

pub fn parse_manifest(source: &str, file: &str) -> Result<Vec<ManifestEntry>> {
    let root = keyvalues::parse(source, file)?;
    let mut entries = Vec::new();
    for maps in root.find_all("Maps") {
        for vmf in maps.find_all("VMF") {
            let name = vmf.get_or("Name", "");
            let Some(path) = vmf.get("File").filter(|f| !f.trim().is_empty()) else {
                return Err(CollapseError::Manifest(format!(
                    "entry \"{}\" in {} has no File",
                    name, file
                )));
            };
            entries.push(ManifestEntry {
                name: name.to_string(),
                file: path.to_string(),
                internal_id: vmf.get_int("InternalID").unwrap_or(0),
                top_level: vmf.get_bool("TopLevel"),
            });
        }
    }
    Ok(entries)
}

/// Merge every sub-map into one document. Instances inside the sub-maps are
/// left in place for `collapse_all`.
pub fn merge_manifest(
    entries: &[ManifestEntry],
    fsys: &dyn FileSystem,
    schema: &Schema,
    visgroups: &VisgroupMode,
    log: &mut CollapseLog,
) -> Result<Document> {
    let mut merged = Document::new();
    for entry in entries {
        let source = fsys.read_to_string(&entry.file)?;
        let sub = Document::parse(&source, &entry.file)?;
        log::debug!("Merging sub-map \"{}\" ({})", entry.name, entry.file);
        if entry.top_level {
            for (key, value) in sub.world.keys.iter() {
                merged.world.set(key, value);
            }
        }
        let routed = RoutedSubDocument::route(sub);
        collapse_one(
            &mut merged,
            &entry.to_instance(),
            &routed,
            schema,
            visgroups,
            log,
        );
    }
    merged.compact();
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesys::MemoryFileSystem;

    const VMM: &str = r#"
versioninfo
{
	"editorversion" "400"
}
Maps
{
	VMF
	{
		"Name" "auto"
		"File" "level/auto.vmf"
		"InternalID" "1"
		"TopLevel" "1"
	}
	VMF
	{
		"Name" "lights"
		"File" "level/lights.vmf"
		"InternalID" "2"
		"TopLevel" "0"
	}
}
"#;

    const AUTO: &str = r#"
world
{
	"id" "1"
	"classname" "worldspawn"
	"skyname" "sky_day01_01"
	solid
	{
		"id" "2"
		side
		{
			"id" "3"
			"plane" "(0 0 0) (0 64 0) (64 64 0)"
			"material" "TOOLS/TOOLSNODRAW"
			"uaxis" "[1 0 0 0] 0.25"
			"vaxis" "[0 -1 0 0] 0.25"
		}
	}
}
entity
{
	"id" "4"
	"classname" "logic_auto"
	"origin" "32 0 0"
	connections
	{
		"OnMapSpawn" "lamp,TurnOn,,0,-1"
	}
}
"#;

    const LIGHTS: &str = r#"
world
{
	"id" "1"
	"classname" "worldspawn"
	"skyname" "ignored"
}
entity
{
	"id" "4"
	"classname" "light"
	"targetname" "lamp"
	"origin" "0 0 128"
}
"#;

    #[test]
    fn test_parse_manifest_entries() {
        let entries = parse_manifest(VMM, "level.vmm").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0],
            ManifestEntry {
                name: "auto".to_string(),
                file: "level/auto.vmf".to_string(),
                internal_id: 1,
                top_level: true,
            }
        );
        assert!(!entries[1].top_level);
    }

    #[test]
    fn test_entry_without_file_is_rejected() {
        let err = parse_manifest("Maps { VMF { \"Name\" \"x\" } }", "bad.vmm").unwrap_err();
        assert_eq!(err.code(), crate::error::ERR_MANIFEST);
    }

    #[test]
    fn test_merge_keeps_names_and_positions() {
        let fs = MemoryFileSystem::new()
            .with_file("level/auto.vmf", AUTO)
            .with_file("level/lights.vmf", LIGHTS);
        let schema = Schema::builtin().unwrap();
        let mut log = CollapseLog::new();
        let entries = parse_manifest(VMM, "level.vmm").unwrap();
        let merged =
            merge_manifest(&entries, &fs, &schema, &VisgroupMode::Strip, &mut log).unwrap();

        assert_eq!(merged.world.get("skyname"), Some("sky_day01_01"));
        assert_eq!(merged.brushes().len(), 1);
        assert_eq!(merged.entity_count(), 2);

        let lamp = merged.entity(merged.by_class("light")[0]).unwrap();
        assert_eq!(lamp.targetname(), "lamp");
        assert_eq!(lamp.get("origin"), Some("0 0 128"));
        let auto = merged.entity(merged.by_class("logic_auto")[0]).unwrap();
        assert_eq!(auto.outputs[0].target, "lamp");
        // Both sub-maps used entity id 4; the merged copies do not collide.
        assert_ne!(lamp.id, auto.id);
    }
}
