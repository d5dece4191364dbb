//! End-to-end collapse tests
//!
//! Each test builds a small map plus the instance files it references in a
//! `MemoryFileSystem` and checks the collapsed result.

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use pretty_assertions::assert_eq;

    use crate::collapse::{collapse_all, collapse_one, CollapseOptions, Instance, VisgroupMode};
    use crate::diagnostics::CollapseLog;
    use crate::document::{Document, Entity};
    use crate::error::{CollapseError, Result};
    use crate::filesys::MemoryFileSystem;
    use crate::frame::{Angle, Frame, Vec3};
    use crate::proxy::RoutedSubDocument;
    use crate::schema::Schema;
    use crate::scope::FixupStyle;
    use crate::CollapseReport;

    const KIT: &str = r#"
visgroups
{
	visgroup
	{
		"name" "Detail"
		"visgroupid" "3"
		"color" "0 128 255"
	}
}
world
{
	"id" "1"
	"classname" "worldspawn"
	solid
	{
		"id" "2"
		side
		{
			"id" "3"
			"plane" "(0 0 0) (0 64 0) (64 64 0)"
			"material" "BRICK/WALL01"
			"uaxis" "[1 0 0 0] 0.25"
			"vaxis" "[0 -1 0 0] 0.25"
		}
		side
		{
			"id" "4"
			"plane" "(0 64 64) (0 0 64) (64 0 64)"
			"material" "BRICK/WALL01"
			"uaxis" "[1 0 0 0] 0.25"
			"vaxis" "[0 -1 0 0] 0.25"
		}
		editor
		{
			"visgroupid" "3"
			"visgroupshown" "1"
		}
	}
}
entity
{
	"id" "5"
	"classname" "prop_dynamic"
	"targetname" "crate"
	"origin" "16 32 8"
	"angles" "0 45 0"
	"model" "models/props/crate.mdl"
	"lightingorigin" "crate_light"
}
entity
{
	"id" "6"
	"classname" "info_overlay"
	"targetname" "decal"
	"origin" "0 0 0"
	"sides" "4 3 99"
}
entity
{
	"id" "7"
	"classname" "info_target"
	"targetname" "switched_off"
	editor
	{
		"visgroupshown" "0"
	}
}
hidden
{
	entity
	{
		"id" "8"
		"classname" "info_target"
		"targetname" "hidden_one"
	}
}
"#;

    const MAIN_IDENTITY: &str = r#"
world
{
	"id" "1"
	"classname" "worldspawn"
}
entity
{
	"id" "2"
	"classname" "func_instance"
	"targetname" "kit"
	"file" "instances/kit.vmf"
	"origin" "0 0 0"
	"angles" "0 0 0"
	"fixup_style" "2"
}
"#;

    const MAIN_ROTATED: &str = r#"
world
{
	"id" "1"
	"classname" "worldspawn"
}
entity
{
	"id" "2"
	"classname" "func_instance"
	"targetname" "kit"
	"file" "instances/kit.vmf"
	"origin" "100 0 0"
	"angles" "0 90 0"
}
"#;

    const MAIN_PROXY: &str = r#"
world
{
	"id" "1"
	"classname" "worldspawn"
}
entity
{
	"id" "2"
	"classname" "logic_relay"
	"targetname" "starter"
	connections
	{
		"OnTrigger" "btn,instance:door;Open,,1,1"
		"OnSpawn" "btn,instance:door;Unknown,,0,-1"
	}
}
entity
{
	"id" "3"
	"classname" "func_instance"
	"targetname" "btn"
	"file" "button.vmf"
	"origin" "0 0 0"
	connections
	{
		"instance:door;OnFullyOpen" "lamp,TurnOn,,1,-1"
		"instance:door;OnMissing" "lamp,TurnOff,,0,-1"
		"OnUser1" "lamp,Toggle,,0,-1"
	}
}
entity
{
	"id" "4"
	"classname" "light"
	"targetname" "lamp"
	"origin" "0 0 64"
}
"#;

    const BUTTON: &str = r#"
entity
{
	"id" "2"
	"classname" "func_instance_io_proxy"
	"targetname" "proxy"
	"origin" "0 0 0"
	connections
	{
		"OnProxyRelay" "door,Open,,0.5,2"
	}
}
entity
{
	"id" "3"
	"classname" "func_door"
	"targetname" "door"
	connections
	{
		"OnFullyOpen" "proxy,ProxyRelay,,0.5,1"
		"OnFullyClosed" "sound,PlaySound,,0,-1"
	}
}
"#;

    const MAIN_VARS: &str = r#"
entity
{
	"id" "2"
	"classname" "func_instance"
	"targetname" "lamp1"
	"file" "lamp.vmf"
	"replace01" "$color 255 128 0"
	"replace02" "$target door"
}
"#;

    const LAMP: &str = r#"
entity
{
	"id" "2"
	"classname" "func_instance_parms"
	"parm1" "$color color255 255 255 255"
	"parm2" "$brightness integer 200"
	"parm3" "$target target_destination"
}
entity
{
	"id" "3"
	"classname" "light"
	"targetname" "bulb"
	"origin" "0 0 0"
	"_light" "$color $brightness"
	"_lighthdr" "$undeclared"
	connections
	{
		"OnUser1" "$target,Open,,0,-1"
		"OnUser2" "@global_relay,Trigger,,0,-1"
	}
}
"#;

    const MAIN_NESTED: &str = r#"
entity
{
	"id" "2"
	"classname" "func_instance"
	"file" "outer.vmf"
	"origin" "0 0 0"
}
"#;

    const OUTER: &str = r#"
entity
{
	"id" "2"
	"classname" "func_instance"
	"targetname" "inner"
	"file" "inner.vmf"
	"origin" "0 0 32"
}
entity
{
	"id" "3"
	"classname" "info_target"
	"targetname" "marker"
	"origin" "0 0 0"
}
"#;

    const INNER: &str = r#"
entity
{
	"id" "2"
	"classname" "info_target"
	"targetname" "core"
	"origin" "8 0 0"
}
"#;

    const LOOP: &str = r#"
entity
{
	"id" "2"
	"classname" "func_instance"
	"targetname" "again"
	"file" "loop.vmf"
	"origin" "0 0 0"
}
"#;

    fn files() -> MemoryFileSystem {
        MemoryFileSystem::new()
            .with_file("instances/kit.vmf", KIT)
            .with_file("button.vmf", BUTTON)
            .with_file("lamp.vmf", LAMP)
            .with_file("outer.vmf", OUTER)
            .with_file("inner.vmf", INNER)
            .with_file("loop.vmf", LOOP)
    }

    fn run(main: &str, options: CollapseOptions) -> Result<(Document, CollapseReport)> {
        let fs = files();
        let schema = Schema::builtin()?;
        let mut doc = Document::parse(main, "main.vmf")?;
        let report = collapse_all(&mut doc, &fs, &schema, &options)?;
        Ok((doc, report))
    }

    fn named<'a>(doc: &'a Document, name: &str) -> &'a Entity {
        doc.entities()
            .find(|e| e.targetname() == name)
            .unwrap_or_else(|| panic!("no entity named {name}"))
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // PLACEMENT AND NAMING
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_identity_with_no_fixup_preserves_values() {
        let (doc, report) = run(MAIN_IDENTITY, CollapseOptions::default()).unwrap();
        assert_eq!(report.instances_collapsed, 1);
        assert!(doc.by_class("func_instance").is_empty());

        let crate_ent = named(&doc, "crate");
        assert_eq!(crate_ent.get("origin"), Some("16 32 8"));
        assert_eq!(crate_ent.get("angles"), Some("0 45 0"));
        assert_eq!(crate_ent.get("lightingorigin"), Some("crate_light"));
        assert_eq!(crate_ent.get("model"), Some("models/props/crate.mdl"));

        let brush = &doc.brushes()[0];
        assert_eq!(brush.sides[0].plane[1], Vec3::new(0.0, 64.0, 0.0));
        assert_eq!(brush.sides[0].uaxis.to_string(), "[1 0 0 0] 0.25");
    }

    #[test]
    fn test_rotated_placement_moves_everything() {
        let (doc, _) = run(MAIN_ROTATED, CollapseOptions::default()).unwrap();
        let crate_ent = named(&doc, "kit-crate");
        assert_eq!(crate_ent.get("origin"), Some("68 16 8"));
        assert_eq!(crate_ent.get("angles"), Some("0 135 0"));
        assert_eq!(crate_ent.get("lightingorigin"), Some("kit-crate_light"));
        assert_eq!(crate_ent.get("model"), Some("models/props/crate.mdl"));
        assert_eq!(doc.brushes()[0].sides[0].plane[0], Vec3::new(100.0, 0.0, 0.0));
    }

    #[test]
    fn test_hidden_and_invisible_entities_are_not_copied() {
        let (doc, _) = run(MAIN_IDENTITY, CollapseOptions::default()).unwrap();
        let names: Vec<&str> = doc.entities().map(|e| e.targetname()).collect();
        assert_eq!(names, vec!["crate", "decal"]);
    }

    #[test]
    fn test_overlay_sides_follow_copied_faces() {
        let (doc, _) = run(MAIN_IDENTITY, CollapseOptions::default()).unwrap();
        let faces: Vec<u32> = doc.brushes()[0].sides.iter().map(|s| s.id).collect();
        let mut expected = faces.clone();
        expected.sort_unstable();
        let expected: Vec<String> = expected.iter().map(u32::to_string).collect();
        assert_eq!(named(&doc, "decal").get("sides"), Some(expected.join(" ").as_str()));
    }

    #[test]
    fn test_variables_and_parameter_defaults() {
        let (doc, _) = run(MAIN_VARS, CollapseOptions::default()).unwrap();
        assert!(doc.by_class("func_instance_parms").is_empty());
        let bulb = named(&doc, "lamp1-bulb");
        assert_eq!(bulb.get("_light"), Some("255 128 0 200"));
        assert_eq!(bulb.get("_lighthdr"), Some(""));
        assert_eq!(bulb.outputs[0].target, "lamp1-door");
        assert_eq!(bulb.outputs[1].target, "@global_relay");
    }

    #[test]
    fn test_nested_instances_and_auto_names() {
        let (doc, report) = run(MAIN_NESTED, CollapseOptions::default()).unwrap();
        assert_eq!(report.rounds, 2);
        assert_eq!(report.instances_collapsed, 2);
        assert_eq!(report.max_depth, 2);
        assert_eq!(named(&doc, "InstanceAuto1-marker").get("origin"), Some("0 0 0"));
        let core = named(&doc, "InstanceAuto1-inner-core");
        assert_eq!(core.get("origin"), Some("8 0 32"));
    }

    #[test]
    fn test_instance_variables_on_nested_references_are_scoped() {
        let schema = Schema::builtin().unwrap();
        let mut file = Document::new();
        let mut nested = Entity::new("func_instance");
        nested.set("targetname", "sub");
        nested.set("file", "inner.vmf");
        nested.fixup.set("target", "door");
        nested.fixup.set("count", "3");
        nested.fixup.set("global", "@relay");
        file.add_entity(nested);
        let file = RoutedSubDocument::route(file);

        let mut doc = Document::new();
        let inst = Instance::new("outer", "file.vmf", Frame::identity(), FixupStyle::Prefix);
        let mut log = CollapseLog::new();
        collapse_one(&mut doc, &inst, &file, &schema, &VisgroupMode::Strip, &mut log);

        let copy = named(&doc, "outer-sub");
        assert_eq!(copy.fixup.get("target"), Some("outer-door"));
        assert_eq!(copy.fixup.get("count"), Some("3"));
        assert_eq!(copy.fixup.get("global"), Some("@relay"));
        assert_eq!(copy.recursion_depth, 1);
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // NO-OP, IDS AND LIMITS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_no_references_leaves_document_unchanged() {
        let fs = files();
        let schema = Schema::builtin().unwrap();
        let mut doc = Document::parse(KIT, "kit.vmf").unwrap();
        let before = doc.export();
        let report =
            collapse_all(&mut doc, &fs, &schema, &CollapseOptions::default()).unwrap();
        assert_eq!(report.rounds, 0);
        assert_eq!(report.instances_collapsed, 0);
        assert_eq!(doc.export(), before);
    }

    #[test]
    fn test_copied_ids_are_fresh_and_disjoint() {
        let schema = Schema::builtin().unwrap();
        let file = RoutedSubDocument::route(Document::parse(KIT, "kit.vmf").unwrap());
        // The destination already uses the same ids as the instance file.
        let mut doc = Document::parse(KIT, "main.vmf").unwrap();

        let existing_entities: HashSet<u32> = doc.entities().map(|e| e.id).collect();
        let existing_solids: HashSet<u32> = doc.brushes().iter().map(|s| s.id).collect();
        let existing_faces: HashSet<u32> = doc
            .brushes()
            .iter()
            .flat_map(|s| s.sides.iter().map(|side| side.id))
            .collect();

        let inst = Instance::new(
            "copy",
            "kit.vmf",
            Frame::new(Vec3::new(0.0, 0.0, 128.0), Angle::default()),
            FixupStyle::Prefix,
        );
        let mut log = CollapseLog::new();
        let remap = collapse_one(&mut doc, &inst, &file, &schema, &VisgroupMode::Keep, &mut log);

        let copied_entities: HashSet<u32> = file
            .tree
            .entities()
            .filter(|e| e.is_visible())
            .map(|e| e.id)
            .collect();
        assert_eq!(remap.entities.keys().copied().collect::<HashSet<_>>(), copied_entities);
        assert_eq!(remap.solids.keys().copied().collect::<Vec<_>>(), vec![2]);
        assert_eq!(remap.faces.keys().copied().collect::<HashSet<_>>(), HashSet::from([3, 4]));

        let new_entities: HashSet<u32> = remap.entities.values().copied().collect();
        let new_faces: HashSet<u32> = remap.faces.values().copied().collect();
        assert_eq!(new_entities.len(), remap.entities.len());
        assert!(new_entities.is_disjoint(&existing_entities));
        assert!(remap.solids.values().all(|id| !existing_solids.contains(id)));
        assert!(new_faces.is_disjoint(&existing_faces));
        assert!(!remap.visgroups.values().any(|id| *id == 3));
    }

    #[test]
    fn test_self_reference_fails_after_round_limit() {
        for limit in 1..=4 {
            let options = CollapseOptions {
                recursion_limit: limit,
                ..Default::default()
            };
            match run(LOOP, options) {
                Err(CollapseError::RecursionLimit {
                    limit: reported,
                    remaining,
                    example,
                }) => {
                    assert_eq!(reported, limit);
                    assert_eq!(remaining, 1);
                    assert_eq!(example, "loop.vmf");
                }
                other => panic!("expected recursion error, got {:?}", other.map(|_| ())),
            }
        }
    }

    #[test]
    fn test_depth_equal_to_limit_succeeds() {
        let ok = CollapseOptions {
            recursion_limit: 2,
            ..Default::default()
        };
        assert!(run(MAIN_NESTED, ok).is_ok());
        let short = CollapseOptions {
            recursion_limit: 1,
            ..Default::default()
        };
        assert!(matches!(
            run(MAIN_NESTED, short),
            Err(CollapseError::RecursionLimit { .. })
        ));
    }

    #[test]
    fn test_missing_instance_file_is_fatal() {
        let main = "entity { \"id\" \"2\" \"classname\" \"func_instance\" \"file\" \"nowhere.vmf\" }";
        assert!(matches!(
            run(main, CollapseOptions::default()),
            Err(CollapseError::MissingFile { .. })
        ));
    }

    #[test]
    fn test_sequential_preload_matches_parallel() {
        let serial = CollapseOptions {
            parallel_preload: false,
            ..Default::default()
        };
        let (a, _) = run(MAIN_NESTED, serial).unwrap();
        let (b, _) = run(MAIN_NESTED, CollapseOptions::default()).unwrap();
        assert_eq!(a.export(), b.export());
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // PROXIES
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_inbound_signal_is_rerouted_through_proxy() {
        let (doc, _) = run(MAIN_PROXY, CollapseOptions::default()).unwrap();
        let starter = named(&doc, "starter");
        let routed = &starter.outputs[0];
        assert_eq!(routed.target, "btn-door");
        assert_eq!(routed.input, "Open");
        assert_eq!(routed.inst_in, None);
        assert_eq!(routed.delay, 1.5);
        assert_eq!(routed.times, 1);

        // No proxy input for this one: left for someone else to claim.
        let unmatched = &starter.outputs[1];
        assert_eq!(unmatched.target, "btn");
        assert_eq!(unmatched.inst_in.as_deref(), Some("door"));
    }

    #[test]
    fn test_outbound_signal_is_attached_to_internal_entity() {
        let (doc, _) = run(MAIN_PROXY, CollapseOptions::default()).unwrap();
        assert!(doc.by_class("func_instance_io_proxy").is_empty());
        let door = named(&doc, "btn-door");
        assert_eq!(door.outputs.len(), 2);
        assert_eq!(door.outputs[0].output, "OnFullyClosed");
        assert_eq!(door.outputs[0].target, "btn-sound");

        let merged = &door.outputs[1];
        assert_eq!(merged.output, "OnFullyOpen");
        assert_eq!(merged.target, "lamp");
        assert_eq!(merged.input, "TurnOn");
        assert_eq!(merged.delay, 1.5);
        assert_eq!(merged.times, 1);
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // VISGROUPS AND WARNINGS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_visgroups_stripped_by_default() {
        let (doc, _) = run(MAIN_IDENTITY, CollapseOptions::default()).unwrap();
        assert!(doc.vis_tree.is_empty());
        assert!(doc.brushes()[0].editor.visgroup_ids.is_empty());
    }

    #[test]
    fn test_visgroups_kept() {
        let options = CollapseOptions {
            visgroups: VisgroupMode::Keep,
            ..Default::default()
        };
        let (doc, _) = run(MAIN_IDENTITY, options).unwrap();
        assert_eq!(doc.vis_tree.len(), 1);
        let group = &doc.vis_tree[0];
        assert_eq!(group.name, "Detail");
        assert_eq!(
            doc.brushes()[0].editor.visgroup_ids.iter().copied().collect::<Vec<_>>(),
            vec![group.id]
        );
        assert!(named(&doc, "crate").editor.visgroup_ids.is_empty());
    }

    #[test]
    fn test_visgroups_nested_under_named_group() {
        let options = CollapseOptions {
            visgroups: VisgroupMode::Nest("Collapsed".to_string()),
            ..Default::default()
        };
        let (doc, _) = run(MAIN_IDENTITY, options).unwrap();
        assert_eq!(doc.vis_tree.len(), 1);
        let parent = &doc.vis_tree[0];
        assert_eq!(parent.name, "Collapsed");
        assert_eq!(parent.children[0].name, "Detail");
        // Ungrouped entities land in the parent group.
        assert_eq!(
            named(&doc, "crate").editor.visgroup_ids.iter().copied().collect::<Vec<_>>(),
            vec![parent.id]
        );
    }

    #[test]
    fn test_unknown_keyvalue_warns_once_and_is_left_alone() {
        let file = "entity { \"id\" \"2\" \"classname\" \"info_target\" \"targetname\" \"t\" \"wibble\" \"$x\" }";
        let main = r#"
entity { "id" "2" "classname" "func_instance" "targetname" "a" "file" "odd.vmf" }
entity { "id" "3" "classname" "func_instance" "targetname" "b" "file" "odd.vmf" }
"#;
        let fs = MemoryFileSystem::new().with_file("odd.vmf", file);
        let schema = Schema::builtin().unwrap();
        let mut doc = Document::parse(main, "main.vmf").unwrap();
        let report = collapse_all(&mut doc, &fs, &schema, &CollapseOptions::default()).unwrap();
        assert_eq!(report.warnings, 1);
        assert_eq!(named(&doc, "a-t").get("wibble"), Some("$x"));
        assert_eq!(named(&doc, "b-t").get("wibble"), Some("$x"));
    }

    #[test]
    fn test_negative_pitch_type_on_other_field_is_skipped() {
        let schema = Schema::from_json(
            r#"{ "entities": {
                "_CBaseEntity_": { "base": true, "keyvalues": { "targetname": "target_source" } },
                "thing": { "bases": ["_CBaseEntity_"], "keyvalues": { "tilt": "angle_negative_pitch", "aim": "angle" } }
            } }"#,
        )
        .unwrap();
        let mut file = Document::new();
        let mut ent = Entity::new("thing");
        ent.set("tilt", "0 10 0");
        ent.set("aim", "0 10 0");
        file.add_entity(ent);
        let file = RoutedSubDocument::route(file);

        let mut doc = Document::new();
        let inst = Instance::new(
            "i",
            "thing.vmf",
            Frame::new(Vec3::ZERO, Angle::new(0.0, 90.0, 0.0)),
            FixupStyle::Prefix,
        );
        let mut log = CollapseLog::new();
        collapse_one(&mut doc, &inst, &file, &schema, &VisgroupMode::Strip, &mut log);
        let copy = doc.entities().next().unwrap();
        assert_eq!(copy.get("tilt"), Some("0 10 0"));
        assert_eq!(copy.get("aim"), Some("0 100 0"));
        assert_eq!(log.warning_count(), 1);
    }

    #[test]
    fn test_instance_variable_type_on_other_field_is_skipped() {
        let schema = Schema::from_json(
            r#"{ "entities": {
                "_CBaseEntity_": { "base": true, "keyvalues": { "targetname": "target_source" } },
                "thing": { "bases": ["_CBaseEntity_"], "keyvalues": { "label": "instance_variable" } }
            } }"#,
        )
        .unwrap();
        let mut file = Document::new();
        let mut ent = Entity::new("thing");
        ent.set("label", "$colour red");
        file.add_entity(ent);
        let file = RoutedSubDocument::route(file);

        let mut doc = Document::new();
        let mut inst = Instance::new("i", "thing.vmf", Frame::identity(), FixupStyle::Prefix);
        inst.fixup.set("colour", "blue");
        let mut log = CollapseLog::new();
        collapse_one(&mut doc, &inst, &file, &schema, &VisgroupMode::Strip, &mut log);
        collapse_one(&mut doc, &inst, &file, &schema, &VisgroupMode::Strip, &mut log);

        for copy in doc.entities() {
            assert_eq!(copy.get("label"), Some("$colour red"));
        }
        assert_eq!(log.warning_count(), 1);
    }

    #[test]
    fn test_hidden_world_brushes_are_not_copied() {
        let source = r#"
world
{
	"id" "1"
	"classname" "worldspawn"
	solid
	{
		"id" "2"
		side { "id" "3" "plane" "(0 0 0) (0 64 0) (64 64 0)" "material" "A" }
	}
	solid
	{
		"id" "10"
		side { "id" "11" "plane" "(0 0 0) (0 64 0) (64 64 0)" "material" "B" }
		editor { "visgroupshown" "0" }
	}
	hidden
	{
		solid
		{
			"id" "20"
			side { "id" "21" "plane" "(0 0 0) (0 64 0) (64 64 0)" "material" "C" }
		}
	}
}
"#;
        let schema = Schema::builtin().unwrap();
        let file = RoutedSubDocument::route(Document::parse(source, "brushes.vmf").unwrap());
        assert_eq!(file.tree.brushes().len(), 3);

        let mut doc = Document::new();
        let inst = Instance::new("b", "brushes.vmf", Frame::identity(), FixupStyle::Prefix);
        let mut log = CollapseLog::new();
        let remap = collapse_one(&mut doc, &inst, &file, &schema, &VisgroupMode::Keep, &mut log);

        assert_eq!(doc.brushes().len(), 1);
        assert_eq!(doc.brushes()[0].sides[0].material, "A");
        assert_eq!(remap.solids.keys().copied().collect::<Vec<_>>(), vec![2]);
        assert_eq!(remap.faces.keys().copied().collect::<Vec<_>>(), vec![3]);
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // MANIFESTS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_manifest_and_instances_share_one_warning_log() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, text: &str| {
            std::fs::write(dir.path().join(name), text).unwrap();
        };
        write(
            "level.vmm",
            r#"Maps { VMF { "Name" "base" "File" "base.vmf" "InternalID" "1" "TopLevel" "1" } }"#,
        );
        write(
            "base.vmf",
            r#"
entity { "id" "2" "classname" "info_target" "targetname" "t" "wibble" "1" "wobble" "2" }
entity { "id" "3" "classname" "func_instance" "targetname" "i" "file" "odd.vmf" }
"#,
        );
        write(
            "odd.vmf",
            r#"entity { "id" "2" "classname" "info_target" "targetname" "t" "wibble" "3" }"#,
        );

        let (doc, report) =
            crate::collapse_path(&dir.path().join("level.vmm"), &CollapseOptions::default())
                .unwrap();
        assert_eq!(report.instances_collapsed, 1);
        // wibble is seen in both the sub-map and the instance, wobble only in the sub-map.
        assert_eq!(report.warnings, 2);
        assert_eq!(named(&doc, "t").get("wibble"), Some("1"));
        assert_eq!(named(&doc, "i-t").get("wibble"), Some("3"));
    }
}
