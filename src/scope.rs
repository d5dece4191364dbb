//! Name scoping for collapsed instances.
//!
//! Every entity name copied out of an instance is qualified with the instance's
//! own name so two copies of the same file never collide, and `$variable`
//! markers are replaced with the values the instance was placed with.

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref VARIABLE_RE: Regex = Regex::new(r"\$([A-Za-z0-9_]+)").unwrap();
}

/// How copied names are qualified with the instance name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FixupStyle {
    #[default]
    Prefix,
    Suffix,
    None,
}

impl FixupStyle {
    /// Parse the numeric `fixup_style` keyvalue (`0`, `1` or `2`).
    pub fn from_keyvalue(value: &str) -> Option<FixupStyle> {
        match value.trim().parse::<i64>().ok()? {
            0 => Some(FixupStyle::Prefix),
            1 => Some(FixupStyle::Suffix),
            2 => Some(FixupStyle::None),
            _ => None,
        }
    }
}

/// `@name` and `!name` are global or engine-reserved and never scoped.
pub fn is_global_name(name: &str) -> bool {
    name.starts_with('@') || name.starts_with('!')
}

pub fn rename(name: &str, style: FixupStyle, instance_name: &str) -> String {
    if name.is_empty() || is_global_name(name) {
        return name.to_string();
    }
    match style {
        FixupStyle::None => name.to_string(),
        FixupStyle::Prefix => format!("{}-{}", instance_name, name),
        FixupStyle::Suffix => format!("{}-{}", name, instance_name),
    }
}

/// Values starting with one of these are literals, not entity names.
pub fn is_literal_value(value: &str) -> bool {
    value
        .chars()
        .next()
        .is_some_and(|c| matches!(c, '@' | '!' | '-' | '.') || c.is_ascii_digit())
}

// ═══════════════════════════════════════════════════════════════════════════════
// INSTANCE VARIABLES
// ═══════════════════════════════════════════════════════════════════════════════

/// One `replaceNN` entry: `"$name value"`.
#[derive(Debug, Clone, PartialEq)]
pub struct FixupValue {
    pub name: String,
    pub value: String,
    pub index: u32,
}

/// Ordered, case-insensitive table of `$variable` values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InstanceVars {
    vars: IndexMap<String, FixupValue>,
}

impl InstanceVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(&name.trim_start_matches('$').to_lowercase())
            .map(|v| v.value.as_str())
    }

    /// Set a variable, keeping its slot if it already exists.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let name = name.trim_start_matches('$');
        let folded = name.to_lowercase();
        if let Some(existing) = self.vars.get_mut(&folded) {
            existing.value = value.into();
            return;
        }
        let index = self.vars.values().map(|v| v.index).max().unwrap_or(0) + 1;
        self.insert(FixupValue {
            name: name.to_string(),
            value: value.into(),
            index,
        });
    }

    pub fn insert(&mut self, fixup: FixupValue) {
        self.vars.insert(fixup.name.to_lowercase(), fixup);
    }

    pub fn iter(&self) -> impl Iterator<Item = &FixupValue> {
        self.vars.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut FixupValue> {
        self.vars.values_mut()
    }

    /// Replace `$name` markers, consulting `fallback` for names this table does
    /// not define. The longest known name wins, so `$target_relay` with only
    /// `$target` declared keeps its `_relay` tail. Markers no one knows become `""`.
    pub fn substitute_with<'a, F>(&self, text: &str, fallback: F) -> String
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        if !text.contains('$') {
            return text.to_string();
        }
        VARIABLE_RE
            .replace_all(text, |caps: &Captures| {
                let run = &caps[1];
                // The run is ASCII, so every byte offset is a boundary.
                (1..=run.len())
                    .rev()
                    .find_map(|end| {
                        let name = &run[..end];
                        let value = self
                            .get(name)
                            .map(str::to_string)
                            .or_else(|| fallback(name).map(str::to_string))?;
                        Some(format!("{}{}", value, &run[end..]))
                    })
                    .unwrap_or_default()
            })
            .into_owned()
    }

    pub fn substitute(&self, text: &str) -> String {
        self.substitute_with(text, |_| None)
    }
}
