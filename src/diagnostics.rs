//! Run-scoped warning de-duplication.

use std::collections::HashSet;

/// One per collapse run. Warnings about a `(classname, field)` pair are only
/// emitted the first time they are seen.
#[derive(Debug, Default)]
pub struct CollapseLog {
    warned: HashSet<(String, String)>,
}

impl CollapseLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log `message` at warn level unless this pair already warned. Returns
    /// whether it was logged.
    pub fn warn_once(&mut self, classname: &str, field: &str, message: impl FnOnce() -> String) -> bool {
        let key = (classname.to_lowercase(), field.to_lowercase());
        if self.warned.contains(&key) {
            return false;
        }
        log::warn!("{}", message());
        self.warned.insert(key);
        true
    }

    pub fn warning_count(&self) -> usize {
        self.warned.len()
    }
}
