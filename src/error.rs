use std::path::PathBuf;

use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_RECURSION_LIMIT: &str = "COLLAPSE-E001";
pub const ERR_MISSING_FILE: &str = "COLLAPSE-E002";
pub const ERR_PARSE: &str = "COLLAPSE-E003";
pub const ERR_SCHEMA: &str = "COLLAPSE-E004";
pub const ERR_MANIFEST: &str = "COLLAPSE-E005";
pub const ERR_CONFIG: &str = "COLLAPSE-E006";

fn get_guarantee(code: &str) -> &'static str {
    match code {
        ERR_RECURSION_LIMIT => {
            "Instances nest at most `recursion_limit` levels deep and never reference themselves."
        }
        ERR_MISSING_FILE => "Every instance file referenced by the map can be read.",
        ERR_PARSE => "Every map and instance file is well-formed keyvalues text.",
        ERR_SCHEMA => "Entity schema files are valid JSON in the expected layout.",
        ERR_MANIFEST => "Every manifest entry names a map file.",
        ERR_CONFIG => "Option files only use known settings with valid values.",
        _ => "Unknown invariant.",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSE ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{file}:{line}:{column}: {message}")]
pub struct ParseError {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl ParseError {
    pub fn new(file: &str, line: u32, column: u32, message: impl Into<String>) -> Self {
        ParseError {
            file: file.to_string(),
            line,
            column,
            message: message.into(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLAPSE ERROR
// ═══════════════════════════════════════════════════════════════════════════════

/// Fatal conditions. Anything recoverable is logged instead.
#[derive(Debug, Error)]
pub enum CollapseError {
    #[error("Loop in instances: references remain after {limit} rounds ({remaining} left, e.g. \"{example}\")")]
    RecursionLimit {
        limit: u32,
        remaining: usize,
        example: String,
    },
    #[error("Instance file \"{path}\" could not be found (searched {searched:?})")]
    MissingFile { path: String, searched: Vec<PathBuf> },
    #[error("Failed to read \"{path}\": {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("Invalid schema: {0}")]
    Schema(String),
    #[error("Invalid manifest: {0}")]
    Manifest(String),
    #[error("Invalid options: {0}")]
    Config(String),
}

impl CollapseError {
    pub fn code(&self) -> &'static str {
        match self {
            CollapseError::RecursionLimit { .. } => ERR_RECURSION_LIMIT,
            CollapseError::MissingFile { .. } | CollapseError::Io { .. } => ERR_MISSING_FILE,
            CollapseError::Parse(_) => ERR_PARSE,
            CollapseError::Schema(_) => ERR_SCHEMA,
            CollapseError::Manifest(_) => ERR_MANIFEST,
            CollapseError::Config(_) => ERR_CONFIG,
        }
    }

    pub fn guarantee(&self) -> &'static str {
        get_guarantee(self.code())
    }
}

pub type Result<T, E = CollapseError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_have_guarantees() {
        let err = CollapseError::RecursionLimit {
            limit: 3,
            remaining: 1,
            example: "loop.vmf".to_string(),
        };
        assert_eq!(err.code(), ERR_RECURSION_LIMIT);
        assert_ne!(err.guarantee(), "Unknown invariant.");
        assert!(err.to_string().contains("3 rounds"));
    }

    #[test]
    fn test_parse_error_display() {
        let err: CollapseError = ParseError::new("a.vmf", 3, 7, "unexpected '}'").into();
        assert_eq!(err.code(), ERR_PARSE);
        assert_eq!(err.to_string(), "a.vmf:3:7: unexpected '}'");
    }
}
