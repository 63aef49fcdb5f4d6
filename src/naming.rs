//! Device-name decomposition and the prefix/type consistency rule.
//!
//! Two naming regimes coexist in the source system: the legacy
//! `Type:Name` convention and the newer bare `Name`. Both decompose into an
//! optional prefix and a core device identifier.

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NameParts {
    pub prefix: Option<String>,
    pub core: Option<String>,
}

/// Splits on the first `separator`; both halves are trimmed.
///
/// Blank input yields no prefix and no core. An empty half after the split is
/// reported as `None` rather than an empty string.
pub fn decompose(full_name: Option<&str>, separator: char) -> NameParts {
    let Some(raw) = full_name else {
        return NameParts::default();
    };
    match raw.split_once(separator) {
        Some((prefix, core)) => NameParts {
            prefix: non_empty(prefix),
            core: non_empty(core),
        },
        None => NameParts {
            prefix: None,
            core: non_empty(raw),
        },
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Whether a name prefix agrees with the declared CI type.
///
/// Case-insensitive: either string contains the other, or any whitespace
/// token of the prefix occurs inside the type (`"AIX"` vs `"AIX Server"`).
pub fn prefix_matches_type(prefix: &str, ci_type: &str) -> bool {
    let prefix = prefix.trim().to_uppercase();
    let ci_type = ci_type.trim().to_uppercase();
    if prefix.is_empty() || ci_type.is_empty() {
        return false;
    }
    ci_type.contains(&prefix)
        || prefix.contains(&ci_type)
        || prefix
            .split_whitespace()
            .any(|word| ci_type.contains(word))
}

/// Informational flag: a prefix is present and does not agree with the type.
pub fn type_mismatch(prefix: Option<&str>, ci_type: &str) -> bool {
    match prefix {
        Some(prefix) => !prefix_matches_type(prefix, ci_type),
        None => false,
    }
}
