//! Lowering configuration.

/// Knobs for a lowering run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LowerOptions {
    /// Check the lowered tree for leftover reducible nodes, yields, and
    /// jumps out of finally bodies.
    pub validate_output: bool,
    /// Suffix synthesized names with the context counter (`lightEh3`).
    pub debug_names: bool,
}

impl Default for LowerOptions {
    fn default() -> Self {
        Self {
            validate_output: cfg!(debug_assertions),
            debug_names: false,
        }
    }
}

impl LowerOptions {
    /// Defaults, overridden by `TERN_VALIDATE` and `TERN_DEBUG_NAMES`.
    ///
    /// Accepted values are `1`/`true` and `0`/`false`; anything else keeps
    /// the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            validate_output: flag(lookup("TERN_VALIDATE")).unwrap_or(defaults.validate_output),
            debug_names: flag(lookup("TERN_DEBUG_NAMES")).unwrap_or(defaults.debug_names),
        }
    }

    #[must_use]
    pub fn with_validation(mut self, validate_output: bool) -> Self {
        self.validate_output = validate_output;
        self
    }

    #[must_use]
    pub fn with_debug_names(mut self, debug_names: bool) -> Self {
        self.debug_names = debug_names;
        self
    }
}

fn flag(value: Option<String>) -> Option<bool> {
    match value?.trim() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_defaults() {
        let opts = LowerOptions::from_lookup(|key| match key {
            "TERN_VALIDATE" => Some("0".to_owned()),
            "TERN_DEBUG_NAMES" => Some("true".to_owned()),
            _ => None,
        });
        assert!(!opts.validate_output);
        assert!(opts.debug_names);
    }

    #[test]
    fn unrecognized_values_keep_defaults() {
        let opts = LowerOptions::from_lookup(|_| Some("maybe".to_owned()));
        assert_eq!(opts, LowerOptions::default());
    }
}
