//! The per-tool/event-type base-importance table.

use std::collections::HashMap;

/// Maps a tool name or frame-type label to a base importance in `[0, 1]`.
/// Loaded once per process and shared across every `Scorer::score` call.
#[derive(Debug, Clone)]
pub struct ImportanceTable {
    weights: HashMap<String, f64>,
    unknown: f64,
}

impl ImportanceTable {
    /// The built-in table.
    pub fn default_table() -> Self {
        let mut weights = HashMap::new();
        weights.insert("search".to_string(), 0.95);
        weights.insert("decision_recording".to_string(), 0.90);
        weights.insert("write_new_file".to_string(), 0.75);
        weights.insert("edit".to_string(), 0.50);
        weights.insert("read".to_string(), 0.25);
        ImportanceTable {
            weights,
            unknown: 0.3,
        }
    }

    /// Look up a key's base weight, falling back to the unknown-type weight.
    pub fn lookup(&self, key: &str) -> f64 {
        self.weights.get(key).copied().unwrap_or(self.unknown)
    }

    /// Insert or override an entry. Lets a host tune the table without
    /// forking the defaults.
    pub fn set(&mut self, key: impl Into<String>, weight: f64) {
        self.weights.insert(key.into(), weight.clamp(0.0, 1.0));
    }
}

impl Default for ImportanceTable {
    fn default() -> Self {
        Self::default_table()
    }
}
