/// Configuration for the history system.
use pixtile_config::EditorConfig;

/// Maximum number of undo entries kept before the oldest are evicted.
const DEFAULT_MAX_HISTORY_DEPTH: usize = 500;

/// Resident byte budget across both stacks before offloading kicks in.
const DEFAULT_MAX_RESIDENT_BYTES: usize = 64 * 1024 * 1024;

/// Most recent undo entries that are never offloaded.
const DEFAULT_KEEP_RESIDENT: usize = 8;

/// Limits applied by `UnifiedHistoryStack` after every push.
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Max undo entries; the oldest are evicted beyond this.
    pub max_history_depth: usize,
    /// Resident byte budget before older entries are offloaded.
    pub max_resident_bytes: usize,
    /// Number of newest undo entries that always stay resident.
    pub keep_resident: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_history_depth: DEFAULT_MAX_HISTORY_DEPTH,
            max_resident_bytes: DEFAULT_MAX_RESIDENT_BYTES,
            keep_resident: DEFAULT_KEEP_RESIDENT,
        }
    }
}

impl HistoryConfig {
    /// Unbounded configuration, used by tests and scripted sessions.
    pub fn unbounded() -> Self {
        Self {
            max_history_depth: usize::MAX,
            max_resident_bytes: usize::MAX,
            keep_resident: usize::MAX,
        }
    }
}

impl From<&EditorConfig> for HistoryConfig {
    fn from(config: &EditorConfig) -> Self {
        Self {
            max_history_depth: config.max_history_depth.max(1),
            max_resident_bytes: config.max_resident_history_bytes,
            keep_resident: config.keep_resident_entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HistoryConfig::default();
        assert_eq!(config.max_history_depth, 500);
        assert_eq!(config.max_resident_bytes, 64 * 1024 * 1024);
        assert_eq!(config.keep_resident, 8);
    }

    #[test]
    fn test_from_editor_config() {
        let editor = EditorConfig {
            max_history_depth: 12,
            max_resident_history_bytes: 1024,
            keep_resident_entries: 3,
            ..Default::default()
        };
        let config = HistoryConfig::from(&editor);
        assert_eq!(config.max_history_depth, 12);
        assert_eq!(config.max_resident_bytes, 1024);
        assert_eq!(config.keep_resident, 3);
    }
}
