//! Sync scheduling configuration section

use crate::validation::{ConfigSection, ValidationError, Validator};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// When and how the sync cycle runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncSettings {
    /// Seconds between automatic cycles, 0 disables automatic sync
    pub auto_sync_interval_secs: u64,

    /// Capacity of the sync event channel
    pub event_buffer: usize,
}

impl SyncSettings {
    /// Automatic sync period, `None` when disabled
    pub fn auto_sync_interval(&self) -> Option<Duration> {
        (self.auto_sync_interval_secs > 0).then(|| Duration::from_secs(self.auto_sync_interval_secs))
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            auto_sync_interval_secs: 300,
            event_buffer: 64,
        }
    }
}

impl ConfigSection for SyncSettings {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut results = vec![Validator::in_range(
            self.event_buffer,
            1,
            4096,
            "sync.event_buffer",
        )];

        if self.auto_sync_interval_secs != 0 {
            results.push(Validator::in_range(
                self.auto_sync_interval_secs,
                10,
                86_400,
                "sync.auto_sync_interval_secs",
            ));
        }

        Validator::collect_errors(results)
    }

    fn merge(&mut self, other: Self) {
        self.auto_sync_interval_secs = other.auto_sync_interval_secs;
        self.event_buffer = other.event_buffer;
    }

    fn section_name(&self) -> &'static str {
        "sync"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let settings = SyncSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.auto_sync_interval(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_zero_interval_disables_auto_sync() {
        let settings = SyncSettings {
            auto_sync_interval_secs: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_ok());
        assert_eq!(settings.auto_sync_interval(), None);
    }

    #[test]
    fn test_too_frequent_interval_rejected() {
        let settings = SyncSettings {
            auto_sync_interval_secs: 2,
            event_buffer: 0,
        };
        assert_eq!(settings.validate().unwrap_err().len(), 2);
    }
}
