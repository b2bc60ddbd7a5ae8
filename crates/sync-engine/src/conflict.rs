// crates/sync-engine/src/conflict.rs
//! Conflict detection and resolution

use fitsync_core::Entity;

/// What to do with a pulled remote version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// No local copy: store the remote version as clean
    Insert,
    /// Local copy is clean: replace it with the remote version
    Overwrite,
    /// Local copy has unpushed changes but the remote version is newer:
    /// replace it and drop the pending change
    RemoteWins,
    /// Local pending change is at least as new: keep it for the next push
    KeepLocal,
    /// Nothing to apply (already known, older, or a tombstone for an
    /// entity never seen here)
    Ignore,
}

impl Resolution {
    /// True when the remote version ends up in the store
    pub fn applies_remote(&self) -> bool {
        matches!(
            self,
            Resolution::Insert | Resolution::Overwrite | Resolution::RemoteWins
        )
    }
}

/// Last-writer-wins resolver keyed on `last_modified_at`.
///
/// Resolution is per entity and lossy: the losing version is discarded
/// as a whole, fields are never merged. Ties go to the local copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct LwwResolver;

impl LwwResolver {
    pub fn new() -> Self {
        Self
    }

    /// Decides between the stored copy (tombstones included) and a remote one
    pub fn resolve(&self, local: Option<&Entity>, remote: &Entity) -> Resolution {
        let Some(local) = local else {
            return if remote.is_deleted() {
                Resolution::Ignore
            } else {
                Resolution::Insert
            };
        };

        let remote_at = remote.last_modified_at();
        let local_at = local.last_modified_at();

        if local.sync_status().is_pending() {
            return if remote_at > local_at {
                log::info!(
                    "Remote {} ({}) supersedes local {} ({})",
                    remote.entity_ref(),
                    remote_at,
                    local.sync_status(),
                    local_at
                );
                Resolution::RemoteWins
            } else {
                Resolution::KeepLocal
            };
        }

        if remote_at > local_at {
            Resolution::Overwrite
        } else {
            if remote_at < local_at {
                log::warn!(
                    "Ignoring remote {} at {} older than clean local copy at {}",
                    remote.entity_ref(),
                    remote_at,
                    local_at
                );
            }
            Resolution::Ignore
        }
    }
}
