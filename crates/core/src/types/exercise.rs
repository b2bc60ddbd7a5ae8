//! Exercise domain model

use crate::types::common::collect;
use crate::types::{EntityId, SyncMeta, Validator};
use serde::{Deserialize, Serialize};

/// A reusable exercise definition, optionally authored by a trainer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    #[serde(flatten)]
    pub meta: SyncMeta,
    #[serde(default)]
    pub creator_id: Option<EntityId>,
    pub name: String,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
}

impl Exercise {
    /// Creates a new exercise with a generated id
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: SyncMeta::new(),
            creator_id: None,
            name: name.into(),
            instructions: None,
            video_url: None,
        }
    }

    /// Sets the authoring trainer
    pub fn created_by(mut self, creator: &EntityId) -> Self {
        self.creator_id = Some(creator.clone());
        self
    }

    /// Sets the instructions text
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Sets the demo video URL
    pub fn with_video(mut self, url: impl Into<String>) -> Self {
        self.video_url = Some(url.into());
        self
    }
}

impl Validator for Exercise {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("Exercise name cannot be empty".to_string());
        }

        if let Some(url) = &self.video_url {
            if url.trim().is_empty() {
                errors.push("Exercise video URL cannot be empty if set".to_string());
            }
        }

        collect(errors)
    }
}
