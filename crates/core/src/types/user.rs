//! User domain model

use crate::types::common::collect;
use crate::types::{EntityId, SyncMeta, Validator};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role a user plays in the app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Trainer,
    Client,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Trainer => write!(f, "trainer"),
            UserRole::Client => write!(f, "client"),
        }
    }
}

/// A trainer or a client.
///
/// Clients point at their trainer through `trainer_id`; the reverse
/// direction (trainer to managed clients) is answered by the store's
/// reference index rather than stored on the trainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(flatten)]
    pub meta: SyncMeta,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    #[serde(default)]
    pub trainer_id: Option<EntityId>,
}

impl User {
    /// Creates a new user with a generated id
    pub fn new(name: impl Into<String>, email: impl Into<String>, role: UserRole) -> Self {
        Self {
            meta: SyncMeta::new(),
            name: name.into(),
            email: email.into(),
            role,
            trainer_id: None,
        }
    }

    /// Creates a client managed by `trainer`
    pub fn client_of(
        name: impl Into<String>,
        email: impl Into<String>,
        trainer: &EntityId,
    ) -> Self {
        let mut user = Self::new(name, email, UserRole::Client);
        user.trainer_id = Some(trainer.clone());
        user
    }

    pub fn is_trainer(&self) -> bool {
        self.role == UserRole::Trainer
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@')
        }
        None => false,
    }
}

impl Validator for User {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("User name cannot be empty".to_string());
        }

        if !is_plausible_email(self.email.trim()) {
            errors.push(format!("User email '{}' is not valid", self.email));
        }

        if self.trainer_id.as_ref() == Some(&self.meta.id) {
            errors.push("User cannot be their own trainer".to_string());
        }

        collect(errors)
    }
}
