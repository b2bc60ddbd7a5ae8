//! The closed set of synchronized entities

use crate::error::AppError;
use crate::types::{
    Assignment, EntityId, EntityKind, EntityRef, Exercise, SyncMeta, SyncStatus, Timestamp, User,
    Validator, Workout, WorkoutExercise,
};
use serde_json::Value;

/// Any synchronized record
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    User(User),
    Exercise(Exercise),
    Workout(Workout),
    WorkoutExercise(WorkoutExercise),
    Assignment(Assignment),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::User(_) => EntityKind::User,
            Entity::Exercise(_) => EntityKind::Exercise,
            Entity::Workout(_) => EntityKind::Workout,
            Entity::WorkoutExercise(_) => EntityKind::WorkoutExercise,
            Entity::Assignment(_) => EntityKind::Assignment,
        }
    }

    pub fn meta(&self) -> &SyncMeta {
        match self {
            Entity::User(e) => &e.meta,
            Entity::Exercise(e) => &e.meta,
            Entity::Workout(e) => &e.meta,
            Entity::WorkoutExercise(e) => &e.meta,
            Entity::Assignment(e) => &e.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut SyncMeta {
        match self {
            Entity::User(e) => &mut e.meta,
            Entity::Exercise(e) => &mut e.meta,
            Entity::Workout(e) => &mut e.meta,
            Entity::WorkoutExercise(e) => &mut e.meta,
            Entity::Assignment(e) => &mut e.meta,
        }
    }

    pub fn id(&self) -> &EntityId {
        &self.meta().id
    }

    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.kind(), self.id().clone())
    }

    pub fn is_deleted(&self) -> bool {
        self.meta().is_deleted
    }

    pub fn last_modified_at(&self) -> Timestamp {
        self.meta().last_modified_at
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.meta().sync_status
    }

    /// Owning entity whose deletion cascades to this one
    pub fn parent(&self) -> Option<EntityRef> {
        match self {
            Entity::WorkoutExercise(item) => Some(EntityRef::new(
                EntityKind::Workout,
                item.workout_id.clone(),
            )),
            _ => None,
        }
    }

    /// Every entity this one points at, the cascading parent included
    pub fn references(&self) -> Vec<EntityRef> {
        let user = |id: &Option<EntityId>| {
            id.as_ref()
                .map(|id| EntityRef::new(EntityKind::User, id.clone()))
        };
        let exercise = |id: &Option<EntityId>| {
            id.as_ref()
                .map(|id| EntityRef::new(EntityKind::Exercise, id.clone()))
        };

        let refs = match self {
            Entity::User(u) => vec![user(&u.trainer_id)],
            Entity::Exercise(e) => vec![user(&e.creator_id)],
            Entity::Workout(w) => vec![user(&w.owner_id)],
            Entity::WorkoutExercise(item) => vec![self.parent(), exercise(&item.exercise_id)],
            Entity::Assignment(a) => vec![
                user(&a.client_id),
                exercise(&a.exercise_id),
                user(&a.trainer_id),
            ],
        };
        refs.into_iter().flatten().collect()
    }

    /// Clears every optional reference to `target`.
    ///
    /// Returns true if anything changed. The required workout reference of
    /// a line item is never cleared; line items are deleted with their
    /// workout instead.
    pub fn nullify_reference(&mut self, target: &EntityRef) -> bool {
        fn clear(slot: &mut Option<EntityId>, target: &EntityId) -> bool {
            if slot.as_ref() == Some(target) {
                *slot = None;
                true
            } else {
                false
            }
        }

        let id = &target.id;
        match (self, target.kind) {
            (Entity::User(u), EntityKind::User) => clear(&mut u.trainer_id, id),
            (Entity::Exercise(e), EntityKind::User) => clear(&mut e.creator_id, id),
            (Entity::Workout(w), EntityKind::User) => clear(&mut w.owner_id, id),
            (Entity::WorkoutExercise(item), EntityKind::Exercise) => {
                clear(&mut item.exercise_id, id)
            }
            (Entity::Assignment(a), EntityKind::User) => {
                // Non-short-circuiting so both slots are checked
                clear(&mut a.client_id, id) | clear(&mut a.trainer_id, id)
            }
            (Entity::Assignment(a), EntityKind::Exercise) => clear(&mut a.exercise_id, id),
            _ => false,
        }
    }

    /// Serializes to the wire/storage JSON shape (camelCase, no sync status)
    pub fn to_json(&self) -> crate::Result<Value> {
        let value = match self {
            Entity::User(e) => serde_json::to_value(e),
            Entity::Exercise(e) => serde_json::to_value(e),
            Entity::Workout(e) => serde_json::to_value(e),
            Entity::WorkoutExercise(e) => serde_json::to_value(e),
            Entity::Assignment(e) => serde_json::to_value(e),
        };
        value.map_err(|e| {
            AppError::serialization(format!("Failed to encode {}", self.entity_ref()), e)
        })
    }

    /// Parses a payload of a known kind. Sync status comes back `Clean`.
    pub fn from_json(kind: EntityKind, value: Value) -> crate::Result<Self> {
        let parsed = match kind {
            EntityKind::User => serde_json::from_value(value).map(Entity::User),
            EntityKind::Exercise => serde_json::from_value(value).map(Entity::Exercise),
            EntityKind::Workout => serde_json::from_value(value).map(Entity::Workout),
            EntityKind::WorkoutExercise => {
                serde_json::from_value(value).map(Entity::WorkoutExercise)
            }
            EntityKind::Assignment => serde_json::from_value(value).map(Entity::Assignment),
        };
        parsed.map_err(|e| AppError::serialization(format!("Failed to decode {}", kind), e))
    }

    /// Validates, converting messages into an `InvalidEntity` error
    pub fn check(&self) -> crate::Result<()> {
        self.validate().map_err(|reasons| AppError::InvalidEntity {
            entity: self.kind().to_string(),
            reasons,
        })
    }
}

impl Validator for Entity {
    fn validate(&self) -> Result<(), Vec<String>> {
        match self {
            Entity::User(e) => e.validate(),
            Entity::Exercise(e) => e.validate(),
            Entity::Workout(e) => e.validate(),
            Entity::WorkoutExercise(e) => e.validate(),
            Entity::Assignment(e) => e.validate(),
        }
    }
}

macro_rules! entity_conversions {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Entity {
                fn from(value: $variant) -> Self {
                    Entity::$variant(value)
                }
            }

            impl TryFrom<Entity> for $variant {
                type Error = AppError;

                fn try_from(entity: Entity) -> Result<Self, Self::Error> {
                    match entity {
                        Entity::$variant(inner) => Ok(inner),
                        other => Err(AppError::InvalidArgument {
                            argument: "entity".to_string(),
                            reason: format!(
                                "expected {}, found {}",
                                EntityKind::$variant,
                                other.kind()
                            ),
                        }),
                    }
                }
            }
        )*
    };
}

entity_conversions!(User, Exercise, Workout, WorkoutExercise, Assignment);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserRole;

    #[test]
    fn test_kind_and_ref() {
        let workout = Workout::new("Legs");
        let id = workout.meta.id.clone();
        let entity = Entity::from(workout);

        assert_eq!(entity.kind(), EntityKind::Workout);
        assert_eq!(entity.entity_ref(), EntityRef::new(EntityKind::Workout, id));
        assert!(entity.parent().is_none());
    }

    #[test]
    fn test_line_item_parent_and_references() {
        let workout = Workout::new("Legs");
        let squat = Exercise::new("Squat");
        let item = Entity::from(workout.item(&squat.meta.id, 0));

        assert_eq!(
            item.parent(),
            Some(EntityRef::new(EntityKind::Workout, workout.meta.id.clone()))
        );
        assert_eq!(item.references().len(), 2);
    }

    #[test]
    fn test_nullify_assignment_user_refs() {
        let trainer = User::new("T", "t@x.io", UserRole::Trainer);
        let exercise = Exercise::new("Row");
        // Trainer assigns to themself so both user slots match
        let mut entity = Entity::from(Assignment::new(
            &trainer.meta.id,
            &trainer.meta.id,
            &exercise.meta.id,
            3,
            12,
        ));

        let target = EntityRef::new(EntityKind::User, trainer.meta.id.clone());
        assert!(entity.nullify_reference(&target));
        assert!(!entity.nullify_reference(&target));

        let assignment = Assignment::try_from(entity).unwrap();
        assert!(assignment.client_id.is_none());
        assert!(assignment.trainer_id.is_none());
        assert_eq!(assignment.exercise_id, Some(exercise.meta.id));
    }

    #[test]
    fn test_nullify_never_clears_required_parent() {
        let workout = Workout::new("Legs");
        let mut item = Entity::from(workout.item(&EntityId::generate(), 0));
        let target = EntityRef::new(EntityKind::Workout, workout.meta.id.clone());

        assert!(!item.nullify_reference(&target));
        assert_eq!(item.parent(), Some(target));
    }

    #[test]
    fn test_json_roundtrip_drops_status() {
        let mut entity = Entity::from(Exercise::new("Plank"));
        entity.meta_mut().sync_status = SyncStatus::PendingCreate;

        let json = entity.to_json().unwrap();
        let back = Entity::from_json(EntityKind::Exercise, json).unwrap();

        assert_eq!(back.id(), entity.id());
        assert_eq!(back.sync_status(), SyncStatus::Clean);
    }

    #[test]
    fn test_from_json_wrong_shape() {
        let err = Entity::from_json(EntityKind::User, serde_json::json!({"id": 1})).unwrap_err();
        assert!(matches!(err, AppError::SerializationError { .. }));
    }

    #[test]
    fn test_try_from_wrong_variant() {
        let entity = Entity::from(Workout::new("Legs"));
        assert!(User::try_from(entity).is_err());
    }

    #[test]
    fn test_check_maps_to_invalid_entity() {
        let entity = Entity::from(Workout::new(""));
        assert!(matches!(
            entity.check(),
            Err(AppError::InvalidEntity { .. })
        ));
    }
}
