// crates/sync-engine/src/index.rs
//! Reverse reference lookups

use fitsync_core::{Entity, EntityKind, EntityRef};
use std::collections::{BTreeSet, HashMap};

/// Maps each referenced entity to the entities pointing at it.
///
/// Covers every reference an entity carries, so it answers both cascade
/// questions (line items of a workout) and nullify questions (who points
/// at this user). Tombstones stay indexed until they are purged.
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    referrers: HashMap<EntityRef, BTreeSet<EntityRef>>,
    targets: HashMap<EntityRef, Vec<EntityRef>>,
}

impl ReferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes `entity`, replacing whatever was known about it before
    pub fn insert(&mut self, entity: &Entity) {
        let source = entity.entity_ref();
        self.remove(&source);

        let targets = entity.references();
        for target in &targets {
            self.referrers
                .entry(target.clone())
                .or_default()
                .insert(source.clone());
        }
        self.targets.insert(source, targets);
    }

    /// Forgets the outgoing references of `source`
    pub fn remove(&mut self, source: &EntityRef) {
        let Some(targets) = self.targets.remove(source) else {
            return;
        };

        for target in targets {
            if let Some(set) = self.referrers.get_mut(&target) {
                set.remove(source);
                if set.is_empty() {
                    self.referrers.remove(&target);
                }
            }
        }
    }

    /// Entities that reference `target`, in stable order
    pub fn referrers(&self, target: &EntityRef) -> Vec<EntityRef> {
        self.referrers
            .get(target)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Referrers of one kind only
    pub fn referrers_of_kind(&self, target: &EntityRef, kind: EntityKind) -> Vec<EntityRef> {
        self.referrers
            .get(target)
            .map(|set| set.iter().filter(|r| r.kind == kind).cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.referrers.clear();
        self.targets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fitsync_core::{Exercise, User, UserRole, Workout};

    #[test]
    fn test_line_items_indexed_under_workout_and_exercise() {
        let workout = Workout::new("Push");
        let bench = Exercise::new("Bench");
        let item: Entity = workout.item(&bench.meta.id, 0).into();
        let workout_ref = Entity::from(workout).entity_ref();
        let bench_ref = Entity::from(bench).entity_ref();

        let mut index = ReferenceIndex::new();
        index.insert(&item);

        assert_eq!(index.referrers(&workout_ref), vec![item.entity_ref()]);
        assert_eq!(
            index.referrers_of_kind(&bench_ref, EntityKind::WorkoutExercise),
            vec![item.entity_ref()]
        );
        assert!(index
            .referrers_of_kind(&bench_ref, EntityKind::Assignment)
            .is_empty());
    }

    #[test]
    fn test_reinsert_moves_reference() {
        let coach_a = User::new("A", "a@gym.io", UserRole::Trainer);
        let coach_b = User::new("B", "b@gym.io", UserRole::Trainer);
        let mut client = User::client_of("C", "c@gym.io", &coach_a.meta.id);

        let a_ref = Entity::from(coach_a).entity_ref();
        let b_ref = Entity::from(coach_b.clone()).entity_ref();

        let mut index = ReferenceIndex::new();
        index.insert(&client.clone().into());
        assert_eq!(index.referrers(&a_ref).len(), 1);

        client.trainer_id = Some(coach_b.meta.id.clone());
        index.insert(&client.into());
        assert!(index.referrers(&a_ref).is_empty());
        assert_eq!(index.referrers(&b_ref).len(), 1);
    }

    #[test]
    fn test_tombstones_indexed_until_removed() {
        let workout = Workout::new("Pull");
        let mut item: Entity = workout.item(&fitsync_core::EntityId::generate(), 0).into();
        let workout_ref = Entity::from(workout).entity_ref();

        let mut index = ReferenceIndex::new();
        item.meta_mut().is_deleted = true;
        index.insert(&item);
        assert_eq!(index.referrers(&workout_ref).len(), 1);

        index.remove(&item.entity_ref());
        assert!(index.referrers(&workout_ref).is_empty());
    }
}
