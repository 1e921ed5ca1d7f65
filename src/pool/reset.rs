//! Reset and activation of pooled actors
//!
//! Stateless helpers that move an actor between its parked and live states.
//! Each takes the world lock only for individual component writes and
//! dispatches lifecycle events with no lock held.

use glam::Vec3;

use crate::error::{PoolError, PoolResult};
use crate::lifecycle::LifecycleEvent;
use crate::scene::{ActorClass, ActorHandle, Transform, World};

/// Where parked actors wait, far below any playable space
pub const POOL_PARKING_LOCATION: Vec3 = Vec3::new(0.0, 0.0, -100_000.0);

/// Base per-actor memory estimate in bytes
pub const BASE_ACTOR_MEMORY: u64 = 1024;
/// Per-component memory estimate in bytes, scaled by [`ClassKind::component_factor`](crate::scene::ClassKind::component_factor)
pub const COMPONENT_MEMORY_ESTIMATE: u64 = 256;

/// Parked transform
#[must_use]
pub fn parking_transform() -> Transform {
    Transform::from_position(POOL_PARKING_LOCATION)
}

/// Prepare an actor for storage: notify it, then hide, freeze and park it.
///
/// Actors still in deferred construction have not received `Created`, so
/// they are parked without notification and stay deferred.
pub fn reset_for_pooling(world: &World, actor: ActorHandle) -> PoolResult<()> {
    let Some(deferred) = world.is_deferred(actor) else {
        return Err(PoolError::InvalidObject);
    };
    if !world.is_valid(actor) {
        return Err(PoolError::InvalidObject);
    }
    if deferred {
        return park(world, actor);
    }

    world.lifecycle().dispatch(actor, LifecycleEvent::ReturnedToPool);

    // The handler may have destroyed its own actor
    if !world.is_valid(actor) {
        return Err(PoolError::InvalidObject);
    }
    park(world, actor)
}

/// Hide, freeze and park an actor without notifying it
pub fn park(world: &World, actor: ActorHandle) -> PoolResult<()> {
    if !world.set_tick_enabled(actor, false) {
        return Err(PoolError::InvalidObject);
    }
    world.set_collision_enabled(actor, false);
    world.clear_velocities(actor);
    world.set_visible(actor, false);
    world.set_transform(actor, &parking_transform());
    Ok(())
}

/// Bring an actor into play at `transform`.
///
/// Deferred actors finish construction and receive `Created`; reused actors
/// re-run their construction script. Both then receive `Activated`.
pub fn activate(world: &World, actor: ActorHandle, transform: &Transform) -> PoolResult<()> {
    let Some(deferred) = world.is_deferred(actor) else {
        return Err(PoolError::InvalidObject);
    };
    if !world.is_valid(actor) {
        return Err(PoolError::InvalidObject);
    }
    let class = world.class_of(actor).ok_or(PoolError::InvalidObject)?;

    if deferred {
        world
            .finish_construction(actor, transform)
            .map_err(into_activation_error)?;
        world.lifecycle().dispatch(actor, LifecycleEvent::Created);
    } else {
        world
            .rerun_construction(actor)
            .map_err(into_activation_error)?;
    }

    if !world.set_transform(actor, transform) {
        return Err(PoolError::InvalidObject);
    }
    world.set_visible(actor, true);
    world.set_collision_enabled(actor, class.collision_by_default());
    world.set_tick_enabled(actor, class.tick_by_default());

    world.lifecycle().dispatch(actor, LifecycleEvent::Activated);
    Ok(())
}

/// Move and show an actor without lifecycle events or construction
pub fn basic_reset(
    world: &World,
    actor: ActorHandle,
    transform: &Transform,
    reset_physics: bool,
) -> PoolResult<()> {
    if !world.set_transform(actor, transform) {
        return Err(PoolError::InvalidObject);
    }
    world.set_visible(actor, true);
    if reset_physics {
        world.clear_velocities(actor);
    }
    Ok(())
}

fn into_activation_error(err: PoolError) -> PoolError {
    match err {
        PoolError::InvalidObject | PoolError::ActivationFailed(_) => err,
        other => PoolError::ActivationFailed(other.to_string()),
    }
}

/// Estimated bytes held by one actor of `class`
#[must_use]
pub fn object_footprint(class: &ActorClass) -> u64 {
    BASE_ACTOR_MEMORY
        + class.structure_size()
        + COMPONENT_MEMORY_ESTIMATE * class.kind().component_factor()
}

/// Estimated bytes held by `count` actors of `class`; 0 without a class
#[must_use]
pub fn estimate_memory_usage(class: Option<&ActorClass>, count: usize) -> u64 {
    class.map_or(0, |class| object_footprint(class) * count as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{ClassBuilder, ClassKind, Velocity};
    use crate::testing::{EventLog, RecordingHandler};

    #[test]
    fn test_activate_deferred_emits_created_then_activated() {
        let world = World::new("Test");
        let log = EventLog::default();
        let class = RecordingHandler::class("Bullet", &log);
        let actor = world
            .spawn_deferred(&class, &parking_transform())
            .expect("spawn");

        let at = Transform::from_position(Vec3::new(5.0, 0.0, 1.0));
        activate(&world, actor, &at).expect("activate");

        assert_eq!(
            log.events_for(actor),
            vec![LifecycleEvent::Created, LifecycleEvent::Activated]
        );
        let snap = world.snapshot(actor).expect("snapshot");
        assert!(snap.visible);
        assert_eq!(snap.collision_enabled, Some(true));
        assert_eq!(snap.transform, at);
        assert_eq!(log.constructions_for(actor), 1);
    }

    #[test]
    fn test_reset_then_reactivate_reruns_construction() {
        let world = World::new("Test");
        let log = EventLog::default();
        let class = RecordingHandler::class("Bullet", &log);
        let actor = world
            .spawn_deferred(&class, &parking_transform())
            .expect("spawn");
        activate(&world, actor, &Transform::IDENTITY).expect("activate");
        world.set_velocity(
            actor,
            Velocity {
                linear: Vec3::X,
                angular: Vec3::Y,
            },
        );

        reset_for_pooling(&world, actor).expect("reset");
        let snap = world.snapshot(actor).expect("snapshot");
        assert!(!snap.visible);
        assert!(!snap.tick_enabled);
        assert_eq!(snap.collision_enabled, Some(false));
        assert!(snap.velocity.is_some_and(|v| v.is_zero()));
        assert_eq!(snap.transform.position, POOL_PARKING_LOCATION);

        activate(&world, actor, &Transform::IDENTITY).expect("reactivate");
        assert_eq!(
            log.events_for(actor),
            vec![
                LifecycleEvent::Created,
                LifecycleEvent::Activated,
                LifecycleEvent::ReturnedToPool,
                LifecycleEvent::Activated,
            ],
            "Created fires only once"
        );
        assert_eq!(log.constructions_for(actor), 2);
    }

    #[test]
    fn test_unfinished_actor_is_parked_silently() {
        let world = World::new("Test");
        let log = EventLog::default();
        let class = RecordingHandler::class("Bullet", &log);
        let actor = world
            .spawn_deferred(&class, &Transform::IDENTITY)
            .expect("spawn");

        reset_for_pooling(&world, actor).expect("reset");
        assert!(log.events_for(actor).is_empty());
        assert_eq!(world.is_deferred(actor), Some(true));
        assert!(!world.snapshot(actor).expect("snapshot").visible);

        activate(&world, actor, &Transform::IDENTITY).expect("activate");
        assert_eq!(
            log.events_for(actor),
            vec![LifecycleEvent::Created, LifecycleEvent::Activated]
        );
    }

    #[test]
    fn test_basic_reset_moves_and_shows_without_events() {
        let world = World::new("Test");
        let log = EventLog::default();
        let class = RecordingHandler::class("Bullet", &log);
        let actor = world
            .spawn_deferred(&class, &parking_transform())
            .expect("spawn");
        activate(&world, actor, &Transform::IDENTITY).expect("activate");
        reset_for_pooling(&world, actor).expect("reset");
        world.set_velocity(
            actor,
            Velocity {
                linear: Vec3::X,
                angular: Vec3::ZERO,
            },
        );

        let at = Transform::from_position(Vec3::new(2.0, 0.0, 0.0));
        basic_reset(&world, actor, &at, true).expect("basic reset");

        let snap = world.snapshot(actor).expect("snapshot");
        assert!(snap.visible);
        assert_eq!(snap.transform, at);
        assert!(snap.velocity.is_some_and(|v| v.is_zero()));
        assert_eq!(log.count(LifecycleEvent::Activated), 1);

        world.destroy(actor);
        assert_eq!(
            basic_reset(&world, actor, &at, false),
            Err(PoolError::InvalidObject)
        );
    }

    #[test]
    fn test_activate_refused_during_teardown() {
        let world = World::new("Test");
        let class = ClassBuilder::new("Crate").build();
        let actor = world
            .spawn_deferred(&class, &parking_transform())
            .expect("spawn");

        world.begin_teardown();
        assert!(matches!(
            activate(&world, actor, &Transform::IDENTITY),
            Err(PoolError::ActivationFailed(_))
        ));
    }

    #[test]
    fn test_invalid_actor_is_rejected() {
        let world = World::new("Test");
        let class = ClassBuilder::new("Crate").build();
        let actor = world.spawn(&class, &Transform::IDENTITY).expect("spawn");
        world.destroy(actor);

        assert_eq!(reset_for_pooling(&world, actor), Err(PoolError::InvalidObject));
        assert_eq!(
            activate(&world, actor, &Transform::IDENTITY),
            Err(PoolError::InvalidObject)
        );
    }

    #[test]
    fn test_memory_estimates() {
        let actor = ClassBuilder::new("Prop").with_structure_size(0).build();
        let character = ClassBuilder::new("Hero")
            .with_kind(ClassKind::Character)
            .with_structure_size(1000)
            .build();

        assert_eq!(object_footprint(&actor), 1024 + 2 * 256);
        assert_eq!(object_footprint(&character), 1024 + 1000 + 2560);
        assert_eq!(estimate_memory_usage(Some(&actor), 4), 4 * 1536);
        assert_eq!(estimate_memory_usage(None, 4), 0);
    }
}
