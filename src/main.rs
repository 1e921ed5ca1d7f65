//! Demo: a turret firing pooled bullets for two seconds of simulated time

use std::collections::VecDeque;
use std::sync::Arc;

use actor_pool::prelude::*;

const FRAME_TIME: f32 = 1.0 / 60.0;
const FRAMES: usize = 120;
const SHOTS_PER_FRAME: usize = 3;
/// Frames a bullet stays in flight before it is returned
const BULLET_LIFETIME: usize = 30;

const REGISTRY_CONFIG: &str = r#"(
    pools: [
        (class: "Bullet", initial_size: Some(40), hard_limit: Some(120),
         preallocation: Some((strategy: Progressive, target_count: 60, max_per_frame: 5))),
        (class: "Grunt", preset: Some(Enemy)),
        (class: "Spark", preset: Some(Effect), enable_prewarm: false),
    ],
)"#;

/// Bullet behaviour; damage comes from the spawn parameters
#[derive(Default)]
struct Bullet {
    damage: i64,
    flights: u32,
}

impl Poolable for Bullet {
    fn construct(&mut self, _actor: ActorHandle, params: &SpawnParams) {
        self.damage = params.int("damage").unwrap_or(10);
    }

    fn on_activated(&mut self, actor: ActorHandle) -> HandlerResult {
        self.flights += 1;
        log::trace!("{actor} fired ({} dmg, flight {})", self.damage, self.flights);
        Ok(())
    }

    fn on_returned(&mut self, _actor: ActorHandle) -> HandlerResult {
        self.damage = 0;
        Ok(())
    }
}

fn register_classes(world: &World) -> ActorClass {
    let bullet = ClassBuilder::new("Bullet")
        .with_structure_size(256)
        .with_root_primitive(true)
        .with_handler(Bullet::default)
        .build();
    world.register_class(&bullet);
    world.register_class(&ClassBuilder::new("Grunt").with_kind(ClassKind::Character).build());
    world.register_class(&ClassBuilder::new("Spark").with_collision(false).build());
    bullet
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let world = Arc::new(World::new("Demo"));
    let gc = Arc::new(GarbageCollector::new());
    let registry = PoolRegistry::with_gc(Arc::clone(&world), &gc);

    let bullet = register_classes(&world);
    let loaded = registry.load_ron(REGISTRY_CONFIG)?;
    log::info!("Registered {loaded} pools");

    let muzzle = Vec3::new(0.0, 1.5, 0.0);
    let mut in_flight: VecDeque<(usize, ActorHandle)> = VecDeque::new();

    for frame in 0..FRAMES {
        registry.tick(FRAME_TIME);
        world.pump();

        for shot in 0..SHOTS_PER_FRAME {
            let Some(actor) = registry.acquire_deferred(&bullet) else {
                continue;
            };
            world.set_spawn_param(actor, "damage", SpawnValue::Int(10 + shot as i64 * 5));
            let heading = Quat::from_rotation_y(shot as f32 * 0.2);
            if registry.finalize_spawn(actor, &Transform::from_position_rotation(muzzle, heading)) {
                in_flight.push_back((frame, actor));
            }
        }

        while let Some(&(fired, actor)) = in_flight.front() {
            if frame - fired < BULLET_LIFETIME {
                break;
            }
            in_flight.pop_front();
            registry.return_to_pool(actor);
        }

        if frame % 60 == 59 {
            let reclaimed = gc.collect(&world);
            log::info!("Frame {frame}: GC reclaimed {reclaimed}, {} actors alive", world.actor_count());
        }
    }

    for (_, actor) in in_flight.drain(..) {
        registry.return_to_pool(actor);
    }

    if let Some(pool) = registry.get_pool(&bullet) {
        let advisor = MemoryAdvisor::new(OptimizationStrategy::Balanced);
        println!("{}", advisor.report(&pool));
        if let Some(stats) = pool.preallocation_stats() {
            println!(
                "Preallocation: {} created, {:.0}% of target",
                stats.created,
                stats.completion_percentage()
            );
        }
    }
    println!("{}", registry.debug_snapshot_json()?);
    println!("Lifecycle: {:?}", world.lifecycle_stats());
    Ok(())
}

fn main() {
    env_logger::init();
    log::info!("Starting actor pool demo");

    if let Err(e) = run() {
        eprintln!("Demo error: {}", e);
    }
}
