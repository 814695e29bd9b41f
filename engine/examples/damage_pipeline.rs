//! A minimal damage pipeline driven by the task scheduler.
//!
//! Three tasks ordered purely by their contracts: DoDamage wears hosts down,
//! KillZeroHealth converts dead hosts into `Dead` markers, DestroyDead
//! queues the markers for the deferred flush. Run with:
//!
//! ```sh
//! cargo run --example damage_pipeline
//! ```

use std::sync::Arc;

use cadence_engine::{
    ecs::{Component, TypeRegistry, World},
    tasks::{Dependency, TaskDefinition, TaskGraph, Tick},
};

#[derive(Component, Default)]
struct Health {
    value: i32,
}

#[derive(Component, Default)]
struct Dead;

fn do_damage(world: &mut World) {
    for health in world.live::<Health>().collect::<Vec<_>>() {
        let health = world.get_mut::<Health>(health);
        health.value -= 3;
    }
}

fn kill_zero_health(world: &mut World) {
    for health in world.live::<Health>().collect::<Vec<_>>() {
        if world.get::<Health>(health).value > 0 {
            continue;
        }
        let owner = world.owner(health).expect("health is always attached");
        if world.find_first::<Dead>(owner).is_none() {
            world
                .attach::<Dead>(owner)
                .expect("dead pool sized to the host count");
            println!("host {:?} died", owner);
        }
    }
}

fn destroy_dead(world: &mut World) {
    for dead in world.live::<Dead>().collect::<Vec<_>>() {
        let owner = world.owner(dead).expect("dead is always attached");
        world.mark_for_destroy(dead);
        world.remove_all(owner);
        println!("host {:?} cleaned up", owner);
    }
}

fn main() {
    let registry = Arc::new(TypeRegistry::new());
    registry.register::<Health>(16);
    registry.register::<Dead>(16);

    let mut graph = TaskGraph::new();
    graph.register(
        TaskDefinition::new("DestroyDead", destroy_dead)
            .with_contract(|c| c.execute_after(Dependency::new("KillZeroHealth"))),
    );
    graph.register(
        TaskDefinition::new("KillZeroHealth", kill_zero_health)
            .with_contract(|c| c.execute_after(Dependency::new("DoDamage"))),
    );
    graph.register(TaskDefinition::new("DoDamage", do_damage));

    let schedule = graph
        .schedule(Tick::GAMEPLAY)
        .expect("pipeline contracts are acyclic");
    println!("schedule: {:?}", schedule.task_names());

    let mut world = World::new(registry);
    for hp in [3, 7] {
        let host = world.create_host();
        let health = world.attach::<Health>(host).unwrap();
        world.get_mut::<Health>(health).value = hp;
    }

    for frame in 1..=4 {
        println!("-- frame {frame} --");
        schedule.run(&mut world);
        world.tick();
    }

    assert_eq!(world.count_allocated::<Health>(), 0);
    println!("all hosts dead and reclaimed");
}
