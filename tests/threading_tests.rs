use std::sync::{Arc, Mutex};
use std::thread;

use ballast::{FixedStepper, Shape, SlimBag, Vec3, World, WorldConfig};

#[test]
fn test_world_is_sync_and_send() {
    fn assert_sync_send<T: Sync + Send>() {}
    assert_sync_send::<World>();
    assert_sync_send::<SlimBag<u32>>();
}

#[test]
fn test_shared_world_across_threads() {
    let world = Arc::new(Mutex::new(World::new(WorldConfig::default())));
    let body = {
        let mut world = world.lock().unwrap();
        let body = world.create_rigid_body();
        world.body_mut(body).unwrap().position = Vec3::new(0.0, 10.0, 0.0);
        world.add_shape(body, Shape::sphere(0.5)).unwrap();
        body
    };

    let mut handles = vec![];
    for _ in 0..4 {
        let world_clone = Arc::clone(&world);
        let handle = thread::spawn(move || {
            let mut world = world_clone.lock().unwrap();
            world.step(1.0 / 60.0, true).unwrap();
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let world = world.lock().unwrap();
    assert!(world.body(body).unwrap().position.y < 10.0);
}

#[test]
fn test_slim_bag_collects_from_many_threads() {
    let mut bag = SlimBag::new();
    thread::scope(|scope| {
        for worker in 0..8u32 {
            let bag = &bag;
            scope.spawn(move || {
                for i in 0..250u32 {
                    bag.concurrent_add(worker * 1000 + i);
                }
            });
        }
    });
    assert_eq!(bag.len(), 2000);

    let mut items: Vec<u32> = bag.drain().collect();
    items.sort_unstable();
    items.dedup();
    assert_eq!(items.len(), 2000);
}

#[test]
fn test_fixed_stepper_runs_whole_steps() {
    let mut world = World::new(WorldConfig::default());
    let mut stepper = FixedStepper::new(0.01);

    assert_eq!(stepper.advance(&mut world, 0.025, true).unwrap(), 2);
    assert!((stepper.alpha() - 0.5).abs() < 1e-3);
    assert_eq!(stepper.advance(&mut world, 0.0075, true).unwrap(), 1);
}
