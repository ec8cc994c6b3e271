use ballast::{BodyHandle, ProxyRef, Quat, Shape, Vec3, World, WorldConfig};

fn place(world: &mut World, position: Vec3, orientation: Quat, shape: Shape) -> BodyHandle {
    let body = world.create_rigid_body();
    {
        let body = world.body_mut(body).unwrap();
        body.position = position;
        body.orientation = orientation;
    }
    world.add_shape(body, shape).unwrap();
    body
}

fn shape_of(world: &World, body: BodyHandle) -> ProxyRef {
    ProxyRef::Shape(world.body(body).unwrap().shapes()[0])
}

#[test]
fn test_raycast_hits_nearest_shape() {
    let mut world = World::new(WorldConfig::default());
    let crate_body = place(&mut world, Vec3::new(0.0, 0.0, 5.0), Quat::IDENTITY, Shape::cuboid(Vec3::ONE));
    let ball = place(&mut world, Vec3::new(0.0, 0.0, 10.0), Quat::IDENTITY, Shape::sphere(0.5));
    let (box_proxy, ball_proxy) = (shape_of(&world, crate_body), shape_of(&world, ball));

    let hit = world.ray_cast(Vec3::ZERO, Vec3::Z, None, |_| true, |_| true).unwrap();
    assert_eq!(hit.proxy, box_proxy);
    assert!((hit.lambda - 4.0).abs() < 1e-4);
    assert!(hit.normal.abs_diff_eq(-Vec3::Z, 1e-4));

    let hit = world
        .ray_cast(Vec3::ZERO, Vec3::Z, None, |proxy| proxy != box_proxy, |_| true)
        .unwrap();
    assert_eq!(hit.proxy, ball_proxy);
    assert!((hit.lambda - 9.5).abs() < 1e-4);

    let hit = world
        .ray_cast(Vec3::ZERO, Vec3::Z, None, |_| true, |hit| hit.proxy != box_proxy)
        .unwrap();
    assert_eq!(hit.proxy, ball_proxy);

    assert!(world.ray_cast(Vec3::ZERO, Vec3::Z, Some(3.0), |_| true, |_| true).is_none());
}

#[test]
fn test_raycast_lambda_scales_with_direction_length() {
    let mut world = World::new(WorldConfig::default());
    place(&mut world, Vec3::new(0.0, 0.0, 5.0), Quat::IDENTITY, Shape::cuboid(Vec3::ONE));

    let hit = world.ray_cast(Vec3::ZERO, Vec3::Z * 2.0, None, |_| true, |_| true).unwrap();
    assert!((hit.lambda - 2.0).abs() < 1e-4);
}

#[test]
fn test_raycast_rotated_box_reports_world_normal() {
    let mut world = World::new(WorldConfig::default());
    let rotation = Quat::from_rotation_y(45f32.to_radians());
    place(&mut world, Vec3::new(5.0, 0.0, 0.0), rotation, Shape::cuboid(Vec3::ONE));

    let hit = world.ray_cast(Vec3::ZERO, Vec3::X, None, |_| true, |_| true).unwrap();
    // The leading edge of the rotated box sits sqrt(2) in front of its center.
    assert!((hit.lambda - (5.0 - 2f32.sqrt())).abs() < 1e-3, "lambda {}", hit.lambda);
    assert!(hit.normal.x < 0.0);
    assert!((hit.normal.length() - 1.0).abs() < 1e-4);
}

#[test]
fn test_raycast_misses_and_degenerate_rays() {
    let mut world = World::new(WorldConfig::default());
    place(&mut world, Vec3::new(0.0, 0.0, 5.0), Quat::IDENTITY, Shape::sphere(1.0));

    assert!(world.ray_cast(Vec3::ZERO, Vec3::X, None, |_| true, |_| true).is_none());
    assert!(world.ray_cast(Vec3::ZERO, -Vec3::Z, None, |_| true, |_| true).is_none());
    assert!(world.ray_cast(Vec3::ZERO, Vec3::ZERO, None, |_| true, |_| true).is_none());
    assert!(world
        .ray_cast(Vec3::splat(f32::NAN), Vec3::Z, None, |_| true, |_| true)
        .is_none());
}

#[test]
fn test_raycast_starting_inside_hits_immediately() {
    let mut world = World::new(WorldConfig::default());
    place(&mut world, Vec3::ZERO, Quat::IDENTITY, Shape::sphere(1.0));

    let hit = world.ray_cast(Vec3::ZERO, Vec3::X, None, |_| true, |_| true).unwrap();
    assert_eq!(hit.lambda, 0.0);
}

#[test]
fn test_raycast_follows_moving_bodies() {
    let mut world = World::new(WorldConfig::default());
    let ball = place(&mut world, Vec3::new(0.0, 5.0, 0.0), Quat::IDENTITY, Shape::sphere(0.5));
    for _ in 0..50 {
        world.step(1.0 / 100.0, false).unwrap();
    }

    let y = world.body(ball).unwrap().position.y;
    let hit = world
        .ray_cast(Vec3::new(0.0, 10.0, 0.0), -Vec3::Y, None, |_| true, |_| true)
        .unwrap();
    assert!((hit.lambda - (10.0 - y - 0.5)).abs() < 0.05, "lambda {} for ball at {y}", hit.lambda);
}
