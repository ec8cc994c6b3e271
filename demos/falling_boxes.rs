use ballast::*;

fn main() -> PhysicsResult<()> {
    let mut world = World::new(WorldConfig::default());

    let ground = world.create_rigid_body();
    world.add_shape(ground, Shape::cuboid(Vec3::new(20.0, 0.5, 20.0)))?;
    world.set_static(ground, true)?;

    let mut boxes = Vec::new();
    for level in 0..8 {
        let body = world.create_rigid_body();
        if let Some(body) = world.body_mut(body) {
            body.position = Vec3::new(0.0, 1.0 + level as f32 * 1.2, 0.0);
        }
        world.add_shape(body, Shape::cuboid(Vec3::splat(0.5)))?;
        boxes.push(body);
    }

    let mut stepper = FixedStepper::default();
    for frame in 0..240 {
        stepper.advance(&mut world, 1.0 / 60.0, true)?;
        if frame % 60 == 59 {
            let profile = world.profile();
            println!(
                "t={:.1}s bodies awake: {} contacts: {} islands: {} step: {:?}",
                (frame + 1) as f32 / 60.0,
                profile.active_body_count,
                profile.contact_count,
                profile.island_count,
                profile.total_time
            );
        }
    }

    if let Some(top) = boxes.last().and_then(|handle| world.body(*handle)) {
        println!("Top box came to rest at {:?}", top.position);
    }
    Ok(())
}
