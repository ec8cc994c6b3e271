use ballast::*;

fn main() -> PhysicsResult<()> {
    let mut world = World::new(WorldConfig::default());
    let terrain = Terrain::new(|x: f32, z: f32| (x * 0.4).sin() * (z * 0.3).cos(), -16.0, -16.0, 32, 32, 1.0)?;
    add_terrain(&mut world, terrain);

    let body = world.create_rigid_body();
    if let Some(body) = world.body_mut(body) {
        body.position = Vec3::new(0.0, 3.0, 0.0);
    }
    let sphere = world.add_shape(body, Shape::sphere(1.0))?;

    let origin = Vec3::new(0.0, 3.0, -10.0);
    match world.ray_cast(origin, Vec3::Z, None, |_| true, |_| true) {
        Some(hit) => println!("Ray hit {:?} at lambda {:.3} with normal {:?}", hit.proxy, hit.lambda, hit.normal),
        None => println!("Ray missed"),
    }

    let down = world.ray_cast(
        Vec3::new(4.0, 10.0, 4.0),
        -Vec3::Y,
        None,
        |proxy| proxy != ProxyRef::Shape(sphere),
        |_| true,
    );
    if let Some(hit) = down {
        println!("Terrain below (4, 4) at height {:.3}", 10.0 - hit.lambda);
    }
    Ok(())
}
