//! End-to-end pipeline tests: assemble, solve, apply, fetch reactions.

use approx::assert_relative_eq;
use mech_constraint::{
    assemble_step, scatter_reactions, Connection, MechanismWorld, PlanetaryCoupling,
    RevoluteTranslationalJoint, StepOptions,
};
use mech_types::{MassProperties, Pose, RigidBodyState, ShaftState, Twist};
use nalgebra::{Point3, Vector3};

#[test]
fn differential_enforces_shaft_relation_and_torque_balance() {
    // Open differential: carrier at -2, left and right outputs at 1 each.
    let mut world = MechanismWorld::new();
    let carrier = world.add_shaft(ShaftState::spinning(1.0), 2.0);
    let left = world.add_shaft(ShaftState::spinning(3.0), 1.0);
    let right = world.add_shaft(ShaftState::spinning(0.5), 1.0);

    let mut gear = PlanetaryCoupling::initialize(&world, carrier, left, right)
        .unwrap()
        .with_ratios(-2.0, 1.0, 1.0)
        .unwrap();

    let mut connections: Vec<&mut dyn Connection> = vec![&mut gear];
    let options = StepOptions::default();
    let (_, system) = assemble_step(0.0, &world, &mut connections, &options).unwrap();

    let inv_mass = world.inverse_mass_matrix();
    let v = world.velocity_vector();
    let multipliers = system.solve_reference(&inv_mass, &v, 0.0);

    let corrected = &v + system.velocity_response(&inv_mass, &multipliers);
    world.apply_velocity_vector(&corrected).unwrap();

    scatter_reactions(&mut connections, &multipliers, 1.0);

    // Speeds now satisfy the coupling
    assert_relative_eq!(
        gear.velocity_violation(&world).unwrap(),
        0.0,
        epsilon = 1e-9
    );

    // Reaction torques scale with the ratios and sum against them
    let t = gear.torque_react();
    assert!(t.abs() > 0.0);
    assert_relative_eq!(gear.reaction1(), -2.0 * t, epsilon = 1e-12);
    assert_relative_eq!(gear.reaction2(), t, epsilon = 1e-12);
    assert_relative_eq!(gear.reaction3(), t, epsilon = 1e-12);
}

#[test]
fn revolute_translational_correction_removes_separation_drift() {
    // Body 2 drifted 5 cm outward along the guide direction and is moving
    // further out; one velocity-level step with stabilization pulls the
    // residual to the clamped correction target.
    let mut world = MechanismWorld::new();
    let b1 = world.add_body(
        RigidBodyState::at_rest(Pose::from_position(Point3::origin())),
        MassProperties::fixed(),
    );
    let b2 = world.add_body(
        RigidBodyState::new(
            Pose::from_position(Point3::new(1.05, 0.0, 0.0)),
            Twist::linear(Vector3::new(0.2, 0.0, 0.0)),
        ),
        MassProperties::point_mass(1.0),
    );

    let mut joint = RevoluteTranslationalJoint::initialize_from_points(
        &world,
        b1,
        b2,
        true,
        Point3::origin(),
        Vector3::z(),
        Point3::origin(),
        Vector3::x(),
        Vector3::y(),
        false,
        1.0,
    )
    .unwrap();

    let options = StepOptions::default()
        .with_factor(10.0)
        .with_recovery_clamp(1.0);
    let mut connections: Vec<&mut dyn Connection> = vec![&mut joint];
    let (_, system) = assemble_step(0.0, &world, &mut connections, &options).unwrap();

    let inv_mass = world.inverse_mass_matrix();
    let v = world.velocity_vector();
    let multipliers = system.solve_reference(&inv_mass, &v, 0.0);
    let corrected = &v + system.velocity_response(&inv_mass, &multipliers);

    // Post-solve velocity residual is zero: the corrective velocity
    // cancels both the outward drift rate and the stabilization term.
    let residual = system.residual(&corrected);
    for i in 0..residual.len() {
        assert_relative_eq!(residual[i], 0.0, epsilon = 1e-9);
    }

    // Body 2 ends up moving inward at the correction rate (0.05 * 10)
    world.apply_velocity_vector(&corrected).unwrap();
    let twist = world.body(b2).unwrap().twist;
    assert_relative_eq!(twist.linear.x, -0.5, epsilon = 1e-9);

    // The distance row pushed back along the guide axis
    scatter_reactions(&mut connections, &multipliers, 1.0);
    let w2 = joint.reaction_on_body2();
    assert!(w2.force.x < 0.0);
    assert_relative_eq!(w2.force.y, 0.0, epsilon = 1e-9);
    assert_relative_eq!(w2.torque.norm(), 0.0, epsilon = 1e-9);
}

#[test]
fn mixed_bodies_and_shafts_share_one_assembly() {
    let mut world = MechanismWorld::new();
    let b1 = world.add_body(
        RigidBodyState::at_rest(Pose::from_position(Point3::origin())),
        MassProperties::fixed(),
    );
    let b2 = world.add_body(
        RigidBodyState::at_rest(Pose::from_position(Point3::new(1.0, 0.0, 0.0))),
        MassProperties::point_mass(1.0),
    );
    let s1 = world.add_shaft(ShaftState::spinning(1.0), 1.0);
    let s2 = world.add_shaft(ShaftState::spinning(1.0), 1.0);
    let s3 = world.add_shaft(ShaftState::spinning(-1.0), 1.0);

    let mut joint = RevoluteTranslationalJoint::initialize(
        &world,
        b1,
        b2,
        &Pose::from_position(Point3::origin()),
        1.0,
    )
    .unwrap();
    let mut gear = PlanetaryCoupling::initialize(&world, s1, s2, s3)
        .unwrap()
        .with_ordinary_ratio(-1.0)
        .unwrap();

    let mut connections: Vec<&mut dyn Connection> = vec![&mut joint, &mut gear];
    let (descriptor, system) =
        assemble_step(0.0, &world, &mut connections, &StepOptions::default()).unwrap();

    // 4 joint rows + 1 coupling row over 12 body + 3 shaft columns
    assert_eq!(descriptor.num_rows(), 5);
    assert_eq!(system.jacobian.ncols(), 15);
    assert_eq!(gear.row_offset(), 4);

    let inv_mass = world.inverse_mass_matrix();
    let v = world.velocity_vector();
    let multipliers = system.solve_reference(&inv_mass, &v, 0.0);
    let corrected = &v + system.velocity_response(&inv_mass, &multipliers);
    let residual = system.residual(&corrected);
    for i in 0..residual.len() {
        assert_relative_eq!(residual[i], 0.0, epsilon = 1e-9);
    }
}

#[test]
fn inactive_coupling_drops_out_of_assembly() {
    let mut world = MechanismWorld::new();
    let s1 = world.add_shaft(ShaftState::spinning(1.0), 1.0);
    let s2 = world.add_shaft(ShaftState::spinning(2.0), 1.0);
    let s3 = world.add_shaft(ShaftState::spinning(3.0), 1.0);

    let mut gear = PlanetaryCoupling::initialize(&world, s1, s2, s3).unwrap();
    gear.set_active(false);

    let mut connections: Vec<&mut dyn Connection> = vec![&mut gear];
    let (descriptor, system) =
        assemble_step(0.0, &world, &mut connections, &StepOptions::default()).unwrap();
    assert_eq!(descriptor.num_rows(), 0);
    assert_eq!(system.jacobian.nnz(), 0);
}
