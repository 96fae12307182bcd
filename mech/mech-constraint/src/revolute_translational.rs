//! Composite revolute-translational joint between two rigid bodies.
//!
//! Body 1 carries a hinge point `p1` and hinge axis `z1`; body 2 carries a
//! guide point `p2` and an orthogonal direction pair `x2`, `y2` spanning
//! the plane normal to its own hinge axis. Four scalar bilateral rows hold
//! the mechanism together, in fixed order:
//!
//! | row | violation            | meaning                               |
//! |-----|----------------------|---------------------------------------|
//! | 0   | `z1 · x2`            | hinge axis stays normal to `x2`       |
//! | 1   | `z1 · y2`            | hinge axis stays normal to `y2`       |
//! | 2   | `d · z1`             | guide point stays in the hinge plane  |
//! | 3   | `‖d‖ - dist`         | hinge-to-guide separation is fixed    |
//!
//! with `d = p2 - p1` in world coordinates. Two relative motions remain
//! free: rotation about `z1` and translation of body 2 along its guide
//! line.
//!
//! Local geometry is fixed at initialization; world-frame geometry is
//! recomputed by every update and shared by the Jacobians and the reaction
//! queries of that step.

use mech_types::{BodyId, MechError, Pose, Result};
use nalgebra::{Matrix3, Point3, Rotation3, UnitQuaternion, Vector3};
use tracing::trace;

use crate::connection::{Connection, Wrench};
use crate::row::ConstraintRow;
use crate::world::MechanismWorld;

const PAR1: usize = 0;
const PAR2: usize = 1;
const DOT: usize = 2;
const DIST: usize = 3;

/// Separation below which the distance direction is degenerate.
const MIN_SEPARATION: f64 = 1e-12;

/// World-frame geometry cached by the last kinematic update.
#[derive(Debug, Clone, Copy, Default)]
struct WorldGeometry {
    p1: Vector3<f64>,
    p2: Vector3<f64>,
    z1: Vector3<f64>,
    x2: Vector3<f64>,
    y2: Vector3<f64>,
    /// `p2 - p1`.
    d: Vector3<f64>,
    /// Unit direction of `d` (guide direction when `d` degenerates).
    u: Vector3<f64>,
    /// Lever arm from body 1's origin to `p1`.
    s1: Vector3<f64>,
    /// Lever arm from body 2's origin to `p2`.
    s2: Vector3<f64>,
}

/// Revolute-translational joint: hinge on body 1, guide line on body 2.
#[derive(Debug, Clone)]
pub struct RevoluteTranslationalJoint {
    body1: BodyId,
    body2: BodyId,
    /// Hinge point, body 1 local frame.
    p1_local: Point3<f64>,
    /// Hinge axis, body 1 local frame, unit.
    z1_local: Vector3<f64>,
    /// Guide point, body 2 local frame.
    p2_local: Point3<f64>,
    /// First in-plane direction, body 2 local frame, unit.
    x2_local: Vector3<f64>,
    /// Second in-plane direction, body 2 local frame, unit.
    y2_local: Vector3<f64>,
    /// Imposed hinge-to-guide separation.
    distance: f64,
    geometry: WorldGeometry,
    active: bool,
    /// Reaction forces per row from the last fetch, multiplier order.
    react: [f64; 4],
    rows: Vec<ConstraintRow>,
    offset: usize,
}

fn unit_or_err(v: Vector3<f64>, what: &str) -> Result<Vector3<f64>> {
    let norm = v.norm();
    if norm < 1e-9 {
        return Err(MechError::degenerate(format!(
            "{what} direction has near-zero length"
        )));
    }
    Ok(v / norm)
}

impl RevoluteTranslationalJoint {
    /// Create a joint from a shared joint frame and an imposed separation.
    ///
    /// `csys` is given in absolute coordinates at the current body poses:
    /// its origin is the hinge point, its z-axis the hinge axis, its
    /// x-axis the guide direction. The guide point is placed at
    /// `distance` along the x-axis and both in-plane directions on body 2
    /// are taken from the frame, so the joint starts exactly assembled.
    ///
    /// # Errors
    ///
    /// Fails if either body handle does not resolve, if both handles name
    /// the same body, or if `distance` is not finite and non-negative.
    pub fn initialize(
        world: &MechanismWorld,
        body1: BodyId,
        body2: BodyId,
        csys: &Pose,
        distance: f64,
    ) -> Result<Self> {
        let x_axis = csys.transform_vector(&Vector3::x());
        let y_axis = csys.transform_vector(&Vector3::y());
        let z_axis = csys.transform_vector(&Vector3::z());
        let p1 = csys.position;
        let p2 = p1 + distance * x_axis;

        Self::initialize_from_points(
            world, body1, body2, false, p1, z_axis, p2, x_axis, y_axis, false, distance,
        )
    }

    /// Create a joint from explicit geometry on each body.
    ///
    /// With `local` set, points and directions are interpreted in each
    /// body's local frame; otherwise in absolute coordinates at the
    /// current poses. With `auto_distance` set, the imposed separation is
    /// measured from the current configuration and `distance` is ignored.
    ///
    /// # Errors
    ///
    /// Fails on unresolved handles, identical bodies, near-zero
    /// directions, a non-orthogonal `x2`/`y2` pair, or a negative or
    /// non-finite separation.
    #[allow(clippy::too_many_arguments)]
    pub fn initialize_from_points(
        world: &MechanismWorld,
        body1: BodyId,
        body2: BodyId,
        local: bool,
        p1: Point3<f64>,
        dir_z1: Vector3<f64>,
        p2: Point3<f64>,
        dir_x2: Vector3<f64>,
        dir_y2: Vector3<f64>,
        auto_distance: bool,
        distance: f64,
    ) -> Result<Self> {
        if body1 == body2 {
            return Err(MechError::invalid_config(
                "revolute-translational joint requires two distinct bodies",
            ));
        }
        let state1 = world.body(body1)?;
        let state2 = world.body(body2)?;

        let z1 = unit_or_err(dir_z1, "hinge axis")?;
        let x2 = unit_or_err(dir_x2, "guide x2")?;
        let y2 = unit_or_err(dir_y2, "guide y2")?;
        if x2.dot(&y2).abs() > 1e-6 {
            return Err(MechError::degenerate(
                "x2 and y2 directions must be orthogonal",
            ));
        }

        let (p1_local, z1_local, p2_local, x2_local, y2_local) = if local {
            (p1, z1, p2, x2, y2)
        } else {
            (
                state1.pose.inverse_transform_point(&p1),
                state1.pose.inverse_transform_vector(&z1),
                state2.pose.inverse_transform_point(&p2),
                state2.pose.inverse_transform_vector(&x2),
                state2.pose.inverse_transform_vector(&y2),
            )
        };

        let distance = if auto_distance {
            let p1_abs = if local {
                state1.pose.transform_point(&p1)
            } else {
                p1
            };
            let p2_abs = if local {
                state2.pose.transform_point(&p2)
            } else {
                p2
            };
            (p2_abs - p1_abs).norm()
        } else {
            distance
        };
        if !distance.is_finite() || distance < 0.0 {
            return Err(MechError::invalid_config(
                "joint separation must be finite and non-negative",
            ));
        }

        let mut joint = Self {
            body1,
            body2,
            p1_local,
            z1_local,
            p2_local,
            x2_local,
            y2_local,
            distance,
            geometry: WorldGeometry::default(),
            active: true,
            react: [0.0; 4],
            rows: vec![
                ConstraintRow::new(),
                ConstraintRow::new(),
                ConstraintRow::new(),
                ConstraintRow::new(),
            ],
            offset: 0,
        };
        joint.refresh_geometry(world)?;
        Ok(joint)
    }

    fn refresh_geometry(&mut self, world: &MechanismWorld) -> Result<()> {
        let state1 = world.body(self.body1)?;
        let state2 = world.body(self.body2)?;

        let p1 = state1.pose.transform_point(&self.p1_local).coords;
        let p2 = state2.pose.transform_point(&self.p2_local).coords;
        let d = p2 - p1;
        let norm = d.norm();
        let u = if norm > MIN_SEPARATION {
            d / norm
        } else {
            // Coincident points: fall back to the guide direction.
            state2.pose.transform_vector(&self.x2_local)
        };

        self.geometry = WorldGeometry {
            p1,
            p2,
            z1: state1.pose.transform_vector(&self.z1_local),
            x2: state2.pose.transform_vector(&self.x2_local),
            y2: state2.pose.transform_vector(&self.y2_local),
            d,
            u,
            s1: p1 - state1.pose.position.coords,
            s2: p2 - state2.pose.position.coords,
        };
        Ok(())
    }

    /// First connected body.
    #[must_use]
    pub const fn body1(&self) -> BodyId {
        self.body1
    }

    /// Second connected body.
    #[must_use]
    pub const fn body2(&self) -> BodyId {
        self.body2
    }

    /// The imposed hinge-to-guide separation.
    #[must_use]
    pub const fn distance(&self) -> f64 {
        self.distance
    }

    /// Hinge point in body 1's local frame.
    #[must_use]
    pub const fn point1(&self) -> Point3<f64> {
        self.p1_local
    }

    /// Guide point in body 2's local frame.
    #[must_use]
    pub const fn point2(&self) -> Point3<f64> {
        self.p2_local
    }

    /// Hinge point in world coordinates, as of the last update.
    #[must_use]
    pub fn point1_abs(&self) -> Point3<f64> {
        Point3::from(self.geometry.p1)
    }

    /// Guide point in world coordinates, as of the last update.
    #[must_use]
    pub fn point2_abs(&self) -> Point3<f64> {
        Point3::from(self.geometry.p2)
    }

    /// Hinge axis in world coordinates, as of the last update.
    #[must_use]
    pub const fn dir_z1_abs(&self) -> Vector3<f64> {
        self.geometry.z1
    }

    /// First in-plane direction in world coordinates, as of the last
    /// update.
    #[must_use]
    pub const fn dir_x2_abs(&self) -> Vector3<f64> {
        self.geometry.x2
    }

    /// Second in-plane direction in world coordinates, as of the last
    /// update.
    #[must_use]
    pub const fn dir_y2_abs(&self) -> Vector3<f64> {
        self.geometry.y2
    }

    /// Actual hinge-to-guide separation at the last update (equals
    /// [`distance`](Self::distance) plus the `dist` violation).
    #[must_use]
    pub fn current_distance(&self) -> f64 {
        self.geometry.d.norm()
    }

    /// Enable or disable the joint.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// The four violations from the last update, in multiplier order.
    #[must_use]
    pub fn violations(&self) -> [f64; 4] {
        [
            self.rows[PAR1].violation(),
            self.rows[PAR2].violation(),
            self.rows[DOT].violation(),
            self.rows[DIST].violation(),
        ]
    }

    /// Joint frame on body 1: origin at the hinge point, z along the hinge
    /// axis, x toward the guide point.
    #[must_use]
    pub fn link_frame1(&self) -> Pose {
        let g = &self.geometry;
        Pose::from_position_rotation(Point3::from(g.p1), frame_rotation(g.u, g.z1))
    }

    /// Joint frame on body 2: origin at the guide point, z normal to the
    /// guide plane, x toward-from the hinge point.
    #[must_use]
    pub fn link_frame2(&self) -> Pose {
        let g = &self.geometry;
        let z2 = g.x2.cross(&g.y2);
        Pose::from_position_rotation(Point3::from(g.p2), frame_rotation(g.u, z2))
    }

    /// Reaction wrench exerted on body 1, expressed in
    /// [`link_frame1`](Self::link_frame1) and acting at its origin.
    #[must_use]
    pub fn reaction_on_body1(&self) -> Wrench {
        let g = &self.geometry;
        // World-frame force and torque at the hinge point. Shifting the
        // torque to the hinge point cancels the lever-arm terms.
        let force = -(self.react[DOT] * g.z1 + self.react[DIST] * g.u);
        let torque = self.react[PAR1] * g.z1.cross(&g.x2)
            + self.react[PAR2] * g.z1.cross(&g.y2)
            + self.react[DOT] * g.z1.cross(&g.d);

        let frame = self.link_frame1();
        Wrench::new(
            frame.inverse_transform_vector(&force),
            frame.inverse_transform_vector(&torque),
        )
    }

    /// Reaction wrench exerted on body 2, expressed in
    /// [`link_frame2`](Self::link_frame2) and acting at its origin.
    #[must_use]
    pub fn reaction_on_body2(&self) -> Wrench {
        let g = &self.geometry;
        let force = self.react[DOT] * g.z1 + self.react[DIST] * g.u;
        let torque =
            -self.react[PAR1] * g.z1.cross(&g.x2) - self.react[PAR2] * g.z1.cross(&g.y2);

        let frame = self.link_frame2();
        Wrench::new(
            frame.inverse_transform_vector(&force),
            frame.inverse_transform_vector(&torque),
        )
    }
}

/// Right-handed rotation with the given x and z axes (assumed unit and
/// orthogonal up to numerical noise).
fn frame_rotation(x: Vector3<f64>, z: Vector3<f64>) -> UnitQuaternion<f64> {
    let y = z.cross(&x);
    let rot = Rotation3::from_matrix(&Matrix3::from_columns(&[x, y, z]));
    UnitQuaternion::from_rotation_matrix(&rot)
}

impl Connection for RevoluteTranslationalJoint {
    fn is_active(&self) -> bool {
        self.active
    }

    fn row_offset(&self) -> usize {
        self.offset
    }

    fn set_row_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    fn rows(&self) -> &[ConstraintRow] {
        &self.rows
    }

    fn rows_mut(&mut self) -> &mut [ConstraintRow] {
        &mut self.rows
    }

    fn update(&mut self, _time: f64, world: &MechanismWorld) -> Result<()> {
        self.refresh_geometry(world)?;
        let g = self.geometry;

        self.rows[PAR1].set_violation(g.z1.dot(&g.x2));
        self.rows[PAR2].set_violation(g.z1.dot(&g.y2));
        self.rows[DOT].set_violation(g.d.dot(&g.z1));
        self.rows[DIST].set_violation(g.d.norm() - self.distance);

        trace!(
            par1 = self.rows[PAR1].violation(),
            par2 = self.rows[PAR2].violation(),
            dot = self.rows[DOT].violation(),
            dist = self.rows[DIST].violation(),
            "revolute-translational update"
        );
        Ok(())
    }

    fn load_constraint_jacobians(&mut self, world: &MechanismWorld) -> Result<()> {
        let g = self.geometry;
        let b1 = world.body_velocity_offset(self.body1)?;
        let b2 = world.body_velocity_offset(self.body2)?;

        let push_vec = |row: &mut ConstraintRow, base: usize, v: Vector3<f64>| {
            row.push_jacobian(base, v.x);
            row.push_jacobian(base + 1, v.y);
            row.push_jacobian(base + 2, v.z);
        };

        for row in &mut self.rows {
            row.clear_jacobian();
        }

        // d/dt(z1 · x2) = w1 · (z1 × x2) - w2 · (z1 × x2)
        let zx = g.z1.cross(&g.x2);
        push_vec(&mut self.rows[PAR1], b1 + 3, zx);
        push_vec(&mut self.rows[PAR1], b2 + 3, -zx);

        let zy = g.z1.cross(&g.y2);
        push_vec(&mut self.rows[PAR2], b1 + 3, zy);
        push_vec(&mut self.rows[PAR2], b2 + 3, -zy);

        // d/dt(d · z1) with pdot_i = v_i + w_i × s_i
        push_vec(&mut self.rows[DOT], b1, -g.z1);
        push_vec(&mut self.rows[DOT], b1 + 3, g.z1.cross(&g.d) - g.s1.cross(&g.z1));
        push_vec(&mut self.rows[DOT], b2, g.z1);
        push_vec(&mut self.rows[DOT], b2 + 3, g.s2.cross(&g.z1));

        // d/dt(‖d‖) = u · ddot
        push_vec(&mut self.rows[DIST], b1, -g.u);
        push_vec(&mut self.rows[DIST], b1 + 3, -g.s1.cross(&g.u));
        push_vec(&mut self.rows[DIST], b2, g.u);
        push_vec(&mut self.rows[DIST], b2 + 3, g.s2.cross(&g.u));

        Ok(())
    }

    fn constraints_fetch_react(&mut self, factor: f64) {
        for (i, row) in self.rows.iter().enumerate() {
            self.react[i] = row.multiplier() * factor;
        }
    }
}
