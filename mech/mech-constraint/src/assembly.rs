//! The canonical per-step pipeline over a set of connections.
//!
//! Drives the strict hook ordering every connection relies on: kinematic
//! update, slot injection, Jacobian loading, stabilization loading, then
//! assembly into one sparse system. The solve itself stays external; after
//! it, [`scatter_reactions`] hands the multipliers back to the connections.
//!
//! Updates are independent across connections (each reads holder state,
//! writes only itself), so the update phase runs on rayon when the
//! connection count crosses a threshold.

use mech_types::Result;
use nalgebra::DVector;
use rayon::prelude::*;
use tracing::debug;

use crate::connection::Connection;
use crate::descriptor::{AssembledSystem, SystemDescriptor};
use crate::world::MechanismWorld;

/// Options for one assembly pass.
#[derive(Debug, Clone, Copy)]
pub struct StepOptions {
    /// Stabilization scale applied to each row's violation (typically
    /// `1 / dt`).
    pub factor: f64,
    /// Magnitude limit for the stabilization term.
    pub recovery_clamp: f64,
    /// Whether the clamp is applied at all.
    pub do_clamp: bool,
    /// Run the update phase on the rayon pool when there are enough
    /// connections to amortize the overhead.
    pub parallel_update: bool,
    /// Connection count at which the parallel update kicks in.
    pub min_connections_for_parallel: usize,
}

impl Default for StepOptions {
    fn default() -> Self {
        Self {
            factor: 1.0,
            recovery_clamp: 0.1,
            do_clamp: true,
            parallel_update: true,
            min_connections_for_parallel: 64,
        }
    }
}

impl StepOptions {
    /// Set the stabilization factor.
    #[must_use]
    pub const fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    /// Set the recovery clamp magnitude.
    #[must_use]
    pub const fn with_recovery_clamp(mut self, clamp: f64) -> Self {
        self.recovery_clamp = clamp;
        self
    }

    /// Enable or disable clamping.
    #[must_use]
    pub const fn with_clamp(mut self, do_clamp: bool) -> Self {
        self.do_clamp = do_clamp;
        self
    }

    /// Enable or disable the parallel update phase.
    #[must_use]
    pub const fn with_parallel_update(mut self, parallel: bool) -> Self {
        self.parallel_update = parallel;
        self
    }
}

/// Run the full pre-solve pipeline and assemble the constraint system.
///
/// Ordering is fixed: update, inject, load Jacobians, reset + load
/// stabilization, assemble. Jacobians and violations in the result all
/// come from the same kinematic evaluation at `time`.
///
/// # Errors
///
/// Propagates the first holder-resolution or geometry error from any
/// connection's update or Jacobian load.
pub fn assemble_step(
    time: f64,
    world: &MechanismWorld,
    connections: &mut [&mut dyn Connection],
    options: &StepOptions,
) -> Result<(SystemDescriptor, AssembledSystem)> {
    if options.parallel_update && connections.len() >= options.min_connections_for_parallel {
        connections
            .par_iter_mut()
            .try_for_each(|conn| conn.update(time, world))?;
    } else {
        for conn in connections.iter_mut() {
            conn.update(time, world)?;
        }
    }

    let mut descriptor = SystemDescriptor::new(world.velocity_dofs());
    for conn in connections.iter_mut() {
        conn.inject_constraints(&mut descriptor);
    }

    for conn in connections.iter_mut() {
        if conn.is_active() {
            conn.load_constraint_jacobians(world)?;
        }
    }

    for conn in connections.iter_mut() {
        conn.constraints_bi_reset();
        conn.constraints_bi_load_c(options.factor, options.recovery_clamp, options.do_clamp);
    }

    debug!(
        time,
        connections = connections.len(),
        rows = descriptor.num_rows(),
        "pre-solve pipeline complete"
    );

    let system = descriptor.assemble(&connections.iter().map(|c| &**c).collect::<Vec<_>>())?;
    Ok((descriptor, system))
}

/// Hand solved multipliers back to the connections and convert them into
/// physical reactions.
///
/// `multipliers` is indexed by the row offsets assigned during the
/// injection phase of the matching [`assemble_step`] call; `factor` is the
/// impulse-to-force scale (typically `1 / dt`).
pub fn scatter_reactions(
    connections: &mut [&mut dyn Connection],
    multipliers: &DVector<f64>,
    factor: f64,
) {
    for conn in connections.iter_mut() {
        if !conn.is_active() {
            continue;
        }
        let off = conn.row_offset();
        conn.int_state_scatter_reactions(off, multipliers);
        conn.constraints_fetch_react(factor);
    }
}
