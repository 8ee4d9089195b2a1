//! Impulse-based rigid-body physics simulation.
//!
//! The [`Environment`] owns a set of rigid bodies and advances them through a
//! fixed-substep loop: narrow-phase collision detection with contact
//! deduplication, force integration, impulse-based contact resolution, sleep
//! bookkeeping and position integration, in that order.

pub mod collision;
pub mod inertia;
pub mod material;
pub mod quantities;
pub mod rigid_body;
pub mod solver;

use anyhow::{Result, bail};
use collision::{Contact, ContactBuffer, detect_collision};
use log::{debug, trace};
use num_traits::FromPrimitive;
use quantities::{AngularVelocity, Force, Torque, Velocity};
use rigid_body::{BodyRegistry, RigidBody, RigidBodyID};
use solver::{ImpulseSolver, ImpulseSolverConfig};

/// Floating point type used for physics simulation.
#[allow(non_camel_case_types)]
pub type fph = f64;

/// The simulation environment.
///
/// Owns every registered rigid body (bodies still registered when the
/// environment is dropped are dropped with it) together with the per-update
/// contact buffer and the impulse solver. All simulation work happens
/// synchronously inside [`Self::update`]; the environment is meant to be
/// driven from a single-threaded frame loop.
#[derive(Debug)]
pub struct Environment {
    bodies: BodyRegistry,
    contacts: ContactBuffer,
    solver: ImpulseSolver,
}

/// Configuration parameters for an [`Environment`]. The capacities are purely
/// pre-sizing hints for internal storage, not correctness inputs.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[derive(Clone, Debug)]
pub struct EnvironmentConfig {
    /// The expected number of simultaneously registered rigid bodies.
    pub rigid_body_capacity: usize,
    /// The expected number of contacts buffered over one update call.
    pub contact_capacity: usize,
    /// Configuration parameters for the impulse solver.
    pub solver: ImpulseSolverConfig,
}

impl Environment {
    /// Creates a new environment with the given configuration parameters.
    pub fn new(config: EnvironmentConfig) -> Self {
        Self {
            bodies: BodyRegistry::with_capacity(config.rigid_body_capacity),
            contacts: ContactBuffer::with_capacity(config.contact_capacity),
            solver: ImpulseSolver::new(config.solver),
        }
    }

    /// Takes ownership of the given body and registers it for simulation.
    ///
    /// # Returns
    /// A new unique [`RigidBodyID`] referring to the registered body.
    pub fn register_body(&mut self, body: RigidBody) -> RigidBodyID {
        self.bodies.register(body)
    }

    /// Unregisters the body with the given ID, releasing ownership of it to
    /// the caller.
    ///
    /// # Returns
    /// The body, or [`None`] if no body with the given ID is registered (in
    /// which case nothing changes).
    pub fn unregister_body(&mut self, id: RigidBodyID) -> Option<RigidBody> {
        self.bodies.unregister(id)
    }

    /// Returns a reference to the [`BodyRegistry`].
    pub fn bodies(&self) -> &BodyRegistry {
        &self.bodies
    }

    /// Returns a reference to the body with the given ID, or [`None`] if it
    /// is not registered.
    pub fn get_body(&self, id: RigidBodyID) -> Option<&RigidBody> {
        self.bodies.get_body(id)
    }

    /// Returns a mutable reference to the body with the given ID, or [`None`]
    /// if it is not registered.
    pub fn get_body_mut(&mut self, id: RigidBodyID) -> Option<&mut RigidBody> {
        self.bodies.get_body_mut(id)
    }

    /// Returns the contacts buffered during the most recent call to
    /// [`Self::update`], in insertion order.
    pub fn contacts(&self) -> &[Contact] {
        self.contacts.contacts()
    }

    /// Returns a reference to the [`ImpulseSolver`].
    pub fn solver(&self) -> &ImpulseSolver {
        &self.solver
    }

    /// Advances the simulation by the given elapsed time, split into the
    /// given number of equal-duration substeps.
    ///
    /// The contact buffer is cleared once per call and accumulates contacts
    /// across all substeps of the call. Force and torque accumulators persist
    /// across the substeps and are reset once at the very end, so forces
    /// applied before the call act for the full elapsed time and must be
    /// reapplied before the next call.
    ///
    /// # Errors
    /// Returns an error if `n_substeps` is zero or `elapsed_time` is negative
    /// or not finite.
    pub fn update(&mut self, elapsed_time: fph, n_substeps: u32) -> Result<()> {
        if n_substeps == 0 {
            bail!("Invalid number of substeps for environment update: {n_substeps}");
        }
        if !elapsed_time.is_finite() || elapsed_time < 0.0 {
            bail!("Invalid elapsed time for environment update: {elapsed_time}");
        }

        let dt = elapsed_time / fph::from_u32(n_substeps).unwrap();

        self.contacts.clear();

        for substep in 0..n_substeps {
            self.perform_substep(dt);
            trace!(
                "Completed substep {}/{} with {} buffered contacts",
                substep + 1,
                n_substeps,
                self.contacts.len()
            );
        }

        for body in self.bodies.bodies_mut() {
            body.set_force(Force::zeros());
            body.set_torque(Torque::zeros());
        }

        debug!(
            "Advanced simulation by {:.3e} in {} substeps ({} bodies, {} contacts)",
            elapsed_time,
            n_substeps,
            self.bodies.len(),
            self.contacts.len()
        );

        Ok(())
    }

    fn perform_substep(&mut self, dt: fph) {
        for body in self.bodies.bodies_mut() {
            body.clear_solver_work_area();
            // The orientation may have changed during the previous substep's
            // position integration
            body.update_inv_inertia_world();
        }

        self.detect_collisions();

        for body in self.bodies.bodies_mut() {
            body.update_velocity(dt);
        }

        self.resolve_contacts(dt);

        for body in self.bodies.bodies_mut() {
            body.correct_velocity();
        }

        for body in self.bodies.bodies_mut() {
            body.update_sleep_status(dt);
            if body.sleeping() {
                body.set_linear_velocity(Velocity::zeros());
                body.set_angular_velocity(AngularVelocity::zeros());
            }
        }

        for body in self.bodies.bodies_mut() {
            body.update_position(dt);
        }
    }

    fn detect_collisions(&mut self) {
        let n_bodies = self.bodies.len();
        for idx_a in 0..n_bodies {
            for idx_b in (idx_a + 1)..n_bodies {
                let body_a = self.bodies.body_at_index(idx_a);
                let body_b = self.bodies.body_at_index(idx_b);

                // Two fixed bodies can never collide meaningfully
                if body_a.is_fixed() && body_b.is_fixed() {
                    continue;
                }

                if let Some(contact) = detect_collision(
                    self.bodies.id_at_index(idx_a),
                    body_a,
                    self.bodies.id_at_index(idx_b),
                    body_b,
                ) {
                    self.contacts.add_contact(contact);
                }
            }
        }
    }

    fn resolve_contacts(&mut self, dt: fph) {
        for contact in self.contacts.contacts() {
            if let Some(bodies) = self.bodies.get_body_pair_mut(contact.body_a, contact.body_b) {
                self.solver.apply_impulse(contact, bodies, dt);
            }
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(EnvironmentConfig::default())
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            rigid_body_capacity: 64,
            contact_capacity: 128,
            solver: ImpulseSolverConfig::default(),
        }
    }
}
