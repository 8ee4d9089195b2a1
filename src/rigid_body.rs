//! Rigid bodies and the registry that owns them.

use crate::{
    collision::CollisionShape,
    fph,
    inertia::InertiaTensor,
    material::ContactResponseParameters,
    quantities::{AngularVelocity, Force, Impulse, Orientation, Position, Torque, Velocity},
};
use bytemuck::{Pod, Zeroable};
use nalgebra::{Matrix3, Quaternion, UnitQuaternion};
use rustc_hash::FxHashMap;

/// Identifier for a [`RigidBody`] in a [`BodyRegistry`].
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Zeroable, Pod)]
pub struct RigidBodyID(u64);

/// Owns every rigid body participating in a simulation and maps stable
/// [`RigidBodyID`]s to their state.
///
/// Bodies are stored contiguously and processed in storage order. Removal
/// swaps the last body into the vacated slot, so storage order is not
/// preserved across unregistrations; nothing in the simulation depends on it
/// beyond contact-merge tie-breaking.
#[derive(Clone, Debug)]
pub struct BodyRegistry {
    bodies: Vec<RigidBody>,
    ids: Vec<RigidBodyID>,
    indices_by_id: FxHashMap<RigidBodyID, usize>,
    id_counter: u64,
}

/// A simulated rigid body.
///
/// A body is either dynamic or fixed. Fixed bodies have infinite effective
/// mass and inertia: they never move, and forces, impulses and integration
/// are no-ops for them. Dynamic bodies carry force and torque accumulators
/// that persist until the environment resets them at the end of an update.
#[derive(Clone, Debug)]
pub struct RigidBody {
    shape: CollisionShape,
    fixed: bool,
    mass: fph,
    inertia_tensor: InertiaTensor,
    position: Position,
    orientation: Orientation,
    velocity: Velocity,
    angular_velocity: AngularVelocity,
    force: Force,
    torque: Torque,
    inv_inertia_world: Matrix3<fph>,
    response_params: ContactResponseParameters,
    solver_work_area: SolverWorkArea,
    sleep_timer: fph,
    sleeping: bool,
}

/// Scratch state the impulse solver accumulates on a body during a substep.
/// Holds the velocity corrections from positional (penetration) correction,
/// which are folded into the body's velocities by
/// [`RigidBody::correct_velocity`].
#[derive(Clone, Copy, Debug, Default)]
struct SolverWorkArea {
    linear_correction: Velocity,
    angular_correction: AngularVelocity,
}

/// Squared speed (linear plus angular) below which a body is considered to be
/// at rest for the purpose of the sleep heuristic.
const SLEEP_MOTION_THRESHOLD: fph = 1e-3;

/// How long a body must stay below [`SLEEP_MOTION_THRESHOLD`] before it is
/// put to sleep.
const SLEEP_ONSET_DELAY: fph = 0.5;

impl BodyRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty registry with storage pre-sized for the given number
    /// of bodies.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bodies: Vec::with_capacity(capacity),
            ids: Vec::with_capacity(capacity),
            indices_by_id: FxHashMap::default(),
            id_counter: 0,
        }
    }

    /// The number of registered bodies.
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    /// Whether no bodies are registered.
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Whether a body with the given ID is registered.
    pub fn contains(&self, id: RigidBodyID) -> bool {
        self.indices_by_id.contains_key(&id)
    }

    /// Takes ownership of the given body and registers it.
    ///
    /// # Returns
    /// A new unique [`RigidBodyID`] referring to the registered body. Since
    /// IDs are minted here and never reused, the same body can not be
    /// registered twice.
    pub fn register(&mut self, body: RigidBody) -> RigidBodyID {
        let id = self.create_new_body_id();
        self.indices_by_id.insert(id, self.bodies.len());
        self.bodies.push(body);
        self.ids.push(id);
        id
    }

    /// Unregisters the body with the given ID, releasing ownership of it to
    /// the caller.
    ///
    /// # Returns
    /// The body, or [`None`] if no body with the given ID is registered (in
    /// which case the registry is left unchanged).
    pub fn unregister(&mut self, id: RigidBodyID) -> Option<RigidBody> {
        let idx = self.indices_by_id.remove(&id)?;
        let body = self.bodies.swap_remove(idx);
        self.ids.swap_remove(idx);
        if let Some(&moved_id) = self.ids.get(idx) {
            self.indices_by_id.insert(moved_id, idx);
        }
        Some(body)
    }

    /// Returns a reference to the body with the given ID, or [`None`] if it
    /// is not registered.
    pub fn get_body(&self, id: RigidBodyID) -> Option<&RigidBody> {
        let idx = *self.indices_by_id.get(&id)?;
        Some(&self.bodies[idx])
    }

    /// Returns a mutable reference to the body with the given ID, or [`None`]
    /// if it is not registered.
    pub fn get_body_mut(&mut self, id: RigidBodyID) -> Option<&mut RigidBody> {
        let idx = *self.indices_by_id.get(&id)?;
        Some(&mut self.bodies[idx])
    }

    /// Returns mutable references to the two bodies with the given IDs, or
    /// [`None`] if either of them is not registered.
    ///
    /// # Panics
    /// If the two IDs are equal.
    pub fn get_body_pair_mut(
        &mut self,
        id_a: RigidBodyID,
        id_b: RigidBodyID,
    ) -> Option<[&mut RigidBody; 2]> {
        assert_ne!(id_a, id_b);
        let idx_a = *self.indices_by_id.get(&id_a)?;
        let idx_b = *self.indices_by_id.get(&id_b)?;
        self.bodies.get_disjoint_mut([idx_a, idx_b]).ok()
    }

    /// Returns the slice of all registered bodies.
    pub fn bodies(&self) -> &[RigidBody] {
        &self.bodies
    }

    /// Returns the mutable slice of all registered bodies.
    pub fn bodies_mut(&mut self) -> &mut [RigidBody] {
        &mut self.bodies
    }

    /// Returns the IDs of all registered bodies, in storage order.
    pub fn ids(&self) -> &[RigidBodyID] {
        &self.ids
    }

    /// Returns a reference to the body at the given storage index.
    pub fn body_at_index(&self, idx: usize) -> &RigidBody {
        &self.bodies[idx]
    }

    /// Returns the ID of the body at the given storage index.
    pub fn id_at_index(&self, idx: usize) -> RigidBodyID {
        self.ids[idx]
    }

    /// Iterates over all registered bodies with their IDs.
    pub fn iter(&self) -> impl Iterator<Item = (RigidBodyID, &RigidBody)> {
        self.ids.iter().copied().zip(self.bodies.iter())
    }

    /// Removes all registered bodies.
    pub fn clear(&mut self) {
        self.bodies.clear();
        self.ids.clear();
        self.indices_by_id.clear();
    }

    fn create_new_body_id(&mut self) -> RigidBodyID {
        let id = RigidBodyID(self.id_counter);
        self.id_counter = self.id_counter.checked_add(1).unwrap();
        id
    }
}

impl Default for BodyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RigidBody {
    /// Creates a new dynamic rigid body with the given properties.
    pub fn new_dynamic(
        shape: CollisionShape,
        mass: fph,
        inertia_tensor: InertiaTensor,
        position: Position,
        orientation: Orientation,
        velocity: Velocity,
        angular_velocity: AngularVelocity,
    ) -> Self {
        let mut body = Self {
            shape,
            fixed: false,
            mass,
            inertia_tensor,
            position,
            orientation,
            velocity,
            angular_velocity,
            force: Force::zeros(),
            torque: Torque::zeros(),
            inv_inertia_world: Matrix3::zeros(),
            response_params: ContactResponseParameters::default(),
            solver_work_area: SolverWorkArea::default(),
            sleep_timer: 0.0,
            sleeping: false,
        };
        body.update_inv_inertia_world();
        body
    }

    /// Creates a new fixed rigid body with the given properties. Fixed bodies
    /// never move and are unaffected by forces and impulses.
    pub fn new_fixed(shape: CollisionShape, position: Position, orientation: Orientation) -> Self {
        Self {
            shape,
            fixed: true,
            mass: fph::INFINITY,
            inertia_tensor: InertiaTensor::identity(),
            position,
            orientation,
            velocity: Velocity::zeros(),
            angular_velocity: AngularVelocity::zeros(),
            force: Force::zeros(),
            torque: Torque::zeros(),
            inv_inertia_world: Matrix3::zeros(),
            response_params: ContactResponseParameters::default(),
            solver_work_area: SolverWorkArea::default(),
            sleep_timer: 0.0,
            sleeping: false,
        }
    }

    /// Creates a dynamic rigid body for a uniformly dense sphere with the
    /// given radius and mass density, at rest at the given position.
    pub fn uniform_sphere(radius: fph, mass_density: fph, position: Position) -> Self {
        let mass = crate::inertia::compute_uniform_sphere_mass(radius, mass_density);
        Self::new_dynamic(
            CollisionShape::Sphere { radius },
            mass,
            InertiaTensor::of_uniform_sphere(mass, radius),
            position,
            Orientation::identity(),
            Velocity::zeros(),
            AngularVelocity::zeros(),
        )
    }

    /// Returns the body with the given contact response parameters.
    pub fn with_response_params(mut self, response_params: ContactResponseParameters) -> Self {
        self.response_params = response_params;
        self
    }

    /// Returns the body with the given initial velocity.
    pub fn with_velocity(mut self, velocity: Velocity) -> Self {
        self.velocity = velocity;
        self
    }

    /// Whether the body is fixed (never moves).
    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// Whether the body is currently sleeping.
    pub fn sleeping(&self) -> bool {
        self.sleeping
    }

    /// Returns the collision shape of the body.
    pub fn shape(&self) -> &CollisionShape {
        &self.shape
    }

    /// Returns the mass of the body.
    pub fn mass(&self) -> fph {
        self.mass
    }

    /// Returns the inverse mass of the body (zero for fixed bodies).
    pub fn inverse_mass(&self) -> fph {
        if self.fixed { 0.0 } else { 1.0 / self.mass }
    }

    /// Returns the inertia tensor of the body.
    pub fn inertia_tensor(&self) -> &InertiaTensor {
        &self.inertia_tensor
    }

    /// Returns the world-space inverse inertia tensor matrix as of the last
    /// call to [`Self::update_inv_inertia_world`] (the zero matrix for fixed
    /// bodies).
    pub fn inv_inertia_world(&self) -> &Matrix3<fph> {
        &self.inv_inertia_world
    }

    /// Returns the position of the body.
    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Returns the orientation of the body.
    pub fn orientation(&self) -> &Orientation {
        &self.orientation
    }

    /// Returns the linear velocity of the body.
    pub fn velocity(&self) -> &Velocity {
        &self.velocity
    }

    /// Returns the angular velocity of the body.
    pub fn angular_velocity(&self) -> &AngularVelocity {
        &self.angular_velocity
    }

    /// Returns the current total force on the body.
    pub fn force(&self) -> &Force {
        &self.force
    }

    /// Returns the current total torque on the body around the center of
    /// mass.
    pub fn torque(&self) -> &Torque {
        &self.torque
    }

    /// Returns the contact response parameters of the body.
    pub fn response_params(&self) -> &ContactResponseParameters {
        &self.response_params
    }

    /// Sets the given position for the body.
    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    /// Sets the given orientation for the body.
    pub fn set_orientation(&mut self, orientation: Orientation) {
        self.orientation = orientation;
    }

    /// Sets the given linear velocity for the body. Does not affect the sleep
    /// state (the environment uses this to pin sleeping bodies at zero
    /// velocity).
    pub fn set_linear_velocity(&mut self, velocity: Velocity) {
        self.velocity = velocity;
    }

    /// Sets the given angular velocity for the body. Does not affect the
    /// sleep state.
    pub fn set_angular_velocity(&mut self, angular_velocity: AngularVelocity) {
        self.angular_velocity = angular_velocity;
    }

    /// Overwrites the force accumulator with the given force.
    pub fn set_force(&mut self, force: Force) {
        self.force = force;
    }

    /// Overwrites the torque accumulator with the given torque.
    pub fn set_torque(&mut self, torque: Torque) {
        self.torque = torque;
    }

    /// Applies the given force at the body's center of mass. Wakes the body.
    pub fn apply_force_at_center_of_mass(&mut self, force: &Force) {
        self.force += force;
        self.wake();
    }

    /// Applies the given torque around the body's center of mass. Wakes the
    /// body.
    pub fn apply_torque(&mut self, torque: &Torque) {
        self.torque += torque;
        self.wake();
    }

    /// Applies the given force at the given world space position. This may
    /// result in a torque around the center of mass. Wakes the body.
    pub fn apply_force(&mut self, force: &Force, force_position: &Position) {
        self.force += force;
        self.torque += (force_position - self.position).cross(force);
        self.wake();
    }

    /// Applies the given impulse at the given world space position, changing
    /// the body's linear and angular velocity. No-op for fixed bodies.
    pub fn apply_impulse_at(&mut self, impulse: &Impulse, position: &Position) {
        if self.fixed {
            return;
        }
        self.velocity += impulse * self.inverse_mass();
        self.angular_velocity += self.inv_inertia_world * (position - self.position).cross(impulse);
    }

    /// Accumulates the given velocity corrections in the body's solver work
    /// area. They take effect when [`Self::correct_velocity`] is called.
    pub fn add_velocity_correction(&mut self, linear: &Velocity, angular: &AngularVelocity) {
        self.solver_work_area.linear_correction += linear;
        self.solver_work_area.angular_correction += angular;
    }

    /// Resets the solver work area to zero.
    pub fn clear_solver_work_area(&mut self) {
        self.solver_work_area = SolverWorkArea::default();
    }

    /// Recomputes the world-space inverse inertia tensor from the body frame
    /// tensor and the current orientation.
    pub fn update_inv_inertia_world(&mut self) {
        if self.fixed {
            self.inv_inertia_world = Matrix3::zeros();
        } else {
            self.inv_inertia_world = self.inertia_tensor.inverse_rotated_matrix(&self.orientation);
        }
    }

    /// Integrates the accumulated force and torque into the body's linear and
    /// angular velocity over the given duration. No-op for fixed and sleeping
    /// bodies.
    pub fn update_velocity(&mut self, dt: fph) {
        if self.fixed || self.sleeping {
            return;
        }
        self.velocity += self.force * (self.inverse_mass() * dt);
        self.angular_velocity += self.inv_inertia_world * self.torque * dt;
    }

    /// Folds the accumulated solver velocity corrections into the body's
    /// velocities and resets the work area.
    pub fn correct_velocity(&mut self) {
        if self.fixed {
            return;
        }
        self.velocity += self.solver_work_area.linear_correction;
        self.angular_velocity += self.solver_work_area.angular_correction;
        self.solver_work_area = SolverWorkArea::default();
    }

    /// Updates the body's sleep state given that the given duration has
    /// passed: a dynamic body that has stayed sufficiently close to rest for
    /// long enough falls asleep, and any significant motion wakes it.
    pub fn update_sleep_status(&mut self, dt: fph) {
        if self.fixed {
            return;
        }
        let motion = self.velocity.norm_squared() + self.angular_velocity.norm_squared();
        if motion < SLEEP_MOTION_THRESHOLD {
            self.sleep_timer += dt;
            if self.sleep_timer >= SLEEP_ONSET_DELAY {
                self.sleeping = true;
            }
        } else {
            self.sleep_timer = 0.0;
            self.sleeping = false;
        }
    }

    /// Wakes the body and resets its sleep timer.
    pub fn wake(&mut self) {
        self.sleeping = false;
        self.sleep_timer = 0.0;
    }

    /// Integrates the body's velocities into its position and orientation
    /// over the given duration. No-op for fixed and sleeping bodies.
    pub fn update_position(&mut self, dt: fph) {
        if self.fixed || self.sleeping {
            return;
        }
        self.position = advance_position(&self.position, &self.velocity, dt);
        self.orientation = advance_orientation(&self.orientation, &self.angular_velocity, dt);
    }
}

/// Evolves the given [`Position`] with the given [`Velocity`] for the given
/// duration.
pub fn advance_position(position: &Position, velocity: &Velocity, duration: fph) -> Position {
    position + velocity * duration
}

/// Evolves the given [`Orientation`] with the given [`AngularVelocity`] for
/// the given duration.
pub fn advance_orientation(
    orientation: &Orientation,
    angular_velocity: &AngularVelocity,
    duration: fph,
) -> Orientation {
    let angular_speed = angular_velocity.norm();
    if angular_speed < 1e-15 {
        return *orientation;
    }
    let angle = angular_speed * duration;
    let (sin_half_angle, cos_half_angle) = (0.5 * angle).sin_cos();

    let rotation = Quaternion::from_parts(
        cos_half_angle,
        angular_velocity.scale(sin_half_angle / angular_speed),
    );

    UnitQuaternion::new_normalize(rotation * orientation.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{abs_diff_eq, assert_abs_diff_eq};
    use nalgebra::{Vector3, point, vector};
    use proptest::prelude::*;

    prop_compose! {
        fn position_strategy(max_position_coord: fph)(
            position_coord_x in -max_position_coord..max_position_coord,
            position_coord_y in -max_position_coord..max_position_coord,
            position_coord_z in -max_position_coord..max_position_coord,
        ) -> Position {
            point![position_coord_x, position_coord_y, position_coord_z]
        }
    }

    prop_compose! {
        fn force_strategy(max_force_coord: fph)(
            force_coord_x in -max_force_coord..max_force_coord,
            force_coord_y in -max_force_coord..max_force_coord,
            force_coord_z in -max_force_coord..max_force_coord,
        ) -> Force {
            vector![force_coord_x, force_coord_y, force_coord_z]
        }
    }

    fn dummy_dynamic_body() -> RigidBody {
        RigidBody::new_dynamic(
            CollisionShape::Sphere { radius: 1.0 },
            1.0,
            InertiaTensor::identity(),
            Position::origin(),
            Orientation::identity(),
            Velocity::zeros(),
            AngularVelocity::zeros(),
        )
    }

    fn dummy_fixed_body() -> RigidBody {
        RigidBody::new_fixed(
            CollisionShape::Sphere { radius: 1.0 },
            Position::origin(),
            Orientation::identity(),
        )
    }

    #[test]
    fn should_get_zero_force_and_torque_for_new_dynamic_body() {
        let body = dummy_dynamic_body();
        assert_abs_diff_eq!(body.force(), &Force::zeros());
        assert_abs_diff_eq!(body.torque(), &Torque::zeros());
    }

    proptest! {
        #[test]
        fn should_add_forces_applied_at_center_of_mass(
            force_1 in force_strategy(1e3),
            force_2 in force_strategy(1e3),
        ) {
            let mut body = dummy_dynamic_body();
            body.apply_force_at_center_of_mass(&force_1);
            body.apply_force_at_center_of_mass(&force_2);
            prop_assert!(abs_diff_eq!(body.force(), &(force_1 + force_2)));
        }
    }

    proptest! {
        #[test]
        fn should_get_torque_from_applying_force_outside_center_of_mass(
            force in force_strategy(1e3),
            force_position in position_strategy(1e3),
        ) {
            let mut body = dummy_dynamic_body();
            body.apply_force(&force, &force_position);
            prop_assert!(abs_diff_eq!(
                body.torque(),
                &((force_position - body.position()).cross(&force))
            ));
        }
    }

    #[test]
    fn should_mint_unique_ids_when_registering_bodies() {
        let mut registry = BodyRegistry::new();
        let id_1 = registry.register(dummy_dynamic_body());
        let id_2 = registry.register(dummy_dynamic_body());
        assert_ne!(id_1, id_2);
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(id_1));
        assert!(registry.contains(id_2));
    }

    #[test]
    fn should_return_none_when_unregistering_unknown_body() {
        let mut registry = BodyRegistry::new();
        let id = registry.register(dummy_dynamic_body());
        let unknown = registry.unregister(id).map(|body| {
            // Registering the returned body again gives it a fresh identity
            registry.register(body)
        });
        assert!(unknown.is_some());
        assert!(registry.unregister(id).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn should_restore_membership_when_reregistering_unregistered_body() {
        let mut registry = BodyRegistry::new();
        let id = registry.register(dummy_dynamic_body());
        let body = registry.unregister(id).unwrap();
        assert!(registry.is_empty());
        let new_id = registry.register(body);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(new_id));
        assert!(!registry.contains(id));
    }

    #[test]
    fn should_keep_id_lookup_consistent_after_swap_removal() {
        let mut registry = BodyRegistry::new();
        let id_1 = registry.register(dummy_dynamic_body());
        let id_2 = registry.register(dummy_fixed_body());
        let id_3 = registry.register(dummy_dynamic_body());

        assert!(registry.unregister(id_1).is_some());

        assert!(registry.get_body(id_2).unwrap().is_fixed());
        assert!(!registry.get_body(id_3).unwrap().is_fixed());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn should_get_disjoint_mutable_body_pair() {
        let mut registry = BodyRegistry::new();
        let id_1 = registry.register(dummy_dynamic_body());
        let id_2 = registry.register(dummy_fixed_body());

        let [body_1, body_2] = registry.get_body_pair_mut(id_1, id_2).unwrap();
        assert!(!body_1.is_fixed());
        assert!(body_2.is_fixed());
    }

    #[test]
    fn should_fall_asleep_after_resting_long_enough() {
        let mut body = dummy_dynamic_body();
        for _ in 0..60 {
            body.update_sleep_status(0.01);
        }
        assert!(body.sleeping());
    }

    #[test]
    fn should_stay_awake_while_moving() {
        let mut body = dummy_dynamic_body().with_velocity(vector![1.0, 0.0, 0.0]);
        for _ in 0..60 {
            body.update_sleep_status(0.01);
        }
        assert!(!body.sleeping());
    }

    #[test]
    fn should_reset_sleep_timer_when_motion_resumes() {
        let mut body = dummy_dynamic_body();
        for _ in 0..40 {
            body.update_sleep_status(0.01);
        }
        body.set_linear_velocity(vector![1.0, 0.0, 0.0]);
        body.update_sleep_status(0.01);
        assert!(!body.sleeping());

        body.set_linear_velocity(Velocity::zeros());
        for _ in 0..40 {
            body.update_sleep_status(0.01);
        }
        assert!(!body.sleeping());
    }

    #[test]
    fn should_not_integrate_fixed_body() {
        let mut body = dummy_fixed_body();
        body.set_force(vector![10.0, 0.0, 0.0]);
        body.update_velocity(1.0);
        body.update_position(1.0);
        assert_abs_diff_eq!(body.velocity(), &Velocity::zeros());
        assert_abs_diff_eq!(body.position(), &Position::origin());
    }

    #[test]
    fn should_advance_position_linearly() {
        let mut body = dummy_dynamic_body().with_velocity(vector![1.0, -2.0, 0.5]);
        body.update_position(2.0);
        assert_abs_diff_eq!(body.position(), &point![2.0, -4.0, 1.0]);
    }

    #[test]
    fn should_rotate_orientation_about_angular_velocity_axis() {
        let orientation = Orientation::identity();
        let angular_velocity = Vector3::z_axis().scale(std::f64::consts::FRAC_PI_2);
        let advanced = advance_orientation(&orientation, &angular_velocity, 1.0);
        let expected = Orientation::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2);
        assert_abs_diff_eq!(advanced, expected, epsilon = 1e-12);
    }
}
