//! Impulse-based contact resolution.

use crate::{
    collision::Contact,
    fph,
    quantities::{Position, Velocity},
    rigid_body::RigidBody,
};
use nalgebra::Vector3;

/// Resolves contacts by applying instantaneous velocity changes (impulses) to
/// the involved bodies.
#[derive(Clone, Debug)]
pub struct ImpulseSolver {
    config: ImpulseSolverConfig,
}

/// Configuration parameters for the [`ImpulseSolver`].
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[derive(Clone, Debug)]
pub struct ImpulseSolverConfig {
    /// Closing speeds below this threshold are resolved without restitution,
    /// so that resting contacts do not jitter.
    pub restitution_velocity_threshold: fph,
    /// The fraction of the current penetration depth the solver tries to
    /// correct per substep through bias velocities.
    pub positional_correction_factor: fph,
    /// Penetration depth tolerated without positional correction.
    pub penetration_slop: fph,
}

impl Default for ImpulseSolverConfig {
    fn default() -> Self {
        Self {
            restitution_velocity_threshold: 0.5,
            positional_correction_factor: 0.2,
            penetration_slop: 0.01,
        }
    }
}

impl ImpulseSolver {
    /// Creates a new solver with the given configuration parameters.
    pub fn new(config: ImpulseSolverConfig) -> Self {
        Self { config }
    }

    /// Returns the solver's configuration parameters.
    pub fn config(&self) -> &ImpulseSolverConfig {
        &self.config
    }

    /// Resolves the given contact over the given substep duration, mutating
    /// the velocity state of the two involved bodies in place.
    ///
    /// Applies a restitution-scaled impulse along the contact normal, a
    /// Coulomb friction impulse along the sliding direction, and accumulates
    /// a penetration-correcting bias velocity in the bodies' solver work
    /// areas for the subsequent velocity-correction pass.
    pub fn apply_impulse(&self, contact: &Contact, [body_a, body_b]: [&mut RigidBody; 2], dt: fph) {
        let normal = contact.geometry.surface_normal.into_inner();
        let position = contact.geometry.position;

        let effective_mass_normal = effective_mass(body_a, body_b, &position, &normal);
        if effective_mass_normal <= 0.0 {
            return;
        }

        let closing_speed = -relative_velocity_at(body_a, body_b, &position).dot(&normal);

        if closing_speed > 0.0 {
            if closing_speed > self.config.restitution_velocity_threshold {
                body_a.wake();
                body_b.wake();
            }

            let restitution = if closing_speed > self.config.restitution_velocity_threshold {
                contact.response_params.restitution_coef
            } else {
                0.0
            };

            let normal_impulse = (1.0 + restitution) * closing_speed / effective_mass_normal;

            body_a.apply_impulse_at(&(normal * normal_impulse), &position);
            body_b.apply_impulse_at(&(-normal * normal_impulse), &position);

            self.apply_friction_impulse(contact, body_a, body_b, &position, normal_impulse);
        }

        self.accumulate_positional_correction(
            contact,
            body_a,
            body_b,
            &position,
            effective_mass_normal,
            dt,
        );
    }

    fn apply_friction_impulse(
        &self,
        contact: &Contact,
        body_a: &mut RigidBody,
        body_b: &mut RigidBody,
        position: &Position,
        normal_impulse: fph,
    ) {
        let normal = contact.geometry.surface_normal.into_inner();

        let relative_velocity = relative_velocity_at(body_a, body_b, position);
        let tangential_velocity = relative_velocity - relative_velocity.dot(&normal) * normal;
        let sliding_speed = tangential_velocity.norm();
        if sliding_speed < 1e-9 {
            return;
        }
        let tangent = tangential_velocity / sliding_speed;

        let effective_mass_tangent = effective_mass(body_a, body_b, position, &tangent);
        if effective_mass_tangent <= 0.0 {
            return;
        }

        // The impulse that would bring the sliding to a halt; static friction
        // may hold it, otherwise dynamic friction applies
        let stopping_impulse = sliding_speed / effective_mass_tangent;
        let max_static_impulse = contact.response_params.static_friction_coef * normal_impulse;

        let friction_impulse = if stopping_impulse <= max_static_impulse {
            stopping_impulse
        } else {
            contact.response_params.dynamic_friction_coef * normal_impulse
        };

        body_a.apply_impulse_at(&(-tangent * friction_impulse), position);
        body_b.apply_impulse_at(&(tangent * friction_impulse), position);
    }

    fn accumulate_positional_correction(
        &self,
        contact: &Contact,
        body_a: &mut RigidBody,
        body_b: &mut RigidBody,
        position: &Position,
        effective_mass_normal: fph,
        dt: fph,
    ) {
        let penetration = fph::max(
            0.0,
            contact.geometry.penetration_depth - self.config.penetration_slop,
        );
        // A zero-duration substep cannot correct any penetration
        if penetration <= 0.0 || dt <= 0.0 {
            return;
        }

        let normal = contact.geometry.surface_normal.into_inner();
        let bias_speed = self.config.positional_correction_factor * penetration / dt;
        let bias_impulse = bias_speed / effective_mass_normal;

        for (body, sign) in [(body_a, 1.0), (body_b, -1.0)] {
            if body.is_fixed() {
                continue;
            }
            let impulse = normal * (sign * bias_impulse);
            let linear = impulse * body.inverse_mass();
            let angular = body.inv_inertia_world() * (position - body.position()).cross(&impulse);
            body.add_velocity_correction(&linear, &angular);
        }
    }
}

/// Computes the relative velocity of the contact point as seen from body A
/// relative to body B.
fn relative_velocity_at(body_a: &RigidBody, body_b: &RigidBody, position: &Position) -> Velocity {
    let point_velocity_a =
        body_a.velocity() + body_a.angular_velocity().cross(&(position - body_a.position()));
    let point_velocity_b =
        body_b.velocity() + body_b.angular_velocity().cross(&(position - body_b.position()));
    point_velocity_a - point_velocity_b
}

/// Computes the effective mass denominator for an impulse applied at the
/// given world space position along the given direction. Zero when both
/// bodies are fixed.
fn effective_mass(
    body_a: &RigidBody,
    body_b: &RigidBody,
    position: &Position,
    direction: &Vector3<fph>,
) -> fph {
    let r_a = position - body_a.position();
    let r_b = position - body_b.position();

    let angular_term_a = (body_a.inv_inertia_world() * r_a.cross(direction)).cross(&r_a);
    let angular_term_b = (body_b.inv_inertia_world() * r_b.cross(direction)).cross(&r_b);

    body_a.inverse_mass() + body_b.inverse_mass() + direction.dot(&(angular_term_a + angular_term_b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        collision::{CollisionShape, detect_collision},
        material::ContactResponseParameters,
        quantities::{Orientation, Position},
        rigid_body::{BodyRegistry, RigidBodyID},
    };
    use approx::assert_abs_diff_eq;
    use nalgebra::{point, vector};

    const DT: fph = 0.01;

    fn sphere(radius: fph, position: Position, velocity: Velocity) -> RigidBody {
        RigidBody::uniform_sphere(radius, 1.0, position).with_velocity(velocity)
    }

    fn detect(registry: &BodyRegistry, id_a: RigidBodyID, id_b: RigidBodyID) -> Contact {
        detect_collision(
            id_a,
            registry.get_body(id_a).unwrap(),
            id_b,
            registry.get_body(id_b).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn should_exchange_velocities_in_elastic_head_on_collision() {
        let mut registry = BodyRegistry::new();
        let params = ContactResponseParameters::new(1.0, 0.0, 0.0);
        let id_a = registry.register(
            sphere(0.5, point![1.0, 0.0, 0.0], vector![-1.0, 0.0, 0.0]).with_response_params(params),
        );
        let id_b = registry.register(
            sphere(0.5, point![0.0, 0.0, 0.0], vector![1.0, 0.0, 0.0]).with_response_params(params),
        );

        let contact = detect(&registry, id_a, id_b);
        let solver = ImpulseSolver::new(ImpulseSolverConfig::default());
        solver.apply_impulse(&contact, registry.get_body_pair_mut(id_a, id_b).unwrap(), DT);

        let velocity_a = *registry.get_body(id_a).unwrap().velocity();
        let velocity_b = *registry.get_body(id_b).unwrap().velocity();
        assert_abs_diff_eq!(velocity_a, vector![1.0, 0.0, 0.0], epsilon = 1e-12);
        assert_abs_diff_eq!(velocity_b, vector![-1.0, 0.0, 0.0], epsilon = 1e-12);
    }

    #[test]
    fn should_stop_bodies_in_inelastic_head_on_collision() {
        let mut registry = BodyRegistry::new();
        let id_a = registry.register(sphere(0.5, point![1.0, 0.0, 0.0], vector![-2.0, 0.0, 0.0]));
        let id_b = registry.register(sphere(0.5, point![0.0, 0.0, 0.0], vector![2.0, 0.0, 0.0]));

        let contact = detect(&registry, id_a, id_b);
        let solver = ImpulseSolver::new(ImpulseSolverConfig::default());
        solver.apply_impulse(&contact, registry.get_body_pair_mut(id_a, id_b).unwrap(), DT);

        assert_abs_diff_eq!(
            *registry.get_body(id_a).unwrap().velocity(),
            Velocity::zeros(),
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            *registry.get_body(id_b).unwrap().velocity(),
            Velocity::zeros(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn should_reflect_sphere_off_fixed_plane() {
        let mut registry = BodyRegistry::new();
        let params = ContactResponseParameters::new(1.0, 0.0, 0.0);
        let sphere_id = registry.register(
            sphere(1.0, point![0.0, 0.9, 0.0], vector![0.0, -3.0, 0.0]).with_response_params(params),
        );
        let plane_id = registry.register(RigidBody::new_fixed(
            CollisionShape::Plane,
            Position::origin(),
            Orientation::identity(),
        ));

        let contact = detect(&registry, sphere_id, plane_id);
        let solver = ImpulseSolver::new(ImpulseSolverConfig::default());
        solver.apply_impulse(
            &contact,
            registry.get_body_pair_mut(sphere_id, plane_id).unwrap(),
            DT,
        );

        assert_abs_diff_eq!(
            *registry.get_body(sphere_id).unwrap().velocity(),
            vector![0.0, 3.0, 0.0],
            epsilon = 1e-12
        );
        // The plane does not move
        assert_abs_diff_eq!(
            *registry.get_body(plane_id).unwrap().velocity(),
            Velocity::zeros()
        );
    }

    #[test]
    fn should_not_apply_impulse_to_separating_bodies() {
        let mut registry = BodyRegistry::new();
        let id_a = registry.register(sphere(0.5, point![0.95, 0.0, 0.0], vector![1.0, 0.0, 0.0]));
        let id_b = registry.register(sphere(0.5, point![0.0, 0.0, 0.0], Velocity::zeros()));

        let contact = detect(&registry, id_a, id_b);
        let solver = ImpulseSolver::new(ImpulseSolverConfig::default());
        solver.apply_impulse(&contact, registry.get_body_pair_mut(id_a, id_b).unwrap(), DT);

        assert_abs_diff_eq!(
            *registry.get_body(id_a).unwrap().velocity(),
            vector![1.0, 0.0, 0.0]
        );
        assert_abs_diff_eq!(
            *registry.get_body(id_b).unwrap().velocity(),
            Velocity::zeros()
        );
    }

    #[test]
    fn should_accumulate_positional_correction_for_deep_penetration() {
        let mut registry = BodyRegistry::new();
        let sphere_id =
            registry.register(sphere(1.0, point![0.0, 0.5, 0.0], Velocity::zeros()));
        let plane_id = registry.register(RigidBody::new_fixed(
            CollisionShape::Plane,
            Position::origin(),
            Orientation::identity(),
        ));

        let contact = detect(&registry, sphere_id, plane_id);
        let solver = ImpulseSolver::new(ImpulseSolverConfig::default());
        solver.apply_impulse(
            &contact,
            registry.get_body_pair_mut(sphere_id, plane_id).unwrap(),
            DT,
        );

        // The correction only takes effect through the correction pass
        assert_abs_diff_eq!(
            *registry.get_body(sphere_id).unwrap().velocity(),
            Velocity::zeros()
        );

        registry.get_body_mut(sphere_id).unwrap().correct_velocity();
        assert!(registry.get_body(sphere_id).unwrap().velocity().y > 0.0);
    }

    #[test]
    fn should_not_accumulate_positional_correction_for_zero_duration_substep() {
        let mut registry = BodyRegistry::new();
        let sphere_id = registry.register(sphere(1.0, point![0.0, 0.5, 0.0], Velocity::zeros()));
        let plane_id = registry.register(RigidBody::new_fixed(
            CollisionShape::Plane,
            Position::origin(),
            Orientation::identity(),
        ));

        let contact = detect(&registry, sphere_id, plane_id);
        let solver = ImpulseSolver::new(ImpulseSolverConfig::default());
        solver.apply_impulse(
            &contact,
            registry.get_body_pair_mut(sphere_id, plane_id).unwrap(),
            0.0,
        );

        registry.get_body_mut(sphere_id).unwrap().correct_velocity();
        let velocity = registry.get_body(sphere_id).unwrap().velocity();
        assert!(velocity.iter().all(|component| component.is_finite()));
        assert_abs_diff_eq!(*velocity, Velocity::zeros());
    }

    #[test]
    fn should_wake_sleeping_body_on_significant_impact() {
        let mut registry = BodyRegistry::new();
        let sleeping_id = registry.register(sphere(0.5, point![0.0, 0.0, 0.0], Velocity::zeros()));
        let moving_id = registry.register(sphere(0.5, point![0.95, 0.0, 0.0], vector![-2.0, 0.0, 0.0]));

        {
            let body = registry.get_body_mut(sleeping_id).unwrap();
            for _ in 0..60 {
                body.update_sleep_status(0.01);
            }
            assert!(body.sleeping());
        }

        let contact = detect(&registry, moving_id, sleeping_id);
        let solver = ImpulseSolver::new(ImpulseSolverConfig::default());
        solver.apply_impulse(
            &contact,
            registry.get_body_pair_mut(moving_id, sleeping_id).unwrap(),
            DT,
        );

        assert!(!registry.get_body(sleeping_id).unwrap().sleeping());
    }
}
