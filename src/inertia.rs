//! Inertia tensors for rigid bodies.

use crate::{fph, quantities::Orientation};
use approx::AbsDiffEq;
use nalgebra::Matrix3;
use std::f64::consts::PI;

/// The inertia tensor of a body, defined in the body frame relative to the
/// center of mass. The inverse is precomputed, since the simulation mostly
/// needs the inverse tensor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InertiaTensor {
    matrix: Matrix3<fph>,
    inverse_matrix: Matrix3<fph>,
}

impl InertiaTensor {
    /// Creates the inertia tensor with the given matrix.
    ///
    /// # Panics
    /// If the given matrix is not invertible.
    pub fn from_matrix(matrix: Matrix3<fph>) -> Self {
        let inverse_matrix = matrix
            .try_inverse()
            .expect("Could not invert inertia tensor matrix");
        Self {
            matrix,
            inverse_matrix,
        }
    }

    /// Creates the inertia tensor with the given diagonal elements (all other
    /// elements are zero).
    ///
    /// # Panics
    /// If any of the given elements is zero.
    pub fn from_diagonal_elements(j_xx: fph, j_yy: fph, j_zz: fph) -> Self {
        Self::from_matrix(Matrix3::from_diagonal(&nalgebra::vector![j_xx, j_yy, j_zz]))
    }

    /// Creates the inertia tensor of a uniformly dense sphere with the given
    /// mass and radius.
    pub fn of_uniform_sphere(mass: fph, radius: fph) -> Self {
        let moment = 0.4 * mass * radius.powi(2);
        Self::from_diagonal_elements(moment, moment, moment)
    }

    /// Creates the inertia tensor of a uniformly dense axis-aligned box with
    /// the given mass and full extents.
    pub fn of_uniform_box(mass: fph, extent_x: fph, extent_y: fph, extent_z: fph) -> Self {
        let j_xx = (mass / 12.0) * (extent_y.powi(2) + extent_z.powi(2));
        let j_yy = (mass / 12.0) * (extent_x.powi(2) + extent_z.powi(2));
        let j_zz = (mass / 12.0) * (extent_x.powi(2) + extent_y.powi(2));
        Self::from_diagonal_elements(j_xx, j_yy, j_zz)
    }

    /// Creates the identity inertia tensor.
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
            inverse_matrix: Matrix3::identity(),
        }
    }

    /// Returns the inertia tensor matrix in the body frame.
    pub fn matrix(&self) -> &Matrix3<fph> {
        &self.matrix
    }

    /// Returns the inverse of the inertia tensor matrix in the body frame.
    pub fn inverse_matrix(&self) -> &Matrix3<fph> {
        &self.inverse_matrix
    }

    /// Computes the inverse of the inertia tensor matrix in the world frame,
    /// given the orientation of the body.
    pub fn inverse_rotated_matrix(&self, orientation: &Orientation) -> Matrix3<fph> {
        let rotation = orientation.to_rotation_matrix().into_inner();
        rotation * self.inverse_matrix * rotation.transpose()
    }
}

/// Computes the mass of a uniformly dense sphere with the given radius and
/// mass density.
pub fn compute_uniform_sphere_mass(radius: fph, mass_density: fph) -> fph {
    (4.0 / 3.0) * PI * radius.powi(3) * mass_density
}

impl AbsDiffEq for InertiaTensor {
    type Epsilon = <fph as AbsDiffEq>::Epsilon;

    fn default_epsilon() -> Self::Epsilon {
        fph::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        Matrix3::abs_diff_eq(&self.matrix, &other.matrix, epsilon)
            && Matrix3::abs_diff_eq(&self.inverse_matrix, &other.inverse_matrix, epsilon)
    }
}
