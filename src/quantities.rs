//! Physical quantities.

use crate::fph;
use nalgebra::{Point3, UnitQuaternion, UnitVector3, Vector3};

/// A unit vector in 3D space.
pub type Direction = UnitVector3<fph>;

/// A position in 3D space.
pub type Position = Point3<fph>;

/// An orientation in 3D space.
pub type Orientation = UnitQuaternion<fph>;

/// A velocity in 3D space.
pub type Velocity = Vector3<fph>;

/// An angular velocity in 3D space, represented as a rotation vector (the
/// direction is the axis of rotation and the magnitude is the angular speed
/// in radians per unit time).
pub type AngularVelocity = Vector3<fph>;

/// A 3D force.
pub type Force = Vector3<fph>;

/// A 3D torque.
pub type Torque = Vector3<fph>;

/// A 3D impulse (momentum change).
pub type Impulse = Vector3<fph>;
