//! Narrow-phase collision detection and the per-step contact buffer.

use crate::{
    fph,
    material::ContactResponseParameters,
    quantities::{Direction, Position},
    rigid_body::{RigidBody, RigidBodyID},
};
use nalgebra::{UnitVector3, Vector3};

/// The collision geometry of a rigid body, defined in the body frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CollisionShape {
    /// A sphere centered on the body origin.
    Sphere { radius: fph },
    /// A half-space bounded by the plane through the body origin, with the
    /// body-frame +Y axis as outward normal.
    Plane,
}

/// A point of contact between two bodies.
///
/// Contacts are plain values regenerated by the detection pass. They have no
/// identity beyond the update call that produced them.
#[derive(Clone, Debug)]
pub struct Contact {
    /// The body whose surface the contact normal points towards.
    pub body_a: RigidBodyID,
    /// The body on whose surface the contact point lies.
    pub body_b: RigidBodyID,
    /// The geometrical information about the contact.
    pub geometry: ContactGeometry,
    /// The combined response parameters for the contact.
    pub response_params: ContactResponseParameters,
}

/// Geometrical information about a point of contact between two bodies A
/// and B.
#[derive(Clone, Debug)]
pub struct ContactGeometry {
    /// The world space contact position, on the surface of body B.
    pub position: Position,
    /// The world space surface normal of body B at [`Self::position`],
    /// pointing towards body A.
    pub surface_normal: Direction,
    /// The overlap between the two bodies along [`Self::surface_normal`].
    /// Non-negative when the bodies are in contact.
    pub penetration_depth: fph,
}

/// Squared distance between two contact positions below which the contacts
/// are considered to represent the same physical contact patch. Note that
/// this constant is a squared distance, so positions up to ~0.141 length
/// units apart are merged.
pub const CONTACT_MERGE_DISTANCE_SQUARED: fph = 0.02;

/// The collection of contacts detected during an update call.
///
/// Adding a contact whose position lies within the merge distance of any
/// already buffered contact discards the new contact, regardless of which
/// body pair produced either contact. The buffer is cleared once per update
/// call, not per substep, so contacts accumulate across the substeps of one
/// update.
#[derive(Clone, Debug)]
pub struct ContactBuffer {
    contacts: Vec<Contact>,
}

impl ContactBuffer {
    /// Creates an empty buffer with storage pre-sized for the given number of
    /// contacts.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            contacts: Vec::with_capacity(capacity),
        }
    }

    /// The number of buffered contacts.
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    /// Whether no contacts are buffered.
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Returns the slice of all buffered contacts, in insertion order.
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    /// Appends the given contact unless a near-coincident contact is already
    /// buffered, in which case the new contact is dropped (first match wins,
    /// attributes are never averaged).
    ///
    /// # Returns
    /// Whether the contact was appended.
    pub fn add_contact(&mut self, contact: Contact) -> bool {
        let duplicate = self.contacts.iter().any(|existing| {
            (existing.geometry.position - contact.geometry.position).norm_squared()
                <= CONTACT_MERGE_DISTANCE_SQUARED
        });
        if duplicate {
            return false;
        }
        self.contacts.push(contact);
        true
    }

    /// Removes all buffered contacts.
    pub fn clear(&mut self) {
        self.contacts.clear();
    }
}

/// Performs the narrow-phase collision test for the given pair of bodies.
///
/// # Returns
/// At most one [`Contact`] per pair per call. The A/B roles in the returned
/// contact are canonical for the shape combination (the sphere takes the A
/// role against a plane) and need not match the argument order.
pub fn detect_collision(
    id_a: RigidBodyID,
    body_a: &RigidBody,
    id_b: RigidBodyID,
    body_b: &RigidBody,
) -> Option<Contact> {
    use CollisionShape::{Plane, Sphere};

    match (body_a.shape(), body_b.shape()) {
        (&Sphere { radius: radius_a }, &Sphere { radius: radius_b }) => {
            let geometry = determine_sphere_sphere_contact_geometry(
                body_a.position(),
                radius_a,
                body_b.position(),
                radius_b,
            )?;
            Some(Contact {
                body_a: id_a,
                body_b: id_b,
                geometry,
                response_params: body_a.response_params().combined(body_b.response_params()),
            })
        }
        (&Sphere { radius }, Plane) => {
            let geometry = determine_sphere_plane_contact_geometry(
                body_a.position(),
                radius,
                body_b.position(),
                &plane_unit_normal(body_b),
            )?;
            Some(Contact {
                body_a: id_a,
                body_b: id_b,
                geometry,
                response_params: body_a.response_params().combined(body_b.response_params()),
            })
        }
        (Plane, &Sphere { radius }) => {
            let geometry = determine_sphere_plane_contact_geometry(
                body_b.position(),
                radius,
                body_a.position(),
                &plane_unit_normal(body_a),
            )?;
            Some(Contact {
                body_a: id_b,
                body_b: id_a,
                geometry,
                response_params: body_b.response_params().combined(body_a.response_params()),
            })
        }
        (Plane, Plane) => None,
    }
}

fn plane_unit_normal(body: &RigidBody) -> Direction {
    UnitVector3::new_unchecked(body.orientation().transform_vector(&Vector3::y_axis()))
}

fn determine_sphere_sphere_contact_geometry(
    center_a: &Position,
    radius_a: fph,
    center_b: &Position,
    radius_b: fph,
) -> Option<ContactGeometry> {
    let center_displacement = center_a - center_b;
    let squared_center_distance = center_displacement.norm_squared();
    let max_center_distance = radius_a + radius_b;

    if squared_center_distance > max_center_distance.powi(2) {
        return None;
    }

    let center_distance = squared_center_distance.sqrt();

    let surface_normal = if center_distance > 1e-8 {
        UnitVector3::new_unchecked(center_displacement / center_distance)
    } else {
        // Coincident centers give no meaningful direction
        Vector3::z_axis()
    };

    let position = center_b + surface_normal.scale(radius_b);

    let penetration_depth = fph::max(0.0, max_center_distance - center_distance);

    Some(ContactGeometry {
        position,
        surface_normal,
        penetration_depth,
    })
}

fn determine_sphere_plane_contact_geometry(
    sphere_center: &Position,
    sphere_radius: fph,
    plane_origin: &Position,
    plane_normal: &Direction,
) -> Option<ContactGeometry> {
    let signed_distance = plane_normal.dot(&(sphere_center - plane_origin));
    let penetration_depth = sphere_radius - signed_distance;

    if penetration_depth < 0.0 {
        return None;
    }

    let position = sphere_center - plane_normal.scale(signed_distance);

    Some(ContactGeometry {
        position,
        surface_normal: *plane_normal,
        penetration_depth,
    })
}
