//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity; two instances with the same attributes are
/// the same value. Usage snapshots and license limits are modelled this way:
/// a new snapshot replaces the old one wholesale rather than being mutated
/// field by field.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
