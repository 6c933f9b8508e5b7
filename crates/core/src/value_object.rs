//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects carry no identity and are immutable: `Money` and
/// `CourseProgress` are compared field by field, and "changing" one means
/// building a new value.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
