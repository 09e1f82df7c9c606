//! `entitle-core`: shared domain building blocks.
//!
//! Identifiers, the domain error model and the entity/value-object markers.
//! This crate has no infrastructure concerns.

pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{BranchId, BudgetId, CompanyId, LicenseId, UserId};
pub use value_object::ValueObject;
