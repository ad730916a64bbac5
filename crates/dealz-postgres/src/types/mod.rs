//! Shared database types used across models and repositories.

mod constraint;
mod pagination;
mod provider;

pub mod constants;

pub use self::constraint::ConstraintViolation;
pub use self::pagination::OffsetPagination;
pub use self::provider::AccountProvider;
