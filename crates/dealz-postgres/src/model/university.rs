//! University model for PostgreSQL database operations.

use diesel::prelude::*;
use jiff_diesel::Timestamp;
use uuid::Uuid;

use crate::schema::universities;

/// A registered institution, keyed by its email domain.
///
/// The domain gates both self-registration and federated provisioning;
/// lookups always use the lowercased domain.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = universities)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct University {
    /// Unique university identifier.
    pub id: Uuid,
    /// Display name of the institution.
    pub name: String,
    /// Unique email domain (e.g. `example.edu`), lowercased.
    pub domain: String,
    /// Human-readable campus location.
    pub location: String,
    /// Timestamp when the record was created.
    pub created_at: Timestamp,
    /// Timestamp when the record was last updated.
    pub updated_at: Timestamp,
}

/// Data for registering a new university.
#[derive(Debug, Default, Clone, Insertable)]
#[diesel(table_name = universities)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewUniversity {
    /// Display name of the institution.
    pub name: String,
    /// Unique email domain, lowercased before insertion.
    pub domain: String,
    /// Human-readable campus location.
    pub location: String,
}
