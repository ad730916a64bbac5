//! University repository for the institution registry.

use std::future::Future;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::model::{NewUniversity, University};
use crate::{PgConnection, PgError, PgResult, schema};

/// Repository for the institution registry.
///
/// The registry is read-mostly: it gates registration and federated
/// provisioning by email domain and is administered out of band.
pub trait UniversityRepository {
    /// Registers a new university.
    fn create_university(
        &mut self,
        new_university: NewUniversity,
    ) -> impl Future<Output = PgResult<University>> + Send;

    /// Finds a university by its ID.
    fn find_university_by_id(
        &mut self,
        university_id: Uuid,
    ) -> impl Future<Output = PgResult<Option<University>>> + Send;

    /// Finds a university by its (lowercased) email domain.
    fn find_university_by_domain(
        &mut self,
        domain: &str,
    ) -> impl Future<Output = PgResult<Option<University>>> + Send;

    /// Returns whether a university is registered for the given domain.
    fn domain_exists(&mut self, domain: &str) -> impl Future<Output = PgResult<bool>> + Send;

    /// Lists all registered universities ordered by name.
    fn list_universities(&mut self) -> impl Future<Output = PgResult<Vec<University>>> + Send;
}

impl UniversityRepository for PgConnection {
    async fn create_university(&mut self, new_university: NewUniversity) -> PgResult<University> {
        use schema::universities;

        diesel::insert_into(universities::table)
            .values(&new_university)
            .returning(University::as_returning())
            .get_result(self)
            .await
            .map_err(PgError::from)
    }

    async fn find_university_by_id(
        &mut self,
        university_id: Uuid,
    ) -> PgResult<Option<University>> {
        use schema::universities::{self, dsl};

        universities::table
            .filter(dsl::id.eq(university_id))
            .select(University::as_select())
            .first(self)
            .await
            .optional()
            .map_err(PgError::from)
    }

    async fn find_university_by_domain(&mut self, domain: &str) -> PgResult<Option<University>> {
        use schema::universities::{self, dsl};

        universities::table
            .filter(dsl::domain.eq(domain))
            .select(University::as_select())
            .first(self)
            .await
            .optional()
            .map_err(PgError::from)
    }

    async fn domain_exists(&mut self, domain: &str) -> PgResult<bool> {
        use diesel::dsl::{exists, select};
        use schema::universities::{self, dsl};

        select(exists(
            universities::table.filter(dsl::domain.eq(domain)),
        ))
        .get_result(self)
        .await
        .map_err(PgError::from)
    }

    async fn list_universities(&mut self) -> PgResult<Vec<University>> {
        use schema::universities::{self, dsl};

        universities::table
            .order(dsl::name.asc())
            .select(University::as_select())
            .load(self)
            .await
            .map_err(PgError::from)
    }
}
