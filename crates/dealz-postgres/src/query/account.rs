//! Account repository for the account directory.

use std::future::Future;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::model::{Account, NewAccount};
use crate::types::OffsetPagination;
use crate::{PgConnection, PgError, PgResult, schema};

/// Repository for account directory operations.
///
/// Lookups are conventional keyed reads; the only write is account creation,
/// which assigns the default role atomically with the insert.
pub trait AccountRepository {
    /// Creates a new account.
    fn create_account(
        &mut self,
        new_account: NewAccount,
    ) -> impl Future<Output = PgResult<Account>> + Send;

    /// Finds an account by its ID.
    fn find_account_by_id(
        &mut self,
        account_id: Uuid,
    ) -> impl Future<Output = PgResult<Option<Account>>> + Send;

    /// Finds an account by its (lowercased) email address.
    fn find_account_by_email(
        &mut self,
        email_address: &str,
    ) -> impl Future<Output = PgResult<Option<Account>>> + Send;

    /// Returns whether an account exists for the given email address.
    fn email_exists(
        &mut self,
        email_address: &str,
    ) -> impl Future<Output = PgResult<bool>> + Send;

    /// Lists accounts ordered by creation time, newest first.
    fn list_accounts(
        &mut self,
        pagination: OffsetPagination,
    ) -> impl Future<Output = PgResult<Vec<Account>>> + Send;
}

impl AccountRepository for PgConnection {
    async fn create_account(&mut self, new_account: NewAccount) -> PgResult<Account> {
        use schema::accounts;

        diesel::insert_into(accounts::table)
            .values(&new_account)
            .returning(Account::as_returning())
            .get_result(self)
            .await
            .map_err(PgError::from)
    }

    async fn find_account_by_id(&mut self, account_id: Uuid) -> PgResult<Option<Account>> {
        use schema::accounts::{self, dsl};

        accounts::table
            .filter(dsl::id.eq(account_id))
            .select(Account::as_select())
            .first(self)
            .await
            .optional()
            .map_err(PgError::from)
    }

    async fn find_account_by_email(&mut self, email_address: &str) -> PgResult<Option<Account>> {
        use schema::accounts::{self, dsl};

        accounts::table
            .filter(dsl::email_address.eq(email_address))
            .select(Account::as_select())
            .first(self)
            .await
            .optional()
            .map_err(PgError::from)
    }

    async fn email_exists(&mut self, email_address: &str) -> PgResult<bool> {
        use diesel::dsl::{exists, select};
        use schema::accounts::{self, dsl};

        select(exists(
            accounts::table.filter(dsl::email_address.eq(email_address)),
        ))
        .get_result(self)
        .await
        .map_err(PgError::from)
    }

    async fn list_accounts(&mut self, pagination: OffsetPagination) -> PgResult<Vec<Account>> {
        use schema::accounts::{self, dsl};

        accounts::table
            .order(dsl::created_at.desc())
            .limit(pagination.limit)
            .offset(pagination.offset)
            .select(Account::as_select())
            .load(self)
            .await
            .map_err(PgError::from)
    }
}
