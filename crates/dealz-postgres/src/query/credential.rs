//! Credential ledger repository.
//!
//! The ledger is the only table in this subsystem requiring transactional
//! discipline: issuing a new pair must revoke every prior pair for the same
//! account before, or atomically with, recording the replacement. Both write
//! paths here run revoke+record inside a single transaction, which keeps the
//! single-active-pair invariant even under concurrent logins and refreshes.

use std::future::Future;

use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use crate::model::{CredentialPair, NewCredentialPair};
use crate::{PgConnection, PgError, PgResult, TRACING_TARGET_QUERY, schema};

/// Repository for the credential ledger.
pub trait CredentialRepository {
    /// Records a credential pair without touching prior pairs.
    ///
    /// Used for first issuance (registration and first federated
    /// provisioning), where no prior pairs can exist.
    fn create_credential_pair(
        &mut self,
        new_pair: NewCredentialPair,
    ) -> impl Future<Output = PgResult<CredentialPair>> + Send;

    /// Revokes every active pair for the account, then records the new pair,
    /// in one transaction.
    ///
    /// This is the login path: superseding all prior sessions is the
    /// logout-everywhere-on-new-session policy.
    fn issue_credential_pair(
        &mut self,
        new_pair: NewCredentialPair,
    ) -> impl Future<Output = PgResult<CredentialPair>> + Send;

    /// Rotates credentials against a presented refresh token.
    ///
    /// In one transaction: locks the ledger row for the presented token,
    /// fails with [`PgError::StaleCredential`] if it is unknown or already
    /// revoked, revokes every active pair for the owning account, and records
    /// the replacement. Of any set of concurrent rotations presenting the
    /// same token, exactly one succeeds.
    fn rotate_credential_pair(
        &mut self,
        presented_refresh_token: &str,
        new_pair: NewCredentialPair,
    ) -> impl Future<Output = PgResult<CredentialPair>> + Send;

    /// Sets the revoked flag on every active pair for the account.
    fn revoke_account_credentials(
        &mut self,
        account_id: Uuid,
    ) -> impl Future<Output = PgResult<i64>> + Send;

    /// Finds a ledger row by its access token value.
    fn find_credential_by_access_token(
        &mut self,
        access_token: &str,
    ) -> impl Future<Output = PgResult<Option<CredentialPair>>> + Send;

    /// Finds a ledger row by its refresh token value.
    fn find_credential_by_refresh_token(
        &mut self,
        refresh_token: &str,
    ) -> impl Future<Output = PgResult<Option<CredentialPair>>> + Send;

    /// Returns whether an unrevoked ledger row exists for this access token.
    fn is_access_token_active(
        &mut self,
        access_token: &str,
    ) -> impl Future<Output = PgResult<bool>> + Send;

    /// Lists every pair ever issued to the account, newest first.
    fn list_account_credentials(
        &mut self,
        account_id: Uuid,
    ) -> impl Future<Output = PgResult<Vec<CredentialPair>>> + Send;
}

impl CredentialRepository for PgConnection {
    async fn create_credential_pair(
        &mut self,
        new_pair: NewCredentialPair,
    ) -> PgResult<CredentialPair> {
        use schema::credential_pairs;

        diesel::insert_into(credential_pairs::table)
            .values(&new_pair)
            .returning(CredentialPair::as_returning())
            .get_result(self)
            .await
            .map_err(PgError::from)
    }

    async fn issue_credential_pair(
        &mut self,
        new_pair: NewCredentialPair,
    ) -> PgResult<CredentialPair> {
        let account_id = new_pair.account_id;

        self.transaction::<CredentialPair, PgError, _>(|conn| {
            async move {
                use schema::credential_pairs;

                let revoked = conn.revoke_account_credentials(account_id).await?;
                tracing::debug!(
                    target: TRACING_TARGET_QUERY,
                    account_id = %account_id,
                    revoked = revoked,
                    "superseded prior credential pairs"
                );

                diesel::insert_into(credential_pairs::table)
                    .values(&new_pair)
                    .returning(CredentialPair::as_returning())
                    .get_result(conn)
                    .await
                    .map_err(PgError::from)
            }
            .scope_boxed()
        })
        .await
    }

    async fn rotate_credential_pair(
        &mut self,
        presented_refresh_token: &str,
        new_pair: NewCredentialPair,
    ) -> PgResult<CredentialPair> {
        let presented = presented_refresh_token.to_owned();

        self.transaction::<CredentialPair, PgError, _>(|conn| {
            async move {
                use schema::credential_pairs::{self, dsl};

                // The row lock serializes concurrent rotations of the same
                // token; the loser re-reads the row after the winner commits
                // and sees it revoked.
                let current: Option<CredentialPair> = credential_pairs::table
                    .filter(dsl::refresh_token.eq(&presented))
                    .for_update()
                    .select(CredentialPair::as_select())
                    .first(conn)
                    .await
                    .optional()?;

                let current = match current {
                    Some(pair) if pair.is_active() => pair,
                    _ => return Err(PgError::StaleCredential),
                };

                conn.revoke_account_credentials(current.account_id).await?;

                diesel::insert_into(credential_pairs::table)
                    .values(&new_pair)
                    .returning(CredentialPair::as_returning())
                    .get_result(conn)
                    .await
                    .map_err(PgError::from)
            }
            .scope_boxed()
        })
        .await
    }

    async fn revoke_account_credentials(&mut self, account_id: Uuid) -> PgResult<i64> {
        use schema::credential_pairs::{self, dsl};

        diesel::update(
            credential_pairs::table
                .filter(dsl::account_id.eq(account_id))
                .filter(dsl::is_revoked.eq(false)),
        )
        .set(dsl::is_revoked.eq(true))
        .execute(self)
        .await
        .map_err(PgError::from)
        .map(|rows| rows as i64)
    }

    async fn find_credential_by_access_token(
        &mut self,
        access_token: &str,
    ) -> PgResult<Option<CredentialPair>> {
        use schema::credential_pairs::{self, dsl};

        credential_pairs::table
            .filter(dsl::access_token.eq(access_token))
            .select(CredentialPair::as_select())
            .first(self)
            .await
            .optional()
            .map_err(PgError::from)
    }

    async fn find_credential_by_refresh_token(
        &mut self,
        refresh_token: &str,
    ) -> PgResult<Option<CredentialPair>> {
        use schema::credential_pairs::{self, dsl};

        credential_pairs::table
            .filter(dsl::refresh_token.eq(refresh_token))
            .select(CredentialPair::as_select())
            .first(self)
            .await
            .optional()
            .map_err(PgError::from)
    }

    async fn is_access_token_active(&mut self, access_token: &str) -> PgResult<bool> {
        use diesel::dsl::{exists, select};
        use schema::credential_pairs::{self, dsl};

        select(exists(
            credential_pairs::table
                .filter(dsl::access_token.eq(access_token))
                .filter(dsl::is_revoked.eq(false)),
        ))
        .get_result(self)
        .await
        .map_err(PgError::from)
    }

    async fn list_account_credentials(
        &mut self,
        account_id: Uuid,
    ) -> PgResult<Vec<CredentialPair>> {
        use schema::credential_pairs::{self, dsl};

        credential_pairs::table
            .filter(dsl::account_id.eq(account_id))
            .order(dsl::issued_at.desc())
            .select(CredentialPair::as_select())
            .load(self)
            .await
            .map_err(PgError::from)
    }
}
