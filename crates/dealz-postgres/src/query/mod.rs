//! Repository traits implemented on [`PgConnection`].
//!
//! Each repository is a trait with `impl Future` methods implemented directly
//! on the async connection type, so call sites work the same on pooled
//! connections and inside transactions.
//!
//! [`PgConnection`]: crate::PgConnection

mod account;
mod credential;
mod university;

pub use self::account::AccountRepository;
pub use self::credential::CredentialRepository;
pub use self::university::UniversityRepository;
