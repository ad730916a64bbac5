//! Diesel models for accounts, universities, and credential pairs.

mod account;
mod credential;
mod university;

pub use self::account::{Account, NewAccount};
pub use self::credential::{CredentialPair, NewCredentialPair};
pub use self::university::{NewUniversity, University};
