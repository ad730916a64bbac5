//! Structured representation of known database constraint violations.

/// Known unique/check constraints that user input can violate.
///
/// Mapping constraint names to variants lets HTTP layers translate database
/// failures into precise client errors without string matching at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintViolation {
    /// `accounts.email_address` unique constraint.
    AccountEmailTaken,
    /// `universities.domain` unique constraint.
    UniversityDomainTaken,
    /// `credential_pairs.access_token` / `refresh_token` unique constraints.
    CredentialTokenDuplicate,
    /// `accounts.roles` non-empty check constraint.
    AccountRolesEmpty,
}

impl ConstraintViolation {
    /// Resolves a Postgres constraint name into a known violation.
    pub fn new(constraint_name: &str) -> Option<Self> {
        match constraint_name {
            "accounts_email_address_key" => Some(Self::AccountEmailTaken),
            "universities_domain_key" => Some(Self::UniversityDomainTaken),
            "credential_pairs_access_token_key" | "credential_pairs_refresh_token_key" => {
                Some(Self::CredentialTokenDuplicate)
            }
            "accounts_roles_not_empty" => Some(Self::AccountRolesEmpty),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_constraints() {
        assert_eq!(
            ConstraintViolation::new("accounts_email_address_key"),
            Some(ConstraintViolation::AccountEmailTaken)
        );
        assert_eq!(
            ConstraintViolation::new("credential_pairs_refresh_token_key"),
            Some(ConstraintViolation::CredentialTokenDuplicate)
        );
        assert_eq!(ConstraintViolation::new("unrelated"), None);
    }
}
