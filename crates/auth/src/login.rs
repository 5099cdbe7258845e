use thiserror::Error;

/// Why a login attempt failed (internal detail).
///
/// The variants are kept apart for logging and tests. Anything that crosses
/// the boundary to an external caller must go through [`LoginFailure`] so the
/// caller cannot tell an unknown username from a wrong secret.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("no such identity")]
    NoSuchIdentity,

    #[error("account disabled")]
    AccountDisabled,

    #[error("bad credential")]
    BadCredential,

    /// Stored hash unreadable. Authenticates like `BadCredential` but points
    /// at corrupted data.
    #[error("corrupt stored credential: {0}")]
    CorruptCredential(String),

    #[error("identity store unavailable: {0}")]
    StoreUnavailable(String),
}

impl AuthError {
    /// True for every failure caused by the presented credentials or the
    /// account state, as opposed to an infrastructure outage.
    pub fn is_credential_failure(&self) -> bool {
        !matches!(self, AuthError::StoreUnavailable(_))
    }

    pub fn to_login_failure(&self) -> LoginFailure {
        if self.is_credential_failure() {
            LoginFailure::AuthenticationFailed
        } else {
            LoginFailure::Unavailable
        }
    }
}

/// What an external caller is allowed to learn about a failed login.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LoginFailure {
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The store could not be reached; the caller decides whether to retry.
    #[error("authentication temporarily unavailable")]
    Unavailable,
}

impl From<AuthError> for LoginFailure {
    fn from(value: AuthError) -> Self {
        value.to_login_failure()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_failures_are_indistinguishable_externally() {
        let failures = [
            AuthError::NoSuchIdentity,
            AuthError::AccountDisabled,
            AuthError::BadCredential,
            AuthError::CorruptCredential("bad phc string".to_string()),
        ];

        for failure in failures {
            let external = LoginFailure::from(failure);
            assert_eq!(external, LoginFailure::AuthenticationFailed);
            assert_eq!(external.to_string(), "authentication failed");
        }
    }

    #[test]
    fn store_outage_stays_distinct() {
        let err = AuthError::StoreUnavailable("connection refused".to_string());
        assert!(!err.is_credential_failure());
        assert_eq!(LoginFailure::from(err), LoginFailure::Unavailable);
    }
}
