//! Credential checking against the identity store.

use tracing::{debug, instrument, warn};

use rolegate_auth::{AuthError, HashError, Principal, SecretHash, SecretHasher, Username};
use rolegate_core::Entity;

use crate::identity_store::{IdentityStore, StoreError};

/// Plaintext behind the dummy hash. Never matches anything a caller could
/// usefully present; it only exists so the verify cost is paid.
const DUMMY_SECRET: &str = "rolegate-timing-equalizer";

/// Turns `(username, secret)` into a [`Principal`] or an [`AuthError`].
///
/// Every call reads the store afresh; nothing is cached between calls, so a
/// role granted or an account disabled is visible on the next login.
///
/// Unknown and disabled users still pay for one hash verification (against a
/// dummy hash computed at construction) so response time does not reveal
/// which usernames exist.
pub struct PrincipalResolver<S, H> {
    store: S,
    hasher: H,
    dummy: SecretHash,
}

impl<S, H> PrincipalResolver<S, H>
where
    S: IdentityStore,
    H: SecretHasher,
{
    pub fn new(store: S, hasher: H) -> Result<Self, HashError> {
        let dummy = hasher.hash(DUMMY_SECRET)?;
        Ok(Self {
            store,
            hasher,
            dummy,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    #[instrument(skip(self, secret), err(level = "debug"))]
    pub fn resolve(&self, username: &str, secret: &str) -> Result<Principal, AuthError> {
        let Ok(username) = Username::parse(username) else {
            self.burn_verify(secret);
            return Err(AuthError::NoSuchIdentity);
        };

        let Some(user) = self
            .store
            .find_user_by_username(username.as_str())
            .map_err(store_unavailable)?
        else {
            self.burn_verify(secret);
            return Err(AuthError::NoSuchIdentity);
        };

        if !user.enabled {
            self.burn_verify(secret);
            return Err(AuthError::AccountDisabled);
        }

        match self.hasher.verify(secret, &user.secret_hash) {
            Ok(true) => {}
            Ok(false) => return Err(AuthError::BadCredential),
            Err(corrupt) => {
                warn!(username = %user.username, error = %corrupt, "stored credential is unreadable");
                return Err(AuthError::CorruptCredential(corrupt.0));
            }
        }

        let roles = self.store.roles_of(user.id()).map_err(store_unavailable)?;
        debug!(username = %user.username, roles = roles.len(), "principal resolved");

        Ok(Principal::new(
            user.username,
            roles.into_iter().map(|role| role.name),
        ))
    }

    fn burn_verify(&self, secret: &str) {
        // Result is irrelevant: the dummy never matches a real login.
        let _ = self.hasher.verify(secret, &self.dummy);
    }
}

impl<S, H> core::fmt::Debug for PrincipalResolver<S, H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PrincipalResolver").finish_non_exhaustive()
    }
}

fn store_unavailable(err: StoreError) -> AuthError {
    warn!(error = %err, "identity store failed during login");
    AuthError::StoreUnavailable(err.to_string())
}
