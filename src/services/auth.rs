//! Resource-owner authentication.
//!
//! The password grant and the login dialog both authenticate against the
//! first-party user store. Swapping in another identity backend means
//! replacing this service; the OAuth flows only see
//! `authenticate -> Option<User>`.

use sqlx::MySqlPool;

use crate::error::OAuthError;
use crate::models::User;
use crate::repositories::UserRepository;
use crate::utils::password::verify_password;

#[derive(Clone)]
pub struct UserAuthService {
    user_repo: UserRepository,
}

impl UserAuthService {
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            user_repo: UserRepository::new(pool),
        }
    }

    /// Verify a username/password pair.
    ///
    /// Returns `None` for unknown users, wrong passwords, and deactivated
    /// accounts; the caller decides whether that is a redirect, a re-render,
    /// or `invalid_grant`.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, OAuthError> {
        let Some(user) = self.user_repo.find_by_username(username).await? else {
            return Ok(None);
        };

        if !user.is_active {
            return Ok(None);
        }

        if !verify_password(password, &user.password_hash)? {
            return Ok(None);
        }

        Ok(Some(user))
    }
}
