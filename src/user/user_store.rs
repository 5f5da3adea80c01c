use super::auth::{AuthToken, AuthTokenValue, UsernamePasswordCredentials};
use super::user_models::{CreditStatus, UserProfile};
use anyhow::Result;

pub trait UserAuthCredentialsStore: Send + Sync {
    /// Returns the password credentials of the user with the given handle.
    /// Returns Ok(None) if the user or its credentials do not exist.
    fn get_password_credentials(
        &self,
        user_handle: &str,
    ) -> Result<Option<UsernamePasswordCredentials>>;

    /// Creates or replaces the password credentials of a user.
    fn set_password_credentials(&self, credentials: &UsernamePasswordCredentials) -> Result<()>;
}

pub trait UserAuthTokenStore: Send + Sync {
    /// Returns Ok(None) if the token does not exist.
    fn get_user_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>>;

    /// Deletes an auth token, returning it if it existed.
    fn delete_user_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>>;

    fn update_user_auth_token_last_used_timestamp(&self, token: &AuthTokenValue) -> Result<()>;

    fn add_user_auth_token(&self, token: &AuthToken) -> Result<()>;
}

pub trait UserCreditsStore: Send + Sync {
    /// Returns Ok(None) if the user does not exist.
    fn get_credit_status(&self, user_id: usize) -> Result<Option<CreditStatus>>;

    /// Takes one free credit if the balance is positive, atomically.
    /// Returns the remaining balance, or Ok(None) if there was nothing to take.
    fn try_consume_credit(&self, user_id: usize) -> Result<Option<u32>>;

    fn set_subscription_active(&self, user_id: usize, active: bool) -> Result<()>;

    fn set_free_credits(&self, user_id: usize, free_credits: u32) -> Result<()>;
}

pub trait UserStore: Send + Sync {
    /// Creates a new user and returns its id.
    fn create_user(&self, user_handle: &str, free_credits: u32) -> Result<usize>;

    /// Returns Ok(None) if the handle is unknown.
    fn get_user_id(&self, user_handle: &str) -> Result<Option<usize>>;

    /// Returns Ok(None) if the user does not exist.
    fn get_user_profile(&self, user_id: usize) -> Result<Option<UserProfile>>;
}

pub trait FullUserStore:
    UserStore + UserAuthCredentialsStore + UserAuthTokenStore + UserCreditsStore
{
}

impl<T> FullUserStore for T where
    T: UserStore + UserAuthCredentialsStore + UserAuthTokenStore + UserCreditsStore
{
}
