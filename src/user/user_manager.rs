use super::{
    AuthToken, AuthTokenValue, CreditCharge, CreditStatus, FullUserStore, UserProfile,
    UsernamePasswordCredentials,
};
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};

pub const DEFAULT_FREE_CREDITS: u32 = 3;
const MIN_PASSWORD_LENGTH: usize = 4;

pub struct UserManager {
    user_store: Arc<dyn FullUserStore>,
    free_credits: u32,
}

impl UserManager {
    pub fn new(user_store: Arc<dyn FullUserStore>, free_credits: u32) -> Self {
        Self {
            user_store,
            free_credits,
        }
    }

    /// Credits granted to newly registered users.
    pub fn free_credits(&self) -> u32 {
        self.free_credits
    }

    /// Registers a user with password credentials and the default credit balance.
    pub fn add_user(&self, user_handle: &str, password: &str) -> Result<usize> {
        let user_handle = user_handle.trim();
        if user_handle.is_empty() {
            bail!("The user handle cannot be empty.");
        }
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            bail!(
                "The password must be at least {} characters long.",
                MIN_PASSWORD_LENGTH
            );
        }
        if self.user_store.get_user_id(user_handle)?.is_some() {
            bail!("User handle already exists.");
        }

        let user_id = self.user_store.create_user(user_handle, self.free_credits)?;
        let credentials = UsernamePasswordCredentials::create(user_id, password)?;
        self.user_store.set_password_credentials(&credentials)?;
        info!("Registered user {} with id {}", user_handle, user_id);
        Ok(user_id)
    }

    /// Returns a fresh session token if the credentials match, Ok(None) otherwise.
    pub fn login(&self, user_handle: &str, password: &str) -> Result<Option<AuthToken>> {
        let credentials = match self.user_store.get_password_credentials(user_handle)? {
            Some(credentials) => credentials,
            None => {
                debug!("No password credentials for {}", user_handle);
                return Ok(None);
            }
        };
        if !credentials.verify(password)? {
            debug!("Wrong password for {}", user_handle);
            return Ok(None);
        }
        self.generate_auth_token(credentials.user_id).map(Some)
    }

    pub fn generate_auth_token(&self, user_id: usize) -> Result<AuthToken> {
        let token = AuthToken {
            user_id,
            value: AuthTokenValue::generate(),
            created: SystemTime::now(),
            last_used: None,
        };
        self.user_store.add_user_auth_token(&token)?;
        Ok(token)
    }

    pub fn get_auth_token(&self, value: &AuthTokenValue) -> Result<Option<AuthToken>> {
        self.user_store.get_user_auth_token(value)
    }

    pub fn update_auth_token_last_used(&self, value: &AuthTokenValue) -> Result<()> {
        self.user_store
            .update_user_auth_token_last_used_timestamp(value)
    }

    pub fn delete_auth_token(&self, user_id: usize, value: &AuthTokenValue) -> Result<()> {
        match self.user_store.get_user_auth_token(value)? {
            Some(token) if token.user_id == user_id => {
                self.user_store.delete_user_auth_token(value)?;
                Ok(())
            }
            Some(_) => bail!("Token does not belong to user {}", user_id),
            None => Ok(()),
        }
    }

    pub fn get_user_profile(&self, user_id: usize) -> Result<Option<UserProfile>> {
        self.user_store.get_user_profile(user_id)
    }

    pub fn get_credit_status(&self, user_id: usize) -> Result<CreditStatus> {
        self.user_store
            .get_credit_status(user_id)?
            .with_context(|| format!("User {} not found", user_id))
    }

    /// Charges one credit for a completed enhancement. Subscribers are not charged.
    pub fn charge_credit(&self, user_id: usize) -> Result<CreditCharge> {
        if !self.get_credit_status(user_id)?.is_metered() {
            return Ok(CreditCharge::NotMetered);
        }
        Ok(match self.user_store.try_consume_credit(user_id)? {
            Some(remaining) => CreditCharge::Charged { remaining },
            None => CreditCharge::Exhausted,
        })
    }

    pub fn set_subscription_active(&self, user_id: usize, active: bool) -> Result<()> {
        self.user_store.set_subscription_active(user_id, active)?;
        info!("Subscription of user {} set to {}", user_id, active);
        Ok(())
    }

    pub fn set_free_credits(&self, user_id: usize, free_credits: u32) -> Result<()> {
        self.user_store.set_free_credits(user_id, free_credits)
    }
}
