pub mod auth;
mod sqlite_user_store;
mod user_manager;
pub mod user_models;
mod user_store;

pub use auth::{AuthToken, AuthTokenValue, CredentialsHasher, UsernamePasswordCredentials};
pub use sqlite_user_store::SqliteUserStore;
pub use user_manager::{UserManager, DEFAULT_FREE_CREDITS};
pub use user_models::{CreditCharge, CreditStatus, UserProfile};
pub use user_store::{
    FullUserStore, UserAuthCredentialsStore, UserAuthTokenStore, UserCreditsStore, UserStore,
};
