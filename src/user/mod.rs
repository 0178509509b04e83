pub mod auth;
mod user_manager;

pub use auth::{AuthToken, AuthTokenValue, PasswordCredentials, Vlog72Hasher};
pub use user_manager::{NewAccount, UserManager};
