//! User accounts and authentication: the credential store, password hashing, JWT auth cookies,
//! the auth guard and the register, log-in, log-out and password reset routes.

mod cookie;
mod log_in;
mod log_out;
mod middleware;
mod password;
mod password_reset;
mod register_user;
mod token;
mod user;

pub use cookie::DEFAULT_SESSION_DURATION;
pub(crate) use cookie::invalidate_auth_cookie;
pub use log_in::post_log_in;
pub use log_out::post_log_out;
pub use middleware::{AuthState, auth_guard};
pub use password::{PASSWORD_HASH_COST, PasswordHash};
pub use password_reset::{
    RESET_TOKEN_DURATION, create_password_reset_token_table, forgot_password, reset_password,
};
pub use register_user::register_user;
pub use user::{User, UserID, create_user_table};
pub(crate) use user::{
    ProfileChanges, delete_user, get_user_by_id, normalize_email, update_password, update_profile,
};

#[cfg(test)]
pub(crate) use cookie::COOKIE_TOKEN;
#[cfg(test)]
pub(crate) use user::{NewUser, create_user};
