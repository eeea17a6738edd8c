//! Authentication middleware that validates the auth cookie and resolves the logged in user.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{FromRef, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use jsonwebtoken::DecodingKey;
use rusqlite::Connection;

use crate::{
    AppState, Error,
    auth::{User, cookie::get_token_from_cookies, token::decode_jwt, user::get_user_by_id},
};

/// The state needed for the auth middleware
#[derive(Clone)]
pub struct AuthState {
    /// The key for verifying the token in the auth cookie.
    pub decoding_key: DecodingKey,
    /// The database connection for looking up the user named in the token.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            decoding_key: state.jwt_keys.decoding_key.clone(),
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Middleware function that checks for a valid auth cookie.
///
/// The user named in the token is placed into the request extensions and the request executed
/// normally if the cookie is valid, otherwise a 401 response is returned. A token for a user
/// that has since been deleted is treated the same as a missing token.
///
/// **Note**: Route handlers can use the function argument `Extension(user): Extension<User>` to
/// receive the user.
pub async fn auth_guard(
    State(state): State<AuthState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let user = match authenticate(&state, &jar) {
        Ok(user) => user,
        Err(error) => return error.into_response(),
    };

    request.extensions_mut().insert(user);
    next.run(request).await
}

fn authenticate(state: &AuthState, jar: &CookieJar) -> Result<User, Error> {
    let token = get_token_from_cookies(jar).ok_or(Error::NotAuthenticated)?;
    let claims = decode_jwt(token, &state.decoding_key)?;

    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    get_user_by_id(claims.user_id(), &connection).map_err(|error| match error {
        Error::NotFound(_) => {
            tracing::debug!("Rejected token for missing user {}", claims.sub);
            Error::NotAuthenticated
        }
        error => error,
    })
}
