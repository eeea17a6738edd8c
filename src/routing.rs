//! Application router configuration with protected and unprotected route definitions.

use std::time::Duration;

use axum::{
    Router,
    http::{HeaderValue, Method, StatusCode, header::CONTENT_TYPE},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};

use crate::{
    AppState, Error,
    analytics::{
        get_category_endpoint, get_overview_endpoint, get_top_transactions_endpoint,
        get_trends_endpoint,
    },
    auth::{auth_guard, forgot_password, post_log_in, post_log_out, register_user, reset_password},
    budget::{
        create_budget_endpoint, delete_budget_endpoint, get_budget_endpoint, get_budgets_endpoint,
        update_budget_endpoint,
    },
    endpoints,
    goal::{
        contribute_to_goal_endpoint, create_goal_endpoint, delete_goal_endpoint,
        get_goal_endpoint, get_goals_endpoint, update_goal_endpoint,
    },
    logging::logging_middleware,
    notification::{
        create_notification_endpoint, delete_notification_endpoint, get_notifications_endpoint,
        update_notification_endpoint,
    },
    recurring_transaction::{
        create_recurring_transaction_endpoint, delete_recurring_transaction_endpoint,
        get_recurring_transactions_endpoint, update_recurring_transaction_endpoint,
    },
    transaction::{
        create_transaction_endpoint, delete_transaction_endpoint, get_transaction_endpoint,
        get_transactions_endpoint, update_transaction_endpoint,
    },
    user::{change_password_endpoint, delete_me_endpoint, get_me_endpoint, update_me_endpoint},
};

/// How long a request may take before the server gives up on it.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    let unprotected_routes = Router::new()
        .route(endpoints::REGISTER, post(register_user))
        .route(endpoints::LOG_IN, post(post_log_in))
        .route(endpoints::LOG_OUT, post(post_log_out))
        .route(endpoints::FORGOT_PASSWORD, post(forgot_password))
        .route(endpoints::RESET_PASSWORD, post(reset_password));

    let protected_routes = Router::new()
        .route(
            endpoints::TRANSACTIONS,
            get(get_transactions_endpoint).post(create_transaction_endpoint),
        )
        .route(
            endpoints::TRANSACTION,
            get(get_transaction_endpoint)
                .put(update_transaction_endpoint)
                .delete(delete_transaction_endpoint),
        )
        .route(
            endpoints::BUDGETS,
            get(get_budgets_endpoint).post(create_budget_endpoint),
        )
        .route(
            endpoints::BUDGET,
            get(get_budget_endpoint)
                .put(update_budget_endpoint)
                .delete(delete_budget_endpoint),
        )
        .route(
            endpoints::GOALS,
            get(get_goals_endpoint).post(create_goal_endpoint),
        )
        .route(
            endpoints::GOAL,
            get(get_goal_endpoint)
                .put(update_goal_endpoint)
                .delete(delete_goal_endpoint),
        )
        .route(
            endpoints::GOAL_CONTRIBUTE,
            post(contribute_to_goal_endpoint),
        )
        .route(
            endpoints::RECURRING_TRANSACTIONS,
            get(get_recurring_transactions_endpoint).post(create_recurring_transaction_endpoint),
        )
        .route(
            endpoints::RECURRING_TRANSACTION,
            put(update_recurring_transaction_endpoint).delete(delete_recurring_transaction_endpoint),
        )
        .route(
            endpoints::NOTIFICATIONS,
            get(get_notifications_endpoint).post(create_notification_endpoint),
        )
        .route(
            endpoints::NOTIFICATION,
            put(update_notification_endpoint).delete(delete_notification_endpoint),
        )
        .route(endpoints::ANALYTICS_OVERVIEW, get(get_overview_endpoint))
        .route(endpoints::ANALYTICS_CATEGORY, get(get_category_endpoint))
        .route(endpoints::ANALYTICS_TRENDS, get(get_trends_endpoint))
        .route(
            endpoints::ANALYTICS_TOP_TRANSACTIONS,
            get(get_top_transactions_endpoint),
        )
        .route(
            endpoints::USER_ME,
            get(get_me_endpoint)
                .put(update_me_endpoint)
                .delete(delete_me_endpoint),
        )
        .route(
            endpoints::USER_CHANGE_PASSWORD,
            post(change_password_endpoint),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_guard));

    let cors = cors_layer(&state.frontend_url);

    protected_routes
        .merge(unprotected_routes)
        .fallback(get_404_not_found)
        .layer(middleware::from_fn(logging_middleware))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            REQUEST_TIMEOUT,
        ))
        .layer(cors)
        .with_state(state)
}

/// Allow the front end at `frontend_url`, and only it, to make requests with cookies.
fn cors_layer(frontend_url: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(true);

    match HeaderValue::from_str(frontend_url) {
        Ok(origin) => cors.allow_origin([origin]),
        Err(error) => {
            tracing::error!("Invalid front end URL {frontend_url:?}, CORS disabled: {error}");
            cors
        }
    }
}

async fn get_404_not_found() -> Response {
    Error::NotFound("Route").into_response()
}
