//! The API endpoints URIs.
//!
//! For endpoints that take a parameter, e.g., '/api/budgets/{budget_id}', use [format_endpoint].

use std::fmt::Display;

/// The prefix shared by every route.
pub const API_PREFIX: &str = "/api";

/// The route for registering a new user.
pub const REGISTER: &str = "/api/authentication/register";
/// The route for logging in a user.
pub const LOG_IN: &str = "/api/authentication/login";
/// The route for the client to log out the current user.
pub const LOG_OUT: &str = "/api/authentication/logout";
/// The route for requesting a password reset link.
pub const FORGOT_PASSWORD: &str = "/api/authentication/forgot-password";
/// The route for setting a new password with a reset token.
pub const RESET_PASSWORD: &str = "/api/authentication/reset-password/{token}";

/// The route to list and create transactions.
pub const TRANSACTIONS: &str = "/api/transaction";
/// The route to access a single transaction.
pub const TRANSACTION: &str = "/api/transaction/{transaction_id}";

/// The route to list and create budgets.
pub const BUDGETS: &str = "/api/budgets";
/// The route to access a single budget.
pub const BUDGET: &str = "/api/budgets/{budget_id}";

/// The route to list and create financial goals.
pub const GOALS: &str = "/api/goals";
/// The route to access a single financial goal.
pub const GOAL: &str = "/api/goals/{goal_id}";
/// The route to add money to a financial goal.
pub const GOAL_CONTRIBUTE: &str = "/api/goals/{goal_id}/contribute";

/// The route to list and create recurring transaction templates.
pub const RECURRING_TRANSACTIONS: &str = "/api/recurring-transactions";
/// The route to access a single recurring transaction template.
pub const RECURRING_TRANSACTION: &str = "/api/recurring-transactions/{recurring_transaction_id}";

/// The route to list and create notifications.
pub const NOTIFICATIONS: &str = "/api/notifications";
/// The route to access a single notification.
pub const NOTIFICATION: &str = "/api/notifications/{notification_id}";

/// The route for the income and expense totals.
pub const ANALYTICS_OVERVIEW: &str = "/api/analytics/overview";
/// The route for spending per category.
pub const ANALYTICS_CATEGORY: &str = "/api/analytics/category";
/// The route for daily income and expense totals.
pub const ANALYTICS_TRENDS: &str = "/api/analytics/trends";
/// The route for the largest transactions.
pub const ANALYTICS_TOP_TRANSACTIONS: &str = "/api/analytics/top-transactions";

/// The route for the logged in user's profile.
pub const USER_ME: &str = "/api/user/me";
/// The route for changing the logged in user's password.
pub const USER_CHANGE_PASSWORD: &str = "/api/user/me/change-password";

/// Replace the parameter in `endpoint_path` with `id`.
///
/// A parameter is a string that starts with a left brace, followed by
/// lowercase letters or underscores, and ends with a right brace.
/// For example, in the endpoint path '/users/{user_id}', '{user_id}' is the parameter.
///
/// This function assumes that an endpoint path only contains ASCII characters
/// and a single parameter.
///
/// If no parameter is found in `endpoint_path`, the function returns the
/// the original `endpoint_path`.
pub fn format_endpoint(endpoint_path: &str, id: impl Display) -> String {
    let Some(param_start) = endpoint_path.find('{') else {
        return endpoint_path.to_string();
    };

    let param_end = endpoint_path[param_start..]
        .find('}')
        .map(|offset| param_start + offset + 1)
        .unwrap_or(endpoint_path.len());

    format!(
        "{}{}{}",
        &endpoint_path[..param_start],
        id,
        &endpoint_path[param_end..]
    )
}

// These tests are here so that we know when we call `Uri::from_shared` it will not panic.
#[cfg(test)]
mod endpoints_tests {
    use axum::http::Uri;

    use crate::endpoints;

    use super::format_endpoint;

    fn assert_endpoint_is_valid_uri(uri: &str) {
        assert!(uri.parse::<Uri>().is_ok());
    }

    #[test]
    fn endpoints_are_valid_uris() {
        assert_endpoint_is_valid_uri(endpoints::REGISTER);
        assert_endpoint_is_valid_uri(endpoints::LOG_IN);
        assert_endpoint_is_valid_uri(endpoints::LOG_OUT);
        assert_endpoint_is_valid_uri(endpoints::FORGOT_PASSWORD);
        assert_endpoint_is_valid_uri(&format_endpoint(endpoints::RESET_PASSWORD, "abc123"));
        assert_endpoint_is_valid_uri(endpoints::TRANSACTIONS);
        assert_endpoint_is_valid_uri(endpoints::TRANSACTION);
        assert_endpoint_is_valid_uri(endpoints::BUDGETS);
        assert_endpoint_is_valid_uri(endpoints::BUDGET);
        assert_endpoint_is_valid_uri(endpoints::GOALS);
        assert_endpoint_is_valid_uri(endpoints::GOAL);
        assert_endpoint_is_valid_uri(endpoints::GOAL_CONTRIBUTE);
        assert_endpoint_is_valid_uri(endpoints::RECURRING_TRANSACTIONS);
        assert_endpoint_is_valid_uri(endpoints::RECURRING_TRANSACTION);
        assert_endpoint_is_valid_uri(endpoints::NOTIFICATIONS);
        assert_endpoint_is_valid_uri(endpoints::NOTIFICATION);
        assert_endpoint_is_valid_uri(endpoints::ANALYTICS_OVERVIEW);
        assert_endpoint_is_valid_uri(endpoints::ANALYTICS_CATEGORY);
        assert_endpoint_is_valid_uri(endpoints::ANALYTICS_TRENDS);
        assert_endpoint_is_valid_uri(endpoints::ANALYTICS_TOP_TRANSACTIONS);
        assert_endpoint_is_valid_uri(endpoints::USER_ME);
        assert_endpoint_is_valid_uri(endpoints::USER_CHANGE_PASSWORD);
    }

    #[test]
    fn every_endpoint_is_under_api_prefix() {
        for endpoint in [
            endpoints::REGISTER,
            endpoints::RESET_PASSWORD,
            endpoints::TRANSACTION,
            endpoints::GOAL_CONTRIBUTE,
            endpoints::ANALYTICS_TRENDS,
            endpoints::USER_CHANGE_PASSWORD,
        ] {
            assert!(endpoint.starts_with(endpoints::API_PREFIX));
        }
    }

    #[test]
    fn produces_valid_uri() {
        let formatted_path = format_endpoint("/hello/{world_id}", 1);

        assert_eq!(formatted_path, "/hello/1");
        assert!(formatted_path.parse::<Uri>().is_ok());

        // Parameter with single word should also work.
        let formatted_path = format_endpoint("/hello/{world}", 1);

        assert_eq!(formatted_path, "/hello/1");
        assert!(formatted_path.parse::<Uri>().is_ok());
    }

    #[test]
    fn returns_original_path_with_no_parameter() {
        let formatted_path = format_endpoint("/hello/world", 1);

        assert_eq!(formatted_path, "/hello/world");
        assert!(formatted_path.parse::<Uri>().is_ok());
    }

    #[test]
    fn parameter_in_middle() {
        let formatted_path = format_endpoint(crate::endpoints::GOAL_CONTRIBUTE, 7);

        assert_eq!(formatted_path, "/api/goals/7/contribute");
        assert!(formatted_path.parse::<Uri>().is_ok());
    }

    #[test]
    fn accepts_text_parameter() {
        let formatted_path = format_endpoint(crate::endpoints::RESET_PASSWORD, "cafe01");

        assert_eq!(formatted_path, "/api/authentication/reset-password/cafe01");
    }
}
