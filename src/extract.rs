//! Request extractors that report rejections with the app's JSON error envelope.
//!
//! The axum extractors of the same name reply with a plain-text body when the input is
//! malformed. These wrappers convert the rejection into [Error::InvalidInput] instead.

use axum::extract::{FromRequest, FromRequestParts};

use crate::Error;

/// A JSON request body.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(Error))]
pub(crate) struct JsonBody<T>(pub T);

/// Query string parameters.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(Error))]
pub(crate) struct QueryParams<T>(pub T);

/// Path parameters.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(Error))]
pub(crate) struct PathParam<T>(pub T);

/// Build an [Error::MissingFields] naming each field whose flag is `true`.
///
/// Used in the `else` branch of a `let`-`else` that destructures the required fields, e.g.
///
/// ```ignore
/// let (Some(name), Some(email)) = (&form.name, &form.email) else {
///     return Err(missing_fields([("name", form.name.is_none()), ("email", form.email.is_none())]));
/// };
/// ```
pub(crate) fn missing_fields<const N: usize>(fields: [(&'static str, bool); N]) -> Error {
    Error::MissingFields(
        fields
            .into_iter()
            .filter_map(|(name, is_missing)| is_missing.then_some(name))
            .collect(),
    )
}

/// Deserialize an optional string, treating blank strings the same as a missing value.
///
/// Use together with `#[serde(default)]`.
pub(crate) fn non_blank<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = serde::Deserialize::deserialize(deserializer)?;

    Ok(value
        .map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty()))
}
