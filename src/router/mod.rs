//! HTTP API.
pub mod create;
pub mod ping;
pub mod users;

use std::sync::LazyLock;

use axum::Json;
use axum::extract::{FromRequest, Request};
use regex_lite::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::ServerError;
use crate::event::Delivery;

static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{10,13}$").expect("phone pattern"));

/// JSON body checked with [`Validate`] before reaching the handler.
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// Phone numbers are optional; when given, 10 to 13 digits.
pub fn validate_phone(phone: &str) -> Result<(), ValidationErrors> {
    if phone.is_empty() || PHONE.is_match(phone) {
        return Ok(());
    }

    let mut errors = ValidationErrors::new();
    errors.add(
        "phone",
        ValidationError::new("phone")
            .with_message("Phone must contain 10 to 13 digits.".into()),
    );
    Err(errors)
}

/// Treat empty strings as absent values.
pub fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|value| !value.trim().is_empty()))
}

/// Response message of a write, mentioning an unpublished event.
pub fn outcome(action: &str, delivery: &Delivery) -> String {
    match delivery {
        Delivery::Delivered => action.to_owned(),
        Delivery::Failed(_) => format!("{action}, replication event not published"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone() {
        for phone in ["", "0812345678", "0812345678901"] {
            assert!(validate_phone(phone).is_ok(), "{phone}");
        }
        for phone in ["081234567", "08123456789012", "+628123456789", "08-1234-5678"]
        {
            assert!(validate_phone(phone).is_err(), "{phone}");
        }
    }

    #[test]
    fn test_outcome() {
        assert_eq!(outcome("user created", &Delivery::Delivered), "user created");
        assert_eq!(
            outcome("user deleted", &Delivery::Failed("timeout".into())),
            "user deleted, replication event not published"
        );
    }
}
