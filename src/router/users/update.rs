//! Update user profile.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Extension;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{ResponseBody, Result};
use crate::middleware::Requirement;
use crate::router::{Valid, non_empty, outcome, validate_phone};
use crate::token::Principal;
use crate::user::{UserPatch, UserResponse};
use crate::{AppState, ServerError};

/// Profile changes. Absent or empty fields are left untouched.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct Body {
    #[serde(default, deserialize_with = "non_empty")]
    #[validate(length(
        max = 255,
        message = "Name must contain at most 255 characters."
    ))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    #[validate(length(
        min = 3,
        max = 64,
        message = "Username must contain 3 to 64 characters."
    ))]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    #[validate(email(message = "Email must be formatted."))]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    pub role_id: Option<String>,
}

pub async fn handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Valid(body): Valid<Body>,
) -> Result<ResponseBody<UserResponse>> {
    state.gate.require(&principal, Requirement::Owner(&id))?;
    if let Some(phone) = &body.phone {
        validate_phone(phone)?;
    }

    if let Some(role_id) = &body.role_id {
        let current = state.users.get(&id).await?;
        if *role_id != current.role.id && !state.gate.is_admin(&principal) {
            return Err(ServerError::Forbidden("only admin can change roles"));
        }
    }

    let updated = state
        .users
        .update_profile(
            &id,
            UserPatch {
                name: body.name,
                username: body.username,
                email: body.email,
                password: None,
                phone: body.phone,
                role_id: body.role_id,
            },
        )
        .await?;

    Ok(ResponseBody::success(
        StatusCode::OK,
        &outcome("user updated", &updated.delivery),
        updated.record,
    ))
}
