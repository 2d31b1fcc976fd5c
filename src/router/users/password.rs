//! Change user password. The change stays local to this service.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Extension;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{ResponseBody, Result};
use crate::middleware::Requirement;
use crate::router::{Valid, non_empty};
use crate::token::Principal;
use crate::user::UserResponse;
use crate::{AppState, ServerError};

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    /// Required unless an admin resets the password.
    #[serde(default, deserialize_with = "non_empty")]
    pub current_password: Option<String>,
    #[validate(length(
        min = 1,
        max = 255,
        message = "Password must not be empty."
    ))]
    pub password: String,
}

pub async fn handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Valid(body): Valid<Body>,
) -> Result<ResponseBody<UserResponse>> {
    state.gate.require(&principal, Requirement::Owner(&id))?;

    if body.current_password.is_none() && !state.gate.is_admin(&principal) {
        return Err(ServerError::BadRequest(
            "current password is required".into(),
        ));
    }

    let user = state
        .users
        .update_password(&id, body.current_password.as_deref(), &body.password)
        .await?;

    Ok(ResponseBody::success(StatusCode::OK, "password updated", user))
}
