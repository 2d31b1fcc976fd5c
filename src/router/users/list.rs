use axum::extract::State;
use axum::http::StatusCode;

use crate::AppState;
use crate::error::{ResponseBody, Result};
use crate::user::UserResponse;

/// List every user.
pub async fn handler(
    State(state): State<AppState>,
) -> Result<ResponseBody<Vec<UserResponse>>> {
    let users = state.users.list().await?;

    Ok(ResponseBody::success(StatusCode::OK, "users found", users))
}
