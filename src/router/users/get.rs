use axum::extract::{Path, State};
use axum::http::StatusCode;

use crate::AppState;
use crate::error::{ResponseBody, Result};
use crate::user::UserResponse;

pub async fn handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ResponseBody<UserResponse>> {
    let user = state.users.get(&id).await?;

    Ok(ResponseBody::success(StatusCode::OK, "user found", user))
}
