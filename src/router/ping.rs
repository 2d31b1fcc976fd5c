//! Unauthenticated health check.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::Configuration;
use crate::error::ResponseBody;

/// Instance identification.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub name: String,
    pub version: String,
}

pub async fn handler(
    State(config): State<Arc<Configuration>>,
) -> ResponseBody<Status> {
    ResponseBody::success(
        StatusCode::OK,
        "ok",
        Status {
            name: config.name.clone(),
            version: env!("CARGO_PKG_VERSION").into(),
        },
    )
}
