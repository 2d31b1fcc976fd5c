//! Users-related HTTP API. Every route needs a valid token.
mod delete;
mod get;
mod list;
mod password;
mod update;

use axum::handler::Handler;
use axum::routing::{get, post, put};
use axum::{Router, middleware};

use crate::AppState;
use crate::middleware::{administrator, authenticated};
use crate::router::create;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // `GET /` goes to `list`.
        .route("/", get(list::handler))
        // `POST /create` goes to `create`.
        .route("/create", post(create::handler))
        // `GET /{id}`, `PUT /{id}` and `DELETE /{id}`. Deletion is for admins only.
        .route(
            "/{id}",
            get(get::handler).put(update::handler).delete(
                delete::handler.layer(middleware::from_fn_with_state(
                    state.clone(),
                    administrator,
                )),
            ),
        )
        // `PUT /{id}/password` goes to `password`.
        .route("/{id}/password", put(password::handler))
        .route_layer(middleware::from_fn_with_state(state, authenticated))
}
