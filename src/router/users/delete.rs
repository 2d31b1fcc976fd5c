//! Delete user. Admin only.

use axum::extract::{Path, State};
use axum::http::StatusCode;

use crate::AppState;
use crate::error::{ResponseBody, Result};
use crate::router::outcome;

pub async fn handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ResponseBody<String>> {
    let deleted = state.users.delete(&id).await?;

    Ok(ResponseBody::success(
        StatusCode::OK,
        &outcome("user deleted", &deleted.delivery),
        deleted.record,
    ))
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use serde_json::json;

    use super::*;
    use crate::testing::Harness;
    use crate::{app, make_request};

    #[tokio::test]
    async fn test_non_admin_cannot_delete() {
        let harness = Harness::new();
        harness.seed_user("u2", "bob").await;
        let before = harness.users.snapshot();

        // even the owner.
        for token in [harness.token("u1", "2"), harness.token("u2", "2")] {
            let response = make_request(
                app(harness.state.clone()),
                Method::DELETE,
                "/u2",
                Some(&token),
                String::default(),
            )
            .await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
        }

        assert_eq!(harness.users.snapshot(), before);
        assert!(harness.bus.published().is_empty());
    }

    #[tokio::test]
    async fn test_admin_deletes() {
        let harness = Harness::new();
        harness.seed_user("u2", "bob").await;
        let token = harness.token("root", "1");

        let response = make_request(
            app(harness.state.clone()),
            Method::DELETE,
            "/u2",
            Some(&token),
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(harness.users.snapshot().is_empty());

        let records = harness.bus.published();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].method, "DELETE.USER");
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&records[0].payload)
                .unwrap(),
            json!({ "id": "u2" })
        );

        let response = make_request(
            app(harness.state.clone()),
            Method::DELETE,
            "/u2",
            Some(&token),
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_expired_token() {
        let harness = Harness::new();
        harness.seed_user("u2", "bob").await;
        let token = harness.token("root", "1");
        harness.clock.advance(24 * 3600 + 1);

        let response = make_request(
            app(harness.state.clone()),
            Method::DELETE,
            "/u2",
            Some(&token),
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(harness.users.snapshot().len(), 1);
    }
}
