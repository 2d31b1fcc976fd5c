use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::{ResponseBody, Result};
use crate::router::{Valid, outcome, validate_phone};
use crate::user::{NewUser, UserResponse};

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(length(
        min = 1,
        max = 255,
        message = "Name must contain 1 to 255 characters."
    ))]
    pub name: String,
    #[validate(length(
        min = 3,
        max = 64,
        message = "Username must contain 3 to 64 characters."
    ))]
    pub username: String,
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(
        min = 1,
        max = 255,
        message = "Password must not be empty."
    ))]
    pub password: String,
    #[serde(default)]
    pub phone: String,
    #[validate(length(min = 1, message = "Role is required."))]
    pub role_id: String,
}

/// Handler to create user.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<ResponseBody<UserResponse>> {
    validate_phone(&body.phone)?;

    let created = state
        .users
        .create(NewUser {
            name: body.name,
            username: body.username,
            email: body.email,
            password: body.password,
            phone: body.phone,
            role_id: body.role_id,
        })
        .await?;

    Ok(ResponseBody::success(
        StatusCode::CREATED,
        &outcome("user created", &created.delivery),
        created.record,
    ))
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use http_body_util::BodyExt;
    use serde_json::json;

    use super::*;
    use crate::testing::Harness;
    use crate::{app, make_request};

    fn ann() -> serde_json::Value {
        json!({
            "name": "Ann",
            "username": "ann",
            "email": "ann@x.io",
            "password": "p1",
            "phone": "08123456789",
            "role_id": "1"
        })
    }

    async fn body(
        response: axum::response::Response,
    ) -> ResponseBody<serde_json::Value> {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_create_publishes_insert_event() {
        let harness = Harness::new();
        let token = harness.token("u1", "2");

        let response = make_request(
            app(harness.state.clone()),
            Method::POST,
            "/create",
            Some(&token),
            ann().to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = body(response).await;
        assert_eq!(body.code, 201);
        assert_eq!(body.message, "user created");
        let data = body.data.unwrap();
        assert_eq!(data["username"], "ann");
        assert_eq!(data["role"], json!({ "id": "1", "name": "admin" }));
        assert!(data.get("password").is_none());

        let records = harness.bus.published();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].method, "POST.USER");
        assert_eq!(records[0].topic, "users");
        let event: serde_json::Value =
            serde_json::from_slice(&records[0].payload).unwrap();
        assert_eq!(event["id"], data["id"]);
    }

    #[tokio::test]
    async fn test_duplicate_username() {
        let harness = Harness::new();
        let token = harness.token("u1", "2");

        for expected in [StatusCode::CREATED, StatusCode::BAD_REQUEST] {
            let response = make_request(
                app(harness.state.clone()),
                Method::POST,
                "/create",
                Some(&token),
                ann().to_string(),
            )
            .await;
            assert_eq!(response.status(), expected);
        }

        assert_eq!(harness.users.snapshot().len(), 1);
        assert_eq!(harness.bus.published().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_body() {
        let harness = Harness::new();
        let token = harness.token("u1", "2");

        let mut user = ann();
        user["phone"] = json!("12ab");
        user["email"] = json!("not-an-email");
        let response = make_request(
            app(harness.state.clone()),
            Method::POST,
            "/create",
            Some(&token),
            user.to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let parsed = body(response).await;
        assert!(!parsed.status);
        assert_eq!(parsed.data.unwrap()[0]["field"], "email");

        let mut user = ann();
        user["phone"] = json!("12ab");
        let response = make_request(
            app(harness.state.clone()),
            Method::POST,
            "/create",
            Some(&token),
            user.to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body(response).await.data.unwrap()[0]["field"], "phone");

        assert!(harness.users.snapshot().is_empty());
        assert!(harness.bus.published().is_empty());
    }

    #[tokio::test]
    async fn test_requires_token() {
        let harness = Harness::new();

        for token in [None, Some("garbage")] {
            let response = make_request(
                app(harness.state.clone()),
                Method::POST,
                "/create",
                token,
                ann().to_string(),
            )
            .await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
        assert!(harness.users.snapshot().is_empty());
    }
}
