//! Middlewares for routes.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;
use axum::Extension;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::token::{ClaimsCodec, Principal, TokenError};

/// Cookie and header carrying the session token.
pub const TOKEN: &str = "token";
const BEARER: &str = "Bearer ";

/// Minimum capability an operation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement<'a> {
    Authenticated,
    Admin,
    /// The subject itself, or an admin.
    Owner(&'a str),
}

/// Verdict on a credential.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Authorized(Principal),
    Unauthenticated,
    Expired,
    Forbidden,
}

impl Decision {
    pub fn into_result(self) -> Result<Principal> {
        match self {
            Decision::Authorized(principal) => Ok(principal),
            Decision::Unauthenticated => Err(ServerError::Unauthenticated),
            Decision::Expired => Err(ServerError::Expired),
            Decision::Forbidden => Err(ServerError::Forbidden(FORBIDDEN)),
        }
    }
}

const FORBIDDEN: &str = "insufficient role for this operation";

/// Resolve credentials to principals and check them against requirements.
#[derive(Clone, Debug)]
pub struct AuthorizationGate {
    codec: ClaimsCodec,
    admin_role: String,
}

impl AuthorizationGate {
    /// Create a new [`AuthorizationGate`].
    pub fn new(codec: ClaimsCodec, admin_role: &str) -> Self {
        Self {
            codec,
            admin_role: admin_role.to_owned(),
        }
    }

    pub fn codec(&self) -> &ClaimsCodec {
        &self.codec
    }

    pub fn is_admin(&self, principal: &Principal) -> bool {
        principal.role_id == self.admin_role
    }

    /// Decide on a raw credential. Absent and malformed credentials are
    /// never reported as `Forbidden`.
    pub fn authorize(
        &self,
        credential: Option<&str>,
        requirement: Requirement<'_>,
    ) -> Decision {
        let Some(token) = credential.map(str::trim).filter(|t| !t.is_empty())
        else {
            return Decision::Unauthenticated;
        };

        match self.codec.verify(token) {
            Ok(principal) => self.check(principal, requirement),
            Err(TokenError::Expired) => Decision::Expired,
            Err(err) => {
                tracing::debug!(error = %err, "token rejected");
                Decision::Unauthenticated
            },
        }
    }

    /// Check an already resolved principal.
    pub fn check(
        &self,
        principal: Principal,
        requirement: Requirement<'_>,
    ) -> Decision {
        let allowed = match requirement {
            Requirement::Authenticated => true,
            Requirement::Admin => self.is_admin(&principal),
            Requirement::Owner(id) => {
                principal.subject_id == id || self.is_admin(&principal)
            },
        };

        if allowed {
            Decision::Authorized(principal)
        } else {
            Decision::Forbidden
        }
    }

    /// Fail with `Forbidden` unless `principal` meets `requirement`.
    pub fn require(
        &self,
        principal: &Principal,
        requirement: Requirement<'_>,
    ) -> Result<()> {
        self.check(principal.clone(), requirement)
            .into_result()
            .map(|_| ())
    }
}

/// Find the session token: `token` cookie, `token` header, then bearer.
pub fn credential(headers: &HeaderMap) -> Option<String> {
    let cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == TOKEN)
        .map(|(_, value)| value.to_owned());

    cookie
        .or_else(|| {
            headers
                .get(TOKEN)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned)
        })
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix(BEARER))
                .map(str::to_owned)
        })
}

/// Custom middleware for authentification.
///
/// Attaches the [`Principal`] to the request.
pub async fn authenticated(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let principal = state
        .gate
        .authorize(credential(req.headers()).as_deref(), Requirement::Authenticated)
        .into_result()?;

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

/// Only let administrators through. Runs after [`authenticated`].
pub async fn administrator(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    req: Request,
    next: Next,
) -> Result<Response> {
    let subject = principal.subject_id.clone();
    if let Err(err) = state.gate.check(principal, Requirement::Admin).into_result() {
        tracing::info!(%subject, "admin operation refused");
        return Err(err);
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::HeaderValue;

    use super::*;
    use crate::clock::FixedClock;
    use crate::token::UserClaims;

    fn gate() -> (AuthorizationGate, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(1_760_000_000));
        let codec = ClaimsCodec::new(b"secret", 1, clock.clone()).unwrap();
        (AuthorizationGate::new(codec, "1"), clock)
    }

    fn token(gate: &AuthorizationGate, id: &str, role_id: &str) -> String {
        gate.codec()
            .issue(
                "roster",
                UserClaims {
                    id: id.into(),
                    username: id.into(),
                    role_id: role_id.into(),
                },
            )
            .unwrap()
    }

    #[test]
    fn test_bad_credentials_are_unauthenticated() {
        let (gate, _) = gate();

        for credential in [None, Some(""), Some("  "), Some("x.y.z"), Some("nope")]
        {
            for requirement in
                [Requirement::Authenticated, Requirement::Admin, Requirement::Owner("u1")]
            {
                assert_eq!(
                    gate.authorize(credential, requirement),
                    Decision::Unauthenticated
                );
            }
        }
    }

    #[test]
    fn test_roles() {
        let (gate, _) = gate();
        let member = token(&gate, "u1", "2");
        let admin = token(&gate, "root", "1");

        assert!(matches!(
            gate.authorize(Some(&member), Requirement::Authenticated),
            Decision::Authorized(p) if p.subject_id == "u1"
        ));
        assert_eq!(
            gate.authorize(Some(&member), Requirement::Admin),
            Decision::Forbidden
        );
        assert!(matches!(
            gate.authorize(Some(&member), Requirement::Owner("u1")),
            Decision::Authorized(_)
        ));
        assert_eq!(
            gate.authorize(Some(&member), Requirement::Owner("u2")),
            Decision::Forbidden
        );
        assert!(matches!(
            gate.authorize(Some(&admin), Requirement::Owner("u2")),
            Decision::Authorized(_)
        ));
    }

    #[test]
    fn test_check_resolved_principal() {
        let (gate, _) = gate();
        let principal = |role_id: &str| Principal {
            subject_id: "u1".into(),
            username: "u1".into(),
            role_id: role_id.into(),
            issuer: "roster".into(),
            expires_at: 0,
        };

        assert!(matches!(
            gate.check(principal("2"), Requirement::Admin).into_result(),
            Err(ServerError::Forbidden(_))
        ));
        assert!(gate.check(principal("1"), Requirement::Admin).into_result().is_ok());
        assert!(gate.require(&principal("2"), Requirement::Owner("u1")).is_ok());
    }

    #[test]
    fn test_expired() {
        let (gate, clock) = gate();
        let member = token(&gate, "u1", "2");

        clock.advance(3601);
        assert_eq!(
            gate.authorize(Some(&member), Requirement::Admin),
            Decision::Expired
        );
    }

    #[test]
    fn test_credential_sources() {
        let mut headers = HeaderMap::new();
        assert_eq!(credential(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(credential(&headers).as_deref(), Some("abc"));

        headers.insert(TOKEN, HeaderValue::from_static("def"));
        assert_eq!(credential(&headers).as_deref(), Some("def"));

        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; token=ghi"),
        );
        assert_eq!(credential(&headers).as_deref(), Some("ghi"));
    }
}
