//! Connection access gate
//!
//! Verifies connection-time credentials and assigns a role before the
//! transport upgrade completes. Presenters must present a signed token with
//! an explicit `presenter` role claim; participants may connect with a named
//! token or fully anonymously, in which case an identity is minted from the
//! connection id. The gate never touches the session registry.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::SyncError;

pub mod names;

pub use names::generate_display_name;

/// Token claims for named connections
///
/// Issuance happens elsewhere; this server only verifies.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Principal id
    pub sub: String,
    /// `presenter` or `participant`
    pub role: String,
    /// Optional display name for named participants
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub iat: u64,
    pub exp: u64,
}

/// Role requested by the connecting client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedRole {
    Presenter,
    Participant,
}

/// Identity attached to a connection for its lifetime
#[derive(Debug, Clone)]
pub enum ConnectionIdentity {
    Presenter { principal_id: String },
    Participant {
        participant_id: String,
        display_name: String,
        is_anonymous: bool,
    },
}

impl ConnectionIdentity {
    pub fn is_presenter(&self) -> bool {
        matches!(self, ConnectionIdentity::Presenter { .. })
    }
}

pub struct AccessGate {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl AccessGate {
    pub fn new(token_secret: &str, clock_skew_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = clock_skew_secs;

        Self {
            decoding_key: DecodingKey::from_secret(token_secret.as_bytes()),
            validation,
        }
    }

    /// Authenticate a connection and assign its role
    ///
    /// Anonymous participants never fail here: a missing token simply mints
    /// a fresh identity derived from the connection id.
    pub fn authenticate(
        &self,
        token: Option<&str>,
        requested_role: RequestedRole,
        connection_id: Uuid,
    ) -> Result<ConnectionIdentity, SyncError> {
        match requested_role {
            RequestedRole::Presenter => {
                let token = token.ok_or(SyncError::Unauthenticated)?;
                let claims = self.verify(token)?;
                if claims.role != "presenter" {
                    debug!(
                        "Principal {} requested presenter with role claim '{}'",
                        claims.sub, claims.role
                    );
                    return Err(SyncError::Forbidden);
                }
                Ok(ConnectionIdentity::Presenter {
                    principal_id: claims.sub,
                })
            }
            RequestedRole::Participant => match token {
                Some(token) => {
                    let claims = self.verify(token)?;
                    let display_name = claims.name.unwrap_or_else(|| claims.sub.clone());
                    Ok(ConnectionIdentity::Participant {
                        participant_id: claims.sub,
                        display_name,
                        is_anonymous: false,
                    })
                }
                None => Ok(anonymous_identity(connection_id)),
            },
        }
    }

    fn verify(&self, token: &str) -> Result<Claims, SyncError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            debug!("Token verification failed: {}", e);
            SyncError::Unauthenticated
        })?;
        Ok(data.claims)
    }
}

/// Mint an anonymous participant identity
///
/// The identity is deterministic per connection (so a retry on the same
/// connection yields the same id); the display name is random.
fn anonymous_identity(connection_id: Uuid) -> ConnectionIdentity {
    let participant_id = format!("anon-{}", &connection_id.simple().to_string()[..8]);
    ConnectionIdentity::Participant {
        participant_id,
        display_name: generate_display_name(),
        is_anonymous: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::state::now_millis;
    use jsonwebtoken::{EncodingKey, Header, encode};

    const SECRET: &str = "test-secret";

    fn make_token(secret: &str, role: &str, sub: &str) -> String {
        let now = now_millis() / 1000;
        let claims = Claims {
            sub: sub.to_string(),
            role: role.to_string(),
            name: None,
            iat: now,
            exp: now + 3600,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn gate() -> AccessGate {
        AccessGate::new(SECRET, 30)
    }

    #[test]
    fn test_presenter_with_valid_token() {
        let token = make_token(SECRET, "presenter", "p1");
        let identity = gate()
            .authenticate(Some(&token), RequestedRole::Presenter, Uuid::new_v4())
            .unwrap();
        match identity {
            ConnectionIdentity::Presenter { principal_id } => assert_eq!(principal_id, "p1"),
            other => panic!("expected presenter, got {:?}", other),
        }
    }

    #[test]
    fn test_presenter_without_token_is_unauthenticated() {
        let result = gate().authenticate(None, RequestedRole::Presenter, Uuid::new_v4());
        assert!(matches!(result, Err(SyncError::Unauthenticated)));
    }

    #[test]
    fn test_presenter_with_forged_token_is_unauthenticated() {
        let token = make_token("wrong-secret", "presenter", "p1");
        let result = gate().authenticate(Some(&token), RequestedRole::Presenter, Uuid::new_v4());
        assert!(matches!(result, Err(SyncError::Unauthenticated)));
    }

    #[test]
    fn test_participant_claim_requesting_presenter_is_forbidden() {
        let token = make_token(SECRET, "participant", "u1");
        let result = gate().authenticate(Some(&token), RequestedRole::Presenter, Uuid::new_v4());
        assert!(matches!(result, Err(SyncError::Forbidden)));
    }

    #[test]
    fn test_anonymous_participant_never_fails() {
        let conn = Uuid::new_v4();
        let identity = gate()
            .authenticate(None, RequestedRole::Participant, conn)
            .unwrap();
        match identity {
            ConnectionIdentity::Participant {
                participant_id,
                display_name,
                is_anonymous,
            } => {
                assert!(is_anonymous);
                assert!(participant_id.starts_with("anon-"));
                assert!(!display_name.is_empty());
            }
            other => panic!("expected participant, got {:?}", other),
        }
    }

    #[test]
    fn test_anonymous_id_is_deterministic_per_connection() {
        let conn = Uuid::new_v4();
        let a = anonymous_identity(conn);
        let b = anonymous_identity(conn);
        let (
            ConnectionIdentity::Participant {
                participant_id: id_a,
                ..
            },
            ConnectionIdentity::Participant {
                participant_id: id_b,
                ..
            },
        ) = (a, b)
        else {
            panic!("expected participants");
        };
        assert_eq!(id_a, id_b);
    }

    #[test]
    fn test_named_participant_uses_token_subject() {
        let token = make_token(SECRET, "participant", "u42");
        let identity = gate()
            .authenticate(Some(&token), RequestedRole::Participant, Uuid::new_v4())
            .unwrap();
        match identity {
            ConnectionIdentity::Participant {
                participant_id,
                display_name,
                is_anonymous,
            } => {
                assert_eq!(participant_id, "u42");
                assert_eq!(display_name, "u42");
                assert!(!is_anonymous);
            }
            other => panic!("expected participant, got {:?}", other),
        }
    }
}
