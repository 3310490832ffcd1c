use jsonwebtoken::{decode, DecodingKey, Validation};
use quiz_types::Role;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::Error;

/// Claims carried by the JWT presented at `GET /ws?token=...`. The core only
/// verifies these; it never issues tokens (that's an external collaborator).
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "userName")]
    pub user_name: String,
    #[serde(rename = "userType")]
    pub user_type: UserType,
    /// Standard JWT expiry claim; required by `jsonwebtoken`'s default
    /// validation so an expired token fails signature verification.
    #[allow(dead_code)]
    #[serde(default)]
    exp: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Admin,
    Participant,
}

impl From<UserType> for Role {
    fn from(value: UserType) -> Self {
        match value {
            UserType::Admin => Role::Admin,
            UserType::Participant => Role::Participant,
        }
    }
}

/// Verifies a token's signature and expiry and extracts its claims. Any
/// failure — bad signature, expired, missing claim, malformed `userType` —
/// is an `auth` error; the caller refuses the upgrade rather than upgrading
/// then closing.
pub fn verify_token(secret: &SecretString, token: &str) -> Result<Claims, Error> {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.expose_secret().as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| Error::Auth(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct RawClaims<'a> {
        #[serde(rename = "sessionId")]
        session_id: &'a str,
        #[serde(rename = "userId")]
        user_id: &'a str,
        #[serde(rename = "userName")]
        user_name: &'a str,
        #[serde(rename = "userType")]
        user_type: &'a str,
        exp: i64,
    }

    fn token(secret: &str, user_type: &str, exp: i64) -> String {
        let claims = RawClaims {
            session_id: "s1",
            user_id: "u1",
            user_name: "Alice",
            user_type,
            exp,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn accepts_valid_token() {
        let future = chrono::Utc::now().timestamp() + 3600;
        let t = token("secret", "participant", future);
        let secret = SecretString::new("secret".to_string().into_boxed_str());
        let claims = verify_token(&secret, &t).unwrap();
        assert_eq!(claims.session_id, "s1");
        assert_eq!(claims.user_type, UserType::Participant);
    }

    #[test]
    fn rejects_wrong_secret() {
        let future = chrono::Utc::now().timestamp() + 3600;
        let t = token("secret", "admin", future);
        let wrong = SecretString::new("other-secret".to_string().into_boxed_str());
        assert!(verify_token(&wrong, &t).is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let past = chrono::Utc::now().timestamp() - 10;
        let t = token("secret", "admin", past);
        let secret = SecretString::new("secret".to_string().into_boxed_str());
        assert!(verify_token(&secret, &t).is_err());
    }
}
