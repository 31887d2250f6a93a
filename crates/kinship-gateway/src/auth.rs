use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::warn;

use kinship_types::api::Claims;

use crate::error::ChatError;

/// Validate an access token (signature and expiry).
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, ChatError> {
    let token = token.strip_prefix("Bearer ").unwrap_or(token);
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        warn!("rejected gateway token: {}", e);
        ChatError::Unauthenticated
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use uuid::Uuid;

    fn token(secret: &str, exp: i64) -> String {
        let claims = Claims {
            sub: Uuid::new_v4(),
            username: "lina".into(),
            exp: exp as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn in_an_hour() -> i64 {
        (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp()
    }

    #[test]
    fn accepts_valid_token_with_or_without_scheme() {
        let raw = token("s3cret", in_an_hour());
        assert_eq!(verify_token("s3cret", &raw).unwrap().username, "lina");
        assert!(verify_token("s3cret", &format!("Bearer {}", raw)).is_ok());
    }

    #[test]
    fn rejects_wrong_secret_and_expired_tokens() {
        let raw = token("s3cret", in_an_hour());
        assert!(matches!(
            verify_token("other", &raw),
            Err(ChatError::Unauthenticated)
        ));

        let expired = token("s3cret", (chrono::Utc::now() - chrono::Duration::hours(2)).timestamp());
        assert!(matches!(
            verify_token("s3cret", &expired),
            Err(ChatError::Unauthenticated)
        ));
        assert!(verify_token("s3cret", "garbage").is_err());
    }
}
