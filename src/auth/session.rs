//! Session credentials
//!
//! A session credential is an HS256 JWT whose subject is the user id. It is
//! obtained over HTTP at `/auth/login` and then presented on the `/ws`
//! upgrade as a cookie or bearer header, never inside the socket.

use bcrypt::{hash, verify};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;
use crate::store::UserStore;
use crate::types::User;

/// Minimum length of a signing secret
pub const MIN_SECRET_LEN: usize = 32;

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    pub fn new(user_id: String, ttl_seconds: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user_id,
            iat: now,
            exp: now.saturating_add(ttl_seconds),
        }
    }

    pub fn is_expired(&self) -> bool {
        chrono::Utc::now().timestamp() > self.exp
    }
}

/// Token returned by a successful login
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    pub token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Issues and verifies session credentials
pub struct SessionAuth {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    /// Credential lifetime in seconds (default: 1 day)
    pub token_ttl: i64,
    bcrypt_cost: u32,
}

impl SessionAuth {
    /// Create from a signing secret of at least [`MIN_SECRET_LEN`] characters
    pub fn new(secret: &str) -> Result<Self, AuthError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(AuthError::InvalidSecret(format!(
                "secret must be at least {} characters",
                MIN_SECRET_LEN
            )));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            token_ttl: 86_400,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        })
    }

    /// Create with a random per-process secret; credentials die with the process
    pub fn ephemeral() -> Self {
        let secret = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            token_ttl: 86_400,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }

    pub fn with_token_ttl(mut self, seconds: i64) -> Self {
        self.token_ttl = seconds;
        self
    }

    /// Lower the bcrypt work factor (tests use the minimum, 4)
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    pub fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        hash(password, self.bcrypt_cost).map_err(|e| AuthError::Hash(e.to_string()))
    }

    /// Hash on the blocking pool so bcrypt never stalls a runtime worker
    pub async fn hash_password_async(&self, password: &str) -> Result<String, AuthError> {
        let password = password.to_string();
        let cost = self.bcrypt_cost;
        tokio::task::spawn_blocking(move || hash(password, cost))
            .await
            .map_err(|e| AuthError::Hash(e.to_string()))?
            .map_err(|e| AuthError::Hash(e.to_string()))
    }

    /// Check a username/password pair against the user store
    pub async fn authenticate(
        &self,
        users: &UserStore,
        username: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        let user = users
            .find_by_username(username)
            .await
            .ok_or(AuthError::InvalidCredentials)?;

        let password = password.to_string();
        let password_hash = user.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || verify(password, &password_hash))
            .await
            .map_err(|e| AuthError::Hash(e.to_string()))?
            .unwrap_or(false);

        if matches {
            Ok(user)
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }

    pub fn issue_token(&self, user: &User) -> Result<SessionToken, AuthError> {
        let claims = Claims::new(user.id.clone(), self.token_ttl);
        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Token(e.to_string()))?;

        Ok(SessionToken {
            token,
            token_type: "Bearer".to_string(),
            expires_in: self.token_ttl,
        })
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let token_data: TokenData<Claims> =
            decode(token, &self.decoding_key, &Validation::default())
                .map_err(|e| AuthError::Token(e.to_string()))?;

        if token_data.claims.is_expired() {
            return Err(AuthError::Token("token has expired".to_string()));
        }

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    const SECRET: &str = "test-secret-key-that-is-at-least-32-characters-long";

    fn test_auth() -> SessionAuth {
        SessionAuth::new(SECRET).unwrap().with_bcrypt_cost(4)
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(matches!(
            SessionAuth::new("short"),
            Err(AuthError::InvalidSecret(_))
        ));
    }

    #[tokio::test]
    async fn test_authenticate_and_round_trip_token() {
        let auth = test_auth();
        let users = UserStore::new();
        let hash = auth.hash_password("password123").unwrap();
        let alice = users.add_user("alice", hash, Role::Viewer).await.unwrap();

        let user = auth.authenticate(&users, "alice", "password123").await.unwrap();
        let token = auth.issue_token(&user).unwrap();
        let claims = auth.validate_token(&token.token).unwrap();

        assert_eq!(claims.sub, alice.id);
        assert_eq!(token.token_type, "Bearer");
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user() {
        let auth = test_auth();
        let users = UserStore::new();
        let hash = auth.hash_password("right").unwrap();
        users.add_user("alice", hash, Role::Viewer).await.unwrap();

        assert!(matches!(
            auth.authenticate(&users, "alice", "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.authenticate(&users, "nobody", "right").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let user = User {
            id: "u1".to_string(),
            username: "alice".to_string(),
            password_hash: String::new(),
            role: Role::Viewer,
        };
        let token = SessionAuth::ephemeral().issue_token(&user).unwrap();
        assert!(test_auth().validate_token(&token.token).is_err());
    }

    #[tokio::test]
    async fn test_hash_password_async_verifies() {
        let auth = test_auth();
        let hash = auth.hash_password_async("hunter2").await.unwrap();

        assert!(verify("hunter2", &hash).unwrap());
        assert!(!verify("hunter3", &hash).unwrap());
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let claims = Claims::new("u1".to_string(), i64::MAX);
        assert_eq!(claims.exp, i64::MAX);
        assert!(!claims.is_expired());
    }

    #[test]
    fn test_expired_token_rejected() {
        let auth = test_auth().with_token_ttl(-3600);
        let user = User {
            id: "u1".to_string(),
            username: "alice".to_string(),
            password_hash: String::new(),
            role: Role::Viewer,
        };
        let token = auth.issue_token(&user).unwrap();
        assert!(auth.validate_token(&token.token).is_err());
    }
}
