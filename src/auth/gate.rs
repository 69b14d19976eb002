//! Admission gate for subscriber connections
//!
//! The gate is stateless: it reads the request headers, resolves the
//! principal, checks its capability, and returns an identity. Registering the
//! connection is left to the caller, so a rejected request can never leave a
//! trace in the registry.

use std::sync::Arc;

use axum::http::{header, HeaderMap};
use tracing::debug;

use super::{has_permission, Permission, SessionAuth};
use crate::error::AdmissionError;
use crate::store::UserStore;
use crate::types::{AuthorizedIdentity, User};

/// Find the session credential: the named cookie first, then a bearer header
pub fn extract_credential<'a>(headers: &'a HeaderMap, cookie_name: &str) -> Option<&'a str> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value);

    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
    })
}

/// True unless a browser `Origin` header names a host other than `Host`.
///
/// Non-browser clients send no `Origin` and pass.
pub fn is_same_origin(headers: &HeaderMap) -> bool {
    let Some(origin) = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) else {
        return true;
    };
    let Some(host) = headers.get(header::HOST).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let origin_host = origin.split_once("://").map_or(origin, |(_, rest)| rest);
    origin_host.trim_end_matches('/').eq_ignore_ascii_case(host)
}

/// Decides whether a request may join the change stream
#[derive(Clone)]
pub struct ConnectionGate {
    auth: Arc<SessionAuth>,
    users: Arc<UserStore>,
    cookie_name: String,
    required: Permission,
}

impl ConnectionGate {
    pub fn new(auth: Arc<SessionAuth>, users: Arc<UserStore>, cookie_name: impl Into<String>) -> Self {
        Self {
            auth,
            users,
            cookie_name: cookie_name.into(),
            required: Permission::READ_STREAM,
        }
    }

    /// Require a stronger capability than `orders.read` for admission
    pub fn with_required_permission(mut self, permission: Permission) -> Self {
        self.required = permission;
        self
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Resolve the request's credential to a stored user
    pub async fn resolve(&self, headers: &HeaderMap) -> Result<User, AdmissionError> {
        let token =
            extract_credential(headers, &self.cookie_name).ok_or(AdmissionError::NoCredential)?;

        let claims = self.auth.validate_token(token).map_err(|e| {
            debug!(error = %e, "credential failed verification");
            AdmissionError::NoCredential
        })?;

        self.users
            .get_user(&claims.sub)
            .await
            .ok_or(AdmissionError::UnknownPrincipal)
    }

    /// Resolve the principal and require `permission` of its current role
    pub async fn authorize(
        &self,
        headers: &HeaderMap,
        permission: Permission,
    ) -> Result<User, AdmissionError> {
        let user = self.resolve(headers).await?;
        if !has_permission(user.role, permission) {
            debug!(user = %user.username, role = %user.role, %permission, "permission denied");
            return Err(AdmissionError::InsufficientCapability);
        }
        Ok(user)
    }

    /// Admission decision for a `/ws` upgrade
    pub async fn admit(&self, headers: &HeaderMap) -> Result<AuthorizedIdentity, AdmissionError> {
        let user = self.authorize(headers, self.required).await?;
        Ok(AuthorizedIdentity::from(&user))
    }
}
