//! Identity store

use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::{Role, User};

/// In-memory user table keyed by user id
pub struct UserStore {
    users: RwLock<HashMap<String, User>>,
}

impl UserStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a user with an already-hashed password
    pub async fn add_user(
        &self,
        username: &str,
        password_hash: String,
        role: Role,
    ) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.username == username) {
            return Err(StoreError::Conflict(format!(
                "username '{}' already exists",
                username
            )));
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash,
            role,
        };
        users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    pub async fn get_user(&self, id: &str) -> Option<User> {
        self.users.read().await.get(id).cloned()
    }

    pub async fn find_by_username(&self, username: &str) -> Option<User> {
        self.users
            .read()
            .await
            .values()
            .find(|u| u.username == username)
            .cloned()
    }

    /// All users, sorted by username
    pub async fn list_users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        users
    }

    /// Change a user's role; takes effect at their next admission
    pub async fn update_role(&self, id: &str, role: Role) -> Option<User> {
        let mut users = self.users.write().await;
        let user = users.get_mut(id)?;
        user.role = role;
        Some(user.clone())
    }

    pub async fn remove_user(&self, id: &str) -> bool {
        self.users.write().await.remove(id).is_some()
    }

    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }
}

impl Default for UserStore {
    fn default() -> Self {
        Self::new()
    }
}
