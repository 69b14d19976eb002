//! Authentication and authorization
//!
//! - `session`: issues and verifies the session credential (JWT) and checks
//!   passwords with bcrypt
//! - `gate`: the admission decision for `/ws` upgrades, also reused by the
//!   REST handlers for per-route permission checks
//!
//! Permissions are derived from the principal's role on every check; nothing
//! role-related is stored inside the credential.

mod gate;
mod session;

pub use gate::{extract_credential, is_same_origin, ConnectionGate};
pub use session::{Claims, SessionAuth, SessionToken, MIN_SECRET_LEN};

use crate::types::Role;

/// Actions a role may be granted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    OrdersCreate,
    OrdersRead,
    OrdersUpdate,
    OrdersDelete,
    UsersRead,
    UsersUpdate,
    UsersDelete,
    AdminDashboard,
    SystemMonitor,
}

impl Permission {
    /// Minimum capability needed to join the change stream
    pub const READ_STREAM: Permission = Permission::OrdersRead;

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::OrdersCreate => "orders.create",
            Permission::OrdersRead => "orders.read",
            Permission::OrdersUpdate => "orders.update",
            Permission::OrdersDelete => "orders.delete",
            Permission::UsersRead => "users.read",
            Permission::UsersUpdate => "users.update",
            Permission::UsersDelete => "users.delete",
            Permission::AdminDashboard => "admin.dashboard",
            Permission::SystemMonitor => "system.monitor",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const ADMIN_PERMISSIONS: &[Permission] = &[
    Permission::OrdersCreate,
    Permission::OrdersRead,
    Permission::OrdersUpdate,
    Permission::OrdersDelete,
    Permission::UsersRead,
    Permission::UsersUpdate,
    Permission::UsersDelete,
    Permission::AdminDashboard,
    Permission::SystemMonitor,
];

const OPERATOR_PERMISSIONS: &[Permission] = &[
    Permission::OrdersCreate,
    Permission::OrdersRead,
    Permission::OrdersUpdate,
    Permission::OrdersDelete,
];

const VIEWER_PERMISSIONS: &[Permission] = &[Permission::OrdersRead];

/// Permissions granted to a role
pub fn role_permissions(role: Role) -> &'static [Permission] {
    match role {
        Role::Admin => ADMIN_PERMISSIONS,
        Role::Operator => OPERATOR_PERMISSIONS,
        Role::Viewer => VIEWER_PERMISSIONS,
    }
}

pub fn has_permission(role: Role, permission: Permission) -> bool {
    role_permissions(role).contains(&permission)
}
