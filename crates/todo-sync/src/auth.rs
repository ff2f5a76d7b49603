//! # Auth Context
//!
//! Who is acting and what they may do. Session handling lives outside the
//! engine; the coordinator only consults these answers before mutating.

use todo_core::{TodoPermission, GUEST_USER_ID};

/// Identity and permission flags of the acting user.
pub trait AuthContext: Send + Sync {
    /// Stamped on created todos.
    fn user_id(&self) -> String;

    fn can_create(&self) -> bool;
    fn can_update(&self) -> bool;
    fn can_delete(&self) -> bool;

    fn allows(&self, permission: TodoPermission) -> bool {
        match permission {
            TodoPermission::Create => self.can_create(),
            TodoPermission::Update => self.can_update(),
            TodoPermission::Delete => self.can_delete(),
        }
    }
}

/// Fixed identity and flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticAuth {
    pub user_id: String,
    pub can_create: bool,
    pub can_update: bool,
    pub can_delete: bool,
}

impl StaticAuth {
    /// A user allowed to do everything.
    pub fn user(user_id: impl Into<String>) -> Self {
        StaticAuth {
            user_id: user_id.into(),
            can_create: true,
            can_update: true,
            can_delete: true,
        }
    }

    /// A user who can look but not touch.
    pub fn read_only(user_id: impl Into<String>) -> Self {
        StaticAuth {
            can_create: false,
            can_update: false,
            can_delete: false,
            ..Self::user(user_id)
        }
    }

    pub fn guest() -> Self {
        Self::user(GUEST_USER_ID)
    }
}

impl Default for StaticAuth {
    fn default() -> Self {
        Self::guest()
    }
}

impl AuthContext for StaticAuth {
    fn user_id(&self) -> String {
        self.user_id.clone()
    }

    fn can_create(&self) -> bool {
        self.can_create
    }

    fn can_update(&self) -> bool {
        self.can_update
    }

    fn can_delete(&self) -> bool {
        self.can_delete
    }
}
