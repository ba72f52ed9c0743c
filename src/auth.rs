//! Role checks. Roles are a flat admin/marketing split; every permission is a
//! plain predicate over the caller's role.

use uuid::Uuid;

use crate::error::{CrmError, CrmResult};
use crate::models::{Role, UserProfile};

pub fn can_edit_customer(role: Option<Role>) -> bool {
    role == Some(Role::Admin)
}

pub fn can_manage_users(role: Option<Role>) -> bool {
    role == Some(Role::Admin)
}

pub fn can_delete_activity(role: Option<Role>) -> bool {
    role == Some(Role::Admin)
}

pub fn can_log_activity(role: Option<Role>) -> bool {
    matches!(role, Some(Role::Admin) | Some(Role::Marketing))
}

/// The signed-in user on whose behalf a write runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
    pub is_active: bool,
}

impl From<&UserProfile> for Actor {
    fn from(profile: &UserProfile) -> Self {
        Self {
            user_id: profile.id,
            role: profile.role,
            is_active: profile.is_active,
        }
    }
}

impl Actor {
    pub fn require_active(&self) -> CrmResult<()> {
        if self.is_active {
            Ok(())
        } else {
            Err(CrmError::Forbidden(format!("user {} is deactivated", self.user_id)))
        }
    }

    pub fn require_admin(&self) -> CrmResult<()> {
        self.require_active()?;
        if can_manage_users(Some(self.role)) {
            Ok(())
        } else {
            Err(CrmError::Forbidden("admin role required".to_string()))
        }
    }

    pub fn require(&self, allowed: fn(Option<Role>) -> bool, action: &str) -> CrmResult<()> {
        self.require_active()?;
        if allowed(Some(self.role)) {
            Ok(())
        } else {
            Err(CrmError::Forbidden(format!(
                "role {} may not {action}",
                self.role
            )))
        }
    }
}

/// Admins may not edit or delete their own account.
pub fn ensure_not_self(actor: &Actor, target: Uuid, action: &'static str) -> CrmResult<()> {
    if actor.user_id == target {
        return Err(CrmError::SelfModification(action));
    }
    Ok(())
}
