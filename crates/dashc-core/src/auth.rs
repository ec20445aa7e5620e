//! Role-based access for the authoring surface
//!
//! Identity arrives as headers set by an authenticating proxy. Roles decide
//! whether the editor is writable; the compile pipeline never consults them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Consumer,
    Author,
    Admin,
}

impl Role {
    pub fn parse(text: &str) -> Option<Role> {
        match text.trim().to_ascii_lowercase().as_str() {
            "consumer" => Some(Role::Consumer),
            "author" => Some(Role::Author),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Permissions this role grants on its own
    pub fn permissions(self) -> &'static [Permission] {
        match self {
            Role::Consumer => &[Permission::ViewDashboard],
            Role::Author => &[Permission::ViewDashboard, Permission::EditDashboard],
            Role::Admin => &[
                Permission::ViewDashboard,
                Permission::EditDashboard,
                Permission::ManageDashboards,
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewDashboard,
    EditDashboard,
    ManageDashboards,
}

/// Authenticated user as seen by the host
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserContext {
    pub email: Option<String>,
    pub name: Option<String>,
    pub roles: BTreeSet<Role>,
    pub groups: Vec<String>,
    pub permissions: BTreeSet<Permission>,
}

impl UserContext {
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        let roles: BTreeSet<Role> = roles.into_iter().collect();
        let permissions = roles
            .iter()
            .flat_map(|role| role.permissions().iter().copied())
            .collect();
        UserContext {
            roles,
            permissions,
            ..UserContext::default()
        }
    }

    /// Build from proxy headers, matching header names case-insensitively
    ///
    /// Reads `X-User-Email`, `X-User-Name`, and the comma-separated
    /// `X-User-Roles` and `X-User-Groups`. Unrecognized roles are ignored;
    /// a user with no recognized role has no permissions.
    pub fn from_headers<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut email = None;
        let mut name = None;
        let mut roles = Vec::new();
        let mut groups = Vec::new();

        for (key, value) in headers {
            match key.to_ascii_lowercase().as_str() {
                "x-user-email" => email = non_empty(value),
                "x-user-name" => name = non_empty(value),
                "x-user-roles" => {
                    for role in split_list(value) {
                        match Role::parse(role) {
                            Some(role) => roles.push(role),
                            None => tracing::warn!(role, "ignoring unknown role"),
                        }
                    }
                }
                "x-user-groups" => groups.extend(split_list(value).map(str::to_string)),
                _ => {}
            }
        }

        UserContext {
            email,
            name,
            groups,
            ..UserContext::new(roles)
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    pub fn can_view(&self) -> bool {
        self.has_permission(Permission::ViewDashboard)
    }

    pub fn can_edit(&self) -> bool {
        self.has_permission(Permission::EditDashboard)
    }

    pub fn can_manage(&self) -> bool {
        self.has_permission(Permission::ManageDashboards)
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_headers() {
        let user = UserContext::from_headers([
            ("X-User-Email", "ana@example.com"),
            ("x-user-name", "Ana"),
            ("X-User-Roles", "author, consumer"),
            ("X-User-Groups", "team-a,team-b"),
        ]);
        assert_eq!(user.email.as_deref(), Some("ana@example.com"));
        assert_eq!(user.name.as_deref(), Some("Ana"));
        assert_eq!(user.groups, vec!["team-a", "team-b"]);
        assert!(user.can_view());
        assert!(user.can_edit());
        assert!(!user.can_manage());
    }

    #[test]
    fn test_consumer_is_read_only() {
        let user = UserContext::new([Role::Consumer]);
        assert!(user.can_view());
        assert!(!user.can_edit());
    }

    #[test]
    fn test_admin_has_everything() {
        let user = UserContext::new([Role::Admin]);
        assert_eq!(user.permissions.len(), 3);
    }

    #[test]
    fn test_no_roles_grants_nothing() {
        let user = UserContext::from_headers([("X-User-Email", "x@example.com"), ("X-User-Roles", "owner,")]);
        assert!(user.roles.is_empty());
        assert!(!user.can_view());
        assert!(!user.can_edit());
    }

    #[test]
    fn test_serialized_names() {
        let user = UserContext::new([Role::Author]);
        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(value["roles"], serde_json::json!(["author"]));
        assert_eq!(value["permissions"], serde_json::json!(["view_dashboard", "edit_dashboard"]));
    }
}
