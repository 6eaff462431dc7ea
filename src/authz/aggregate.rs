use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::rbac::PermissionRow;
use crate::store::DirectoryStore;

use super::CapabilitySet;

/// One consolidated stance on a permission name after merging every
/// contributing role's row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedPermission {
    pub permission: String,
    #[serde(flatten)]
    pub capabilities: CapabilitySet,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregatedPermissions {
    pub roles: Vec<String>,
    pub permissions: Vec<MergedPermission>,
}

/// Fold permission rows, already in role-iteration order, into at most one
/// entry per permission name, preserving discovery order.
///
/// A later row only adds asserted flags to an existing entry; flags it does
/// not address stay as accumulated. No row can revoke what another role
/// granted.
pub fn merge_rows<'a, I>(rows: I) -> Vec<MergedPermission>
where
    I: IntoIterator<Item = &'a PermissionRow>,
{
    let mut merged: Vec<MergedPermission> = Vec::new();
    for row in rows {
        match merged.iter_mut().find(|entry| entry.permission == row.permission) {
            Some(entry) => entry.capabilities.merge(&row.capabilities),
            None => merged.push(MergedPermission {
                permission: row.permission.clone(),
                capabilities: row.capabilities.clone(),
            }),
        }
    }
    merged
}

/// Turn a subject's role set into one consolidated permission view.
///
/// A subject with no roles resolves to empty lists, not an error. Role
/// order is whatever the store returns, which is stable within a single
/// resolution (assignment creation order).
pub async fn aggregate_for_user(
    directory: &dyn DirectoryStore,
    user_id: Uuid,
) -> AppResult<AggregatedPermissions> {
    let roles = directory.roles_for_user(user_id).await?;

    let mut role_names = Vec::with_capacity(roles.len());
    let mut rows = Vec::new();
    for role in &roles {
        rows.extend(directory.permission_rows_for_role(role.id).await?);
        role_names.push(role.name.clone());
    }

    Ok(AggregatedPermissions {
        roles: role_names,
        permissions: merge_rows(&rows),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::{permissions, Capability};
    use crate::utils::utc_now;

    fn row(role_id: Uuid, permission: &str, capabilities: &[Capability]) -> PermissionRow {
        let now = utc_now();
        PermissionRow {
            id: Uuid::new_v4(),
            role_id,
            permission: permission.to_string(),
            capabilities: CapabilitySet::of(capabilities),
            created_by: "test".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn merging_two_roles_unions_their_flags() {
        let reader = row(
            Uuid::new_v4(),
            permissions::EMPLOYEE_MANAGEMENT,
            &[Capability::CanRead],
        );
        let editor = row(
            Uuid::new_v4(),
            permissions::EMPLOYEE_MANAGEMENT,
            &[Capability::CanUpdate],
        );

        let merged = merge_rows([&reader, &editor]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].permission, permissions::EMPLOYEE_MANAGEMENT);
        assert!(merged[0].capabilities.contains(Capability::CanRead));
        assert!(merged[0].capabilities.contains(Capability::CanUpdate));
    }

    #[test]
    fn no_role_can_revoke_a_granted_flag() {
        let full = row(
            Uuid::new_v4(),
            permissions::LEAVE_MANAGEMENT,
            &[Capability::CanRead, Capability::CanApprove],
        );
        // Later role asserts nothing for this name; the accumulator keeps
        // everything already granted.
        let silent = row(Uuid::new_v4(), permissions::LEAVE_MANAGEMENT, &[]);

        let merged = merge_rows([&full, &silent]);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].capabilities.contains(Capability::CanApprove));
        assert!(merged[0].capabilities.contains(Capability::CanRead));
    }

    #[test]
    fn discovery_order_is_preserved_across_names() {
        let role_a = Uuid::new_v4();
        let role_b = Uuid::new_v4();
        let rows = [
            row(role_a, permissions::LEAVE_MANAGEMENT, &[Capability::CanRead]),
            row(role_a, permissions::EMPLOYEE_MANAGEMENT, &[Capability::CanRead]),
            row(role_b, permissions::PAYROLL_MANAGEMENT, &[Capability::CanExport]),
            row(role_b, permissions::LEAVE_MANAGEMENT, &[Capability::CanApprove]),
        ];

        let merged = merge_rows(&rows);
        let names: Vec<&str> = merged.iter().map(|entry| entry.permission.as_str()).collect();
        assert_eq!(
            names,
            vec![
                permissions::LEAVE_MANAGEMENT,
                permissions::EMPLOYEE_MANAGEMENT,
                permissions::PAYROLL_MANAGEMENT,
            ]
        );
        assert!(merged[0].capabilities.contains(Capability::CanApprove));
    }

    #[test]
    fn no_rows_means_empty_view() {
        let rows: Vec<PermissionRow> = Vec::new();
        assert!(merge_rows(&rows).is_empty());
    }
}
