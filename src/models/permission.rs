// Permission grant rows. Direct and group grants are jsonb flag maps whose
// keys normalize to `{resource}:{action}` strings at read time; an explicit
// `false` flag masks the same grant from any role.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{group_permissions, knowledge_access_logs, role_permissions, user_permissions};

/// Direct per-user permission flags
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = user_permissions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserPermissionRow {
    pub user_id: Uuid,
    pub flags: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// Per-group permission flags
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = group_permissions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct GroupPermissionRow {
    pub group_id: Uuid,
    pub flags: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// A single role -> permission grant from the configured table
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = role_permissions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RolePermissionRow {
    pub id: Uuid,
    pub role: String,
    pub permission: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = knowledge_access_logs)]
pub struct NewAccessLog {
    pub user_id: Uuid,
    pub resource_type: String,
    pub resource_id: String,
    pub action: String,
    pub granted: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum PermissionStoreError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),
}

/// Normalize a flag key to its permission string by splitting on the last
/// underscore: `knowledge_read` -> `knowledge:read`,
/// `mental_health_read` -> `mental_health:read`. Keys without an underscore
/// pass through (notably the `admin` wildcard).
pub fn flag_to_permission(flag: &str) -> String {
    match flag.rsplit_once('_') {
        Some((resource, action)) => format!("{}:{}", resource, action),
        None => flag.to_string(),
    }
}

/// Inverse of `flag_to_permission` for writing grants.
pub fn permission_to_flag(permission: &str) -> String {
    permission.replace(':', "_")
}

/// Split a jsonb flag map into granted and explicitly-denied permissions.
/// Truthy values grant; an explicit boolean `false` denies.
pub fn partition_flags(flags: &serde_json::Value) -> (Vec<String>, Vec<String>) {
    let mut granted = Vec::new();
    let mut denied = Vec::new();

    if let Some(map) = flags.as_object() {
        for (key, value) in map {
            let truthy = match value {
                serde_json::Value::Bool(b) => *b,
                serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
                serde_json::Value::String(s) => !s.is_empty() && s != "false" && s != "0",
                _ => false,
            };
            if truthy {
                granted.push(flag_to_permission(key));
            } else if matches!(value, serde_json::Value::Bool(false)) {
                denied.push(flag_to_permission(key));
            }
        }
    }

    (granted, denied)
}

pub async fn user_flags(
    conn: &mut AsyncPgConnection,
    owner: Uuid,
) -> Result<Option<serde_json::Value>, PermissionStoreError> {
    use crate::schema::user_permissions::dsl::*;

    user_permissions
        .filter(user_id.eq(owner))
        .select(flags)
        .first::<serde_json::Value>(conn)
        .await
        .optional()
        .map_err(PermissionStoreError::Database)
}

/// Merge flag updates into the user's row, creating it when absent.
pub async fn upsert_user_flags(
    conn: &mut AsyncPgConnection,
    owner: Uuid,
    updates: &[(String, bool)],
) -> Result<(), PermissionStoreError> {
    use crate::schema::user_permissions::dsl::*;

    let existing = user_flags(conn, owner).await?;
    let mut map = existing
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();

    for (flag, value) in updates {
        map.insert(flag.clone(), serde_json::Value::Bool(*value));
    }
    let merged = serde_json::Value::Object(map);

    diesel::insert_into(user_permissions)
        .values((user_id.eq(owner), flags.eq(&merged), updated_at.eq(Utc::now())))
        .on_conflict(user_id)
        .do_update()
        .set((flags.eq(&merged), updated_at.eq(Utc::now())))
        .execute(conn)
        .await
        .map_err(PermissionStoreError::Database)?;
    Ok(())
}

/// Groups the user belongs to.
pub async fn group_ids_for_user(
    conn: &mut AsyncPgConnection,
    owner: Uuid,
) -> Result<Vec<Uuid>, PermissionStoreError> {
    use crate::schema::user_groups::dsl::*;

    user_groups
        .filter(user_id.eq(owner))
        .select(group_id)
        .load::<Uuid>(conn)
        .await
        .map_err(PermissionStoreError::Database)
}

pub async fn flags_for_groups(
    conn: &mut AsyncPgConnection,
    groups: &[Uuid],
) -> Result<Vec<serde_json::Value>, PermissionStoreError> {
    use crate::schema::group_permissions::dsl::*;

    if groups.is_empty() {
        return Ok(Vec::new());
    }

    group_permissions
        .filter(group_id.eq_any(groups))
        .select(flags)
        .load::<serde_json::Value>(conn)
        .await
        .map_err(PermissionStoreError::Database)
}

/// Configured role grants for a set of roles.
pub async fn permissions_for_roles(
    conn: &mut AsyncPgConnection,
    roles: &[String],
) -> Result<Vec<(String, String)>, PermissionStoreError> {
    use crate::schema::role_permissions::dsl::*;

    if roles.is_empty() {
        return Ok(Vec::new());
    }

    role_permissions
        .filter(role.eq_any(roles))
        .select((role, permission))
        .load::<(String, String)>(conn)
        .await
        .map_err(PermissionStoreError::Database)
}

/// Append an access decision to the knowledge access log. Retention is the
/// caller's concern; the core only appends.
pub async fn insert_access_log(
    conn: &mut AsyncPgConnection,
    log: NewAccessLog,
) -> Result<(), PermissionStoreError> {
    use crate::schema::knowledge_access_logs::dsl::*;

    diesel::insert_into(knowledge_access_logs)
        .values(&log)
        .execute(conn)
        .await
        .map_err(PermissionStoreError::Database)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flag_normalization() {
        assert_eq!(flag_to_permission("knowledge_read"), "knowledge:read");
        assert_eq!(flag_to_permission("graph_write"), "graph:write");
        assert_eq!(
            flag_to_permission("mental_health_read"),
            "mental_health:read"
        );
        assert_eq!(
            flag_to_permission("environmental_health_write"),
            "environmental_health:write"
        );
        assert_eq!(flag_to_permission("admin"), "admin");
    }

    #[test]
    fn test_permission_to_flag_round_trip() {
        for perm in [
            "knowledge:read",
            "mental_health:write",
            "precision_medicine:read",
            "admin",
        ] {
            assert_eq!(flag_to_permission(&permission_to_flag(perm)), perm);
        }
    }

    #[test]
    fn test_partition_flags() {
        let flags = json!({
            "knowledge_read": true,
            "knowledge_write": false,
            "graph_read": 1,
            "sensitive_read": "true",
            "tcm_read": null,
        });
        let (granted, denied) = partition_flags(&flags);
        assert!(granted.contains(&"knowledge:read".to_string()));
        assert!(granted.contains(&"graph:read".to_string()));
        assert!(granted.contains(&"sensitive:read".to_string()));
        assert!(!granted.contains(&"tcm:read".to_string()));
        assert_eq!(denied, vec!["knowledge:write"]);
    }

    #[test]
    fn test_partition_flags_non_object() {
        let (granted, denied) = partition_flags(&json!(null));
        assert!(granted.is_empty());
        assert!(denied.is_empty());
    }
}
