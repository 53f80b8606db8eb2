// Permission resolver: merges role, direct, group and configured grants
// into an effective permission set and answers access checks through a
// three-tier cache (process map, key-value cache, relational store).

use dashmap::DashMap;
use futures_util::future::join_all;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::config::permissions::{
    builtin_role_permissions, derive_required_permission, map_action, map_resource_type,
    role_priority, ADMIN_PERMISSION,
};
use crate::db::{DieselPool, RedisPool};
use crate::models::permission::{
    self, partition_flags, permission_to_flag, NewAccessLog,
};
use crate::models::user::{User, UserError};
use crate::services::security_log::{SecurityEventType, SecurityLogService};

/// Cache TTL tiers in seconds. The chosen tier applies to both the process
/// map and the key-value entry.
const TTL_HOT_READS: u64 = 600; // reads on knowledge_* resources
const TTL_KNOWLEDGE_GRAPH: u64 = 1800; // knowledge/graph generally
const TTL_DEFAULT: u64 = 7200; // everything else

/// TTL for the cached per-user permission set
const SET_TTL: u64 = 1800;

/// TTL for cached role-derived permission lists
const ROLE_SET_TTL: u64 = 7200;

#[derive(Error, Debug)]
pub enum PermissionError {
    #[error("User not found")]
    UserNotFound,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Connection pool error: {0}")]
    Pool(String),
}

impl From<UserError> for PermissionError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::NotFound => PermissionError::UserNotFound,
            other => PermissionError::Storage(other.to_string()),
        }
    }
}

impl From<permission::PermissionStoreError> for PermissionError {
    fn from(err: permission::PermissionStoreError) -> Self {
        PermissionError::Storage(err.to_string())
    }
}

/// Pick the cache tier for a decision. High-frequency knowledge reads get
/// the shortest TTL so grants propagate quickly where traffic is hottest.
pub fn cache_ttl_for(resource_type: &str, action: &str) -> u64 {
    let prefix = map_resource_type(resource_type);
    if map_action(action) == "read" && resource_type.starts_with("knowledge") {
        return TTL_HOT_READS;
    }
    if prefix == "knowledge" || prefix == "graph" {
        return TTL_KNOWLEDGE_GRAPH;
    }
    TTL_DEFAULT
}

/// Merge role-derived grants under role priority. When several roles grant
/// the same permission the grant from the highest-priority role wins; the
/// priority bookkeeping is internal and stripped from the result.
pub fn merge_role_grants(role_grants: &[(String, Vec<String>)]) -> Vec<String> {
    let mut winners: HashMap<String, i32> = HashMap::new();

    for (role, grants) in role_grants {
        let priority = role_priority(role);
        for grant in grants {
            match winners.get(grant) {
                Some(existing) if *existing >= priority => {}
                _ => {
                    winners.insert(grant.clone(), priority);
                }
            }
        }
    }

    let mut merged: Vec<String> = winners.into_keys().collect();
    merged.sort();
    merged
}

/// The access decision itself: the `admin` string is a wildcard grant.
pub fn decide(permission_set: &HashSet<String>, required: &str) -> bool {
    permission_set.contains(ADMIN_PERMISSION) || permission_set.contains(required)
}

struct CachedDecision {
    allowed: bool,
    expires_at: Instant,
}

struct CachedSet {
    permissions: HashSet<String>,
    expires_at: Instant,
}

pub struct PermissionResolver {
    pool: DieselPool,
    redis_pool: RedisPool,
    security_log: SecurityLogService,
    access_cache: DashMap<String, CachedDecision>,
    set_cache: DashMap<Uuid, CachedSet>,
}

impl PermissionResolver {
    pub fn new(
        pool: DieselPool,
        redis_pool: RedisPool,
        security_log: SecurityLogService,
    ) -> Self {
        Self {
            pool,
            redis_pool,
            security_log,
            access_cache: DashMap::new(),
            set_cache: DashMap::new(),
        }
    }

    async fn conn(
        &self,
    ) -> Result<
        bb8::PooledConnection<
            '_,
            diesel_async::pooled_connection::AsyncDieselConnectionManager<
                diesel_async::AsyncPgConnection,
            >,
        >,
        PermissionError,
    > {
        self.pool
            .get()
            .await
            .map_err(|e| PermissionError::Pool(e.to_string()))
    }

    fn access_key(user_id: Uuid, resource_type: &str, resource_id: &str, action: &str) -> String {
        format!("{}:{}:{}:{}", user_id, resource_type, resource_id, action)
    }

    /// Role-derived permissions for a role list, cached in the key-value
    /// store under the sorted comma-joined role key.
    async fn role_derived_permissions(
        &self,
        roles: &[String],
    ) -> Result<Vec<String>, PermissionError> {
        let mut sorted = roles.to_vec();
        sorted.sort();
        let cache_key = format!("role_permissions:{}", sorted.join(","));

        match self.redis_pool.get_string(&cache_key).await {
            Ok(Some(json)) => {
                if let Ok(cached) = serde_json::from_str::<Vec<String>>(&json) {
                    return Ok(cached);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Role permission cache read failed: {}", e),
        }

        let mut role_grants: Vec<(String, Vec<String>)> = Vec::new();
        for role in roles {
            role_grants.push((role.clone(), builtin_role_permissions(role)));
        }

        let mut conn = self.conn().await?;
        for (role, grant) in permission::permissions_for_roles(&mut conn, roles).await? {
            if let Some(entry) = role_grants.iter_mut().find(|(r, _)| *r == role) {
                entry.1.push(grant);
            } else {
                role_grants.push((role, vec![grant]));
            }
        }
        drop(conn);

        let merged = merge_role_grants(&role_grants);

        if let Ok(json) = serde_json::to_string(&merged) {
            if let Err(e) = self
                .redis_pool
                .set_with_expiry(&cache_key, json, ROLE_SET_TTL)
                .await
            {
                warn!("Role permission cache write failed: {}", e);
            }
        }

        Ok(merged)
    }

    /// Assemble the full permission set from every source. Explicit false
    /// flags (direct or group) mask the same grant from any role.
    async fn compute_permission_set(
        &self,
        user_id: Uuid,
    ) -> Result<HashSet<String>, PermissionError> {
        let mut conn = self.conn().await?;
        let user = User::find_by_id(&mut conn, user_id).await?;

        let direct_flags = permission::user_flags(&mut conn, user_id).await?;
        let group_ids = permission::group_ids_for_user(&mut conn, user_id).await?;
        let group_flag_rows = permission::flags_for_groups(&mut conn, &group_ids).await?;
        drop(conn);

        let roles = user.all_roles();
        let mut set: HashSet<String> =
            self.role_derived_permissions(&roles).await?.into_iter().collect();

        let mut denied: Vec<String> = Vec::new();

        for flags in &group_flag_rows {
            let (granted, group_denied) = partition_flags(flags);
            set.extend(granted);
            denied.extend(group_denied);
        }

        if let Some(flags) = &direct_flags {
            let (granted, direct_denied) = partition_flags(flags);
            set.extend(granted);
            denied.extend(direct_denied);
        }

        for permission in denied {
            set.remove(&permission);
        }

        Ok(set)
    }

    /// Resolve the user's permission set through the set cache tiers.
    pub async fn resolve_permission_set(
        &self,
        user_id: Uuid,
    ) -> Result<HashSet<String>, PermissionError> {
        if let Some(entry) = self.set_cache.get(&user_id) {
            if entry.expires_at > Instant::now() {
                return Ok(entry.permissions.clone());
            }
        }
        self.set_cache.remove(&user_id);

        let kv_key = format!("user_permissions:{}", user_id);
        match self.redis_pool.get_string(&kv_key).await {
            Ok(Some(json)) => {
                if let Ok(list) = serde_json::from_str::<Vec<String>>(&json) {
                    let set: HashSet<String> = list.into_iter().collect();
                    self.set_cache.insert(
                        user_id,
                        CachedSet {
                            permissions: set.clone(),
                            expires_at: Instant::now() + Duration::from_secs(SET_TTL),
                        },
                    );
                    return Ok(set);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Permission set cache read failed for {}: {}", user_id, e),
        }

        let set = self.compute_permission_set(user_id).await?;

        let as_list: Vec<&String> = set.iter().collect();
        if let Ok(json) = serde_json::to_string(&as_list) {
            if let Err(e) = self.redis_pool.set_with_expiry(&kv_key, json, SET_TTL).await {
                warn!("Permission set cache write failed for {}: {}", user_id, e);
            }
        }
        self.set_cache.insert(
            user_id,
            CachedSet {
                permissions: set.clone(),
                expires_at: Instant::now() + Duration::from_secs(SET_TTL),
            },
        );

        Ok(set)
    }

    /// Answer whether the user may perform `action` on the resource.
    pub async fn can_access(
        &self,
        user_id: Uuid,
        resource_type: &str,
        resource_id: &str,
        action: &str,
    ) -> Result<bool, PermissionError> {
        let mem_key = Self::access_key(user_id, resource_type, resource_id, action);

        if let Some(entry) = self.access_cache.get(&mem_key) {
            if entry.expires_at > Instant::now() {
                return Ok(entry.allowed);
            }
        }
        self.access_cache.remove(&mem_key);

        let ttl = cache_ttl_for(resource_type, action);
        let kv_key = format!("access:{}", mem_key);

        match self.redis_pool.get_string(&kv_key).await {
            Ok(Some(cached)) => {
                let allowed = cached == "true";
                self.access_cache.insert(
                    mem_key,
                    CachedDecision {
                        allowed,
                        expires_at: Instant::now() + Duration::from_secs(ttl),
                    },
                );
                return Ok(allowed);
            }
            Ok(None) => {}
            Err(e) => warn!("Access cache read failed for {}: {}", kv_key, e),
        }

        let required = derive_required_permission(resource_type, action);
        let set = self.resolve_permission_set(user_id).await?;
        let allowed = decide(&set, &required);

        if let Err(e) = self
            .redis_pool
            .set_with_expiry(&kv_key, allowed.to_string(), ttl)
            .await
        {
            warn!("Access cache write failed for {}: {}", kv_key, e);
        }
        self.access_cache.insert(
            mem_key,
            CachedDecision {
                allowed,
                expires_at: Instant::now() + Duration::from_secs(ttl),
            },
        );

        // Best-effort access log append
        if let Ok(mut conn) = self.conn().await {
            let log = NewAccessLog {
                user_id,
                resource_type: resource_type.to_string(),
                resource_id: resource_id.to_string(),
                action: action.to_string(),
                granted: allowed,
            };
            if let Err(e) = permission::insert_access_log(&mut conn, log).await {
                warn!("Access log append failed for {}: {}", user_id, e);
            }
        }

        Ok(allowed)
    }

    /// Fan out a batch of access checks. A failed entry degrades to false
    /// rather than failing the batch.
    pub async fn batch_check(
        &self,
        user_id: Uuid,
        items: &[(String, String, String)],
    ) -> HashMap<(String, String, String), bool> {
        let checks = items.iter().map(|(resource_type, resource_id, action)| {
            let key = (resource_type.clone(), resource_id.clone(), action.clone());
            async move {
                let allowed = match self
                    .can_access(user_id, resource_type, resource_id, action)
                    .await
                {
                    Ok(allowed) => allowed,
                    Err(e) => {
                        warn!(
                            "Batch access check failed for {} on {}:{}: {}",
                            user_id, resource_type, resource_id, e
                        );
                        false
                    }
                };
                (key, allowed)
            }
        });

        join_all(checks).await.into_iter().collect()
    }

    /// Effective permissions after role-priority conflict resolution plus
    /// direct and group adjustments. Priority markers never escape.
    pub async fn get_effective_permissions(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<String>, PermissionError> {
        let set = self.resolve_permission_set(user_id).await?;
        let mut list: Vec<String> = set.into_iter().collect();
        list.sort();
        Ok(list)
    }

    /// Grant direct permissions, then invalidate every cache tier for the
    /// user so the next evaluation sees the change.
    pub async fn assign_permissions(
        &self,
        user_id: Uuid,
        permissions: &[String],
    ) -> Result<(), PermissionError> {
        self.write_direct_flags(user_id, permissions, true).await?;
        self.security_log
            .log(
                SecurityEventType::PermissionsChanged,
                Some(user_id),
                serde_json::json!({ "assigned": permissions }),
            )
            .await;
        Ok(())
    }

    /// Revoke direct permissions. The stored false flags also mask the
    /// same grants from the user's roles.
    pub async fn revoke_permissions(
        &self,
        user_id: Uuid,
        permissions: &[String],
    ) -> Result<(), PermissionError> {
        self.write_direct_flags(user_id, permissions, false).await?;
        self.security_log
            .log(
                SecurityEventType::PermissionsChanged,
                Some(user_id),
                serde_json::json!({ "revoked": permissions }),
            )
            .await;
        Ok(())
    }

    async fn write_direct_flags(
        &self,
        user_id: Uuid,
        permissions: &[String],
        value: bool,
    ) -> Result<(), PermissionError> {
        let updates: Vec<(String, bool)> = permissions
            .iter()
            .map(|p| (permission_to_flag(p), value))
            .collect();

        let mut conn = self.conn().await?;
        permission::upsert_user_flags(&mut conn, user_id, &updates).await?;
        drop(conn);

        self.invalidate_user(user_id).await;
        Ok(())
    }

    /// Drop every cached artifact for a user: the set entry, the key-value
    /// mirror, and all access decisions in both tiers.
    pub async fn invalidate_user(&self, user_id: Uuid) {
        self.set_cache.remove(&user_id);

        if let Err(e) = self
            .redis_pool
            .del(&format!("user_permissions:{}", user_id))
            .await
        {
            warn!("Failed to drop permission set cache for {}: {}", user_id, e);
        }

        if let Err(e) = self
            .redis_pool
            .del_pattern(&format!("access:{}:*", user_id))
            .await
        {
            warn!("Failed to drop access cache for {}: {}", user_id, e);
        }

        let prefix = format!("{}:", user_id);
        self.access_cache.retain(|key, _| !key.starts_with(&prefix));
    }

    /// Evict expired process-cache entries. Runs from the background
    /// scheduler; retain() never blocks readers beyond the shard touched.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.access_cache.len() + self.set_cache.len();
        self.access_cache.retain(|_, entry| entry.expires_at > now);
        self.set_cache.retain(|_, entry| entry.expires_at > now);
        before - (self.access_cache.len() + self.set_cache.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_ttl_tiers() {
        // hot tier: reads on knowledge_* resources
        assert_eq!(cache_ttl_for("knowledge_base", "read"), 600);
        assert_eq!(cache_ttl_for("knowledge_node", "list"), 600);
        assert_eq!(cache_ttl_for("knowledge_graph", "query"), 600);
        // knowledge/graph writes and graph reads
        assert_eq!(cache_ttl_for("knowledge_base", "write"), 1800);
        assert_eq!(cache_ttl_for("graph_node", "read"), 1800);
        assert_eq!(cache_ttl_for("graph_relation", "update"), 1800);
        // everything else
        assert_eq!(cache_ttl_for("sensitive_data", "read"), 7200);
        assert_eq!(cache_ttl_for("tcm_knowledge", "write"), 7200);
    }

    #[test]
    fn test_merge_role_grants_priority() {
        let grants = vec![
            (
                "knowledge_reader".to_string(),
                vec!["knowledge:read".to_string()],
            ),
            (
                "knowledge_editor".to_string(),
                vec!["knowledge:read".to_string(), "knowledge:write".to_string()],
            ),
        ];
        let merged = merge_role_grants(&grants);
        assert!(merged.contains(&"knowledge:read".to_string()));
        assert!(
            merged.contains(&"knowledge:write".to_string()),
            "editor grant must win over the reader's silence"
        );
    }

    #[test]
    fn test_merge_strips_priority_markers() {
        let grants = vec![("admin".to_string(), builtin_role_permissions("admin"))];
        for permission in merge_role_grants(&grants) {
            assert!(
                !permission.contains('@') && !permission.contains('#'),
                "no internal markers may escape: {}",
                permission
            );
        }
    }

    #[test]
    fn test_decide_admin_wildcard() {
        let mut set = HashSet::new();
        set.insert(ADMIN_PERMISSION.to_string());
        assert!(decide(&set, "knowledge:read"));
        assert!(decide(&set, "sensitive:write"));
        assert!(decide(&set, "anything:at_all"));
    }

    #[test]
    fn test_decide_exact_match() {
        let mut set = HashSet::new();
        set.insert("knowledge:read".to_string());
        assert!(decide(&set, "knowledge:read"));
        assert!(!decide(&set, "knowledge:write"));
        assert!(!decide(&set, "graph:read"));
    }
}
