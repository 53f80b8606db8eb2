// Role and permission catalog for the knowledge platform.
// Permissions are strings of the form `{resource}:{action}`; roles map to
// fixed grants here and may be extended through the role_permissions table.

/// The wildcard permission. A set containing this string grants everything.
pub const ADMIN_PERMISSION: &str = "admin";

/// Resource domains recognized by the platform.
pub const PERMISSION_DOMAINS: [&str; 8] = [
    "knowledge",
    "graph",
    "sensitive",
    "tcm",
    "nutrition",
    "mental_health",
    "environmental_health",
    "precision_medicine",
];

/// Numeric priority for built-in roles. When two roles grant the same
/// (resource, action), the grant from the higher-priority role wins.
pub fn role_priority(role: &str) -> i32 {
    match role {
        "admin" => 100,
        "knowledge_manager" => 40,
        "graph_editor" => 35,
        "knowledge_editor" => 30,
        "sensitive_reader" => 25,
        "knowledge_contributor" => 20,
        "graph_reader" => 15,
        "knowledge_reader" => 10,
        _ => 0, // plain user and unknown roles
    }
}

/// Fixed permission grants for well-known roles.
pub fn builtin_role_permissions(role: &str) -> Vec<String> {
    match role {
        "admin" => {
            let mut perms: Vec<String> = vec![ADMIN_PERMISSION.to_string()];
            for domain in PERMISSION_DOMAINS {
                perms.push(format!("{}:read", domain));
                perms.push(format!("{}:write", domain));
            }
            for scope in ["knowledge", "graph"] {
                perms.push(format!("{}:delete", scope));
                perms.push(format!("{}:admin", scope));
            }
            perms
        },
        "knowledge_manager" => vec![
            "knowledge:read".to_string(),
            "knowledge:write".to_string(),
            "knowledge:delete".to_string(),
            "graph:read".to_string(),
        ],
        "knowledge_editor" => vec!["knowledge:read".to_string(), "knowledge:write".to_string()],
        "knowledge_contributor" => {
            vec!["knowledge:read".to_string(), "knowledge:write".to_string()]
        },
        "knowledge_reader" => vec!["knowledge:read".to_string()],
        "graph_editor" => vec!["graph:read".to_string(), "graph:write".to_string()],
        "graph_reader" => vec!["graph:read".to_string()],
        "sensitive_reader" => vec!["sensitive:read".to_string(), "knowledge:read".to_string()],
        _ => Vec::new(),
    }
}

/// Map a concrete resource type onto its permission prefix.
/// Unknown types pass through unchanged.
pub fn map_resource_type(resource_type: &str) -> &str {
    match resource_type {
        "knowledge_base" | "knowledge_node" => "knowledge",
        "knowledge_graph" | "graph_node" | "graph_relation" | "graph_query" => "graph",
        "sensitive_data" => "sensitive",
        "tcm_knowledge" => "tcm",
        "nutrition_knowledge" => "nutrition",
        "mental_health_knowledge" => "mental_health",
        "environmental_health_knowledge" => "environmental_health",
        "precision_medicine_knowledge" => "precision_medicine",
        other => other,
    }
}

/// Collapse a concrete action onto its permission suffix.
/// Unknown actions pass through unchanged.
pub fn map_action(action: &str) -> &str {
    match action {
        "read" | "view" | "get" | "list" | "search" | "query" => "read",
        "write" | "create" | "update" | "delete" => "write",
        other => other,
    }
}

/// Derive the permission string required to perform `action` on a resource
/// of type `resource_type`.
pub fn derive_required_permission(resource_type: &str, action: &str) -> String {
    format!("{}:{}", map_resource_type(resource_type), map_action(action))
}
