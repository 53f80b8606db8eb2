// Permission resolution tests over the pure derivation and merge layer

use std::collections::HashSet;

use suoke_auth_core::config::permissions::{
    builtin_role_permissions, derive_required_permission, role_priority, ADMIN_PERMISSION,
};
use suoke_auth_core::models::permission::{flag_to_permission, partition_flags};
use suoke_auth_core::services::permission::{cache_ttl_for, decide, merge_role_grants};

#[test]
fn test_editor_outranks_reader_for_writes() {
    // roles ["knowledge_reader", "knowledge_editor"]: the editor's write
    // grant wins under priority merge
    let grants = vec![
        (
            "knowledge_reader".to_string(),
            builtin_role_permissions("knowledge_reader"),
        ),
        (
            "knowledge_editor".to_string(),
            builtin_role_permissions("knowledge_editor"),
        ),
    ];
    assert!(role_priority("knowledge_editor") > role_priority("knowledge_reader"));

    let merged: HashSet<String> = merge_role_grants(&grants).into_iter().collect();
    let required = derive_required_permission("knowledge_base", "write");
    assert!(decide(&merged, &required));
}

#[test]
fn test_reader_alone_cannot_write() {
    let grants = vec![(
        "knowledge_reader".to_string(),
        builtin_role_permissions("knowledge_reader"),
    )];
    let merged: HashSet<String> = merge_role_grants(&grants).into_iter().collect();

    assert!(decide(&merged, &derive_required_permission("knowledge_base", "read")));
    assert!(!decide(&merged, &derive_required_permission("knowledge_base", "write")));
}

#[test]
fn test_admin_wildcard_grants_everything() {
    let mut set = HashSet::new();
    set.insert(ADMIN_PERMISSION.to_string());

    for (resource_type, action) in [
        ("knowledge_base", "read"),
        ("knowledge_graph", "delete"),
        ("sensitive_data", "view"),
        ("precision_medicine_knowledge", "update"),
        ("completely_unknown", "purge"),
    ] {
        let required = derive_required_permission(resource_type, action);
        assert!(decide(&set, &required), "admin must grant {}", required);
    }
}

#[test]
fn test_required_permission_derivation_table() {
    let cases = [
        ("knowledge_base", "read", "knowledge:read"),
        ("knowledge_node", "search", "knowledge:read"),
        ("knowledge_graph", "query", "graph:read"),
        ("graph_node", "create", "graph:write"),
        ("graph_relation", "delete", "graph:write"),
        ("sensitive_data", "get", "sensitive:read"),
        ("tcm_knowledge", "list", "tcm:read"),
        ("nutrition_knowledge", "update", "nutrition:write"),
        ("mental_health_knowledge", "view", "mental_health:read"),
        ("environmental_health_knowledge", "write", "environmental_health:write"),
        ("precision_medicine_knowledge", "read", "precision_medicine:read"),
        // unknown types and actions pass through
        ("billing_record", "export", "billing_record:export"),
    ];

    for (resource_type, action, expected) in cases {
        assert_eq!(derive_required_permission(resource_type, action), expected);
    }
}

#[test]
fn test_cache_tiers_follow_traffic_shape() {
    // hot: knowledge reads
    assert_eq!(cache_ttl_for("knowledge_base", "read"), 600);
    assert_eq!(cache_ttl_for("knowledge_node", "get"), 600);
    // warm: knowledge/graph in general
    assert_eq!(cache_ttl_for("knowledge_base", "write"), 1800);
    assert_eq!(cache_ttl_for("graph_node", "list"), 1800);
    // cold: everything else
    assert_eq!(cache_ttl_for("sensitive_data", "read"), 7200);
    assert_eq!(cache_ttl_for("nutrition_knowledge", "write"), 7200);
}

#[test]
fn test_direct_flag_normalization_and_denial() {
    let flags = serde_json::json!({
        "knowledge_read": true,
        "knowledge_write": false,
        "mental_health_read": true,
        "admin": false,
    });

    let (granted, denied) = partition_flags(&flags);
    assert!(granted.contains(&"knowledge:read".to_string()));
    assert!(granted.contains(&"mental_health:read".to_string()));
    assert!(denied.contains(&"knowledge:write".to_string()));
    assert!(denied.contains(&"admin".to_string()));

    // revoking knowledge:write masks the grant from any role
    let role_set: HashSet<String> = builtin_role_permissions("knowledge_editor")
        .into_iter()
        .filter(|p| !denied.contains(p))
        .collect();
    assert!(!decide(&role_set, "knowledge:write"));
    assert!(decide(&role_set, "knowledge:read"));
}

#[test]
fn test_flag_key_round_trips() {
    assert_eq!(flag_to_permission("graph_write"), "graph:write");
    assert_eq!(
        flag_to_permission("environmental_health_read"),
        "environmental_health:read"
    );
}

#[test]
fn test_priority_ladder_is_total() {
    let ladder = [
        "user",
        "knowledge_reader",
        "graph_reader",
        "knowledge_contributor",
        "sensitive_reader",
        "knowledge_editor",
        "graph_editor",
        "knowledge_manager",
        "admin",
    ];
    for pair in ladder.windows(2) {
        assert!(
            role_priority(pair[0]) < role_priority(pair[1]),
            "{} must rank below {}",
            pair[0],
            pair[1]
        );
    }
}
