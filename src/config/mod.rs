// Configuration modules for the auth service core

pub mod permissions;

pub use permissions::{
    builtin_role_permissions, derive_required_permission, map_action, map_resource_type,
    role_priority, ADMIN_PERMISSION, PERMISSION_DOMAINS,
};
