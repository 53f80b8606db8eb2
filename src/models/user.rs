// User database model and identifier lookup

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::schema::users;
use crate::utils::validation::{classify_identifier, IdentifierKind};

/// Account status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UserStatus {
    Active,
    Inactive,
    Locked,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
            UserStatus::Locked => "locked",
        }
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(UserStatus::Active),
            "inactive" => Ok(UserStatus::Inactive),
            "locked" => Ok(UserStatus::Locked),
            _ => Err(format!("Invalid user status: {}", s)),
        }
    }
}

/// Supported second factor methods
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TwoFactorMethod {
    Totp,
}

impl TwoFactorMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TwoFactorMethod::Totp => "totp",
        }
    }
}

impl FromStr for TwoFactorMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "totp" => Ok(TwoFactorMethod::Totp),
            _ => Err(format!("Invalid two-factor method: {}", s)),
        }
    }
}

/// User database model
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password_hash: String,
    pub status: String,
    pub role: String,
    pub secondary_roles: Option<String>,
    pub two_factor_enabled: bool,
    pub two_factor_secret: Option<String>,
    pub two_factor_method: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New user for insertion
#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password_hash: String,
    pub status: String,
    pub role: String,
}

/// User update struct
#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = users)]
pub struct UserUpdate {
    pub password_hash: Option<String>,
    pub status: Option<String>,
    pub two_factor_enabled: Option<bool>,
    pub two_factor_secret: Option<Option<String>>,
    pub two_factor_method: Option<Option<String>>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Sanitized user view returned from login flows. Never carries the
/// password hash or the 2FA secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPublic {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: String,
    pub role: String,
    pub two_factor_enabled: bool,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<&User> for UserPublic {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            status: user.status.clone(),
            role: user.role.clone(),
            two_factor_enabled: user.two_factor_enabled,
            last_login_at: user.last_login_at,
        }
    }
}

/// Errors for user operations
#[derive(thiserror::Error, Debug)]
pub enum UserError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("User not found")]
    NotFound,

    #[error("Connection pool error: {0}")]
    Pool(String),
}

impl User {
    pub fn status_enum(&self) -> UserStatus {
        UserStatus::from_str(&self.status).unwrap_or_else(|e| {
            tracing::warn!(
                "Invalid status '{}' for user {}, treating as locked: {}",
                self.status,
                self.id,
                e
            );
            UserStatus::Locked
        })
    }

    pub fn is_active(&self) -> bool {
        self.status_enum() == UserStatus::Active
    }

    /// Secondary roles are stored either as a JSON array or a comma string.
    /// Both forms parse; anything else yields an empty list.
    pub fn secondary_roles_list(&self) -> Vec<String> {
        let raw = match self.secondary_roles.as_deref() {
            Some(raw) if !raw.trim().is_empty() => raw.trim(),
            _ => return Vec::new(),
        };

        if let Ok(parsed) = serde_json::from_str::<Vec<String>>(raw) {
            return parsed
                .into_iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect();
        }

        raw.split(',')
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect()
    }

    /// Primary role plus secondary roles, deduplicated in order.
    pub fn all_roles(&self) -> Vec<String> {
        let mut roles = vec![self.role.clone()];
        for role in self.secondary_roles_list() {
            if !roles.contains(&role) {
                roles.push(role);
            }
        }
        roles
    }

    /// Find user by ID
    pub async fn find_by_id(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
    ) -> Result<Self, UserError> {
        use crate::schema::users::dsl::*;

        users
            .filter(id.eq(user_id))
            .first::<User>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => UserError::NotFound,
                _ => UserError::Database(e),
            })
    }

    /// Resolve a login identifier across username, email and phone.
    pub async fn find_by_identifier(
        conn: &mut AsyncPgConnection,
        identifier: &str,
    ) -> Result<Self, UserError> {
        use crate::schema::users::dsl::*;

        let identifier = identifier.trim();
        let query = match classify_identifier(identifier) {
            IdentifierKind::Email => users
                .filter(email.eq(identifier.to_lowercase()))
                .into_boxed(),
            IdentifierKind::Phone => users.filter(phone.eq(identifier)).into_boxed(),
            IdentifierKind::Username => users.filter(username.eq(identifier)).into_boxed(),
        };

        query.first::<User>(conn).await.map_err(|e| match e {
            diesel::result::Error::NotFound => UserError::NotFound,
            _ => UserError::Database(e),
        })
    }

    /// Check whether any of the given unique identifiers is already taken.
    pub async fn identifier_taken(
        conn: &mut AsyncPgConnection,
        username_val: &str,
        email_val: Option<&str>,
        phone_val: Option<&str>,
    ) -> Result<bool, UserError> {
        use crate::schema::users::dsl::*;
        use diesel::dsl::count_star;

        let mut query = users
            .select(count_star())
            .filter(username.eq(username_val))
            .into_boxed();
        if let Some(e) = email_val {
            query = query.or_filter(email.eq(e.to_lowercase()));
        }
        if let Some(p) = phone_val {
            query = query.or_filter(phone.eq(p));
        }

        let taken: i64 = query
            .get_result(conn)
            .await
            .map_err(UserError::Database)?;
        Ok(taken > 0)
    }

    /// Create a new user
    pub async fn create(conn: &mut AsyncPgConnection, new_user: NewUser) -> Result<Self, UserError> {
        use crate::schema::users::dsl::*;

        diesel::insert_into(users)
            .values(&new_user)
            .get_result::<User>(conn)
            .await
            .map_err(UserError::Database)
    }

    /// Apply a partial update
    pub async fn update(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        update: UserUpdate,
    ) -> Result<Self, UserError> {
        use crate::schema::users::dsl::*;

        diesel::update(users.filter(id.eq(user_id)))
            .set(&update)
            .get_result::<User>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => UserError::NotFound,
                _ => UserError::Database(e),
            })
    }

    /// Touch the last successful login timestamp
    pub async fn touch_last_login(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
    ) -> Result<(), UserError> {
        use crate::schema::users::dsl::*;

        diesel::update(users.filter(id.eq(user_id)))
            .set(last_login_at.eq(Utc::now()))
            .execute(conn)
            .await
            .map_err(UserError::Database)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_user(secondary: Option<&str>) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            username: "zhang_wei".to_string(),
            email: Some("zhang@suoke.life".to_string()),
            phone: None,
            password_hash: "$2b$10$hash".to_string(),
            status: "active".to_string(),
            role: "knowledge_reader".to_string(),
            secondary_roles: secondary.map(String::from),
            two_factor_enabled: false,
            two_factor_secret: None,
            two_factor_method: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(UserStatus::from_str("active"), Ok(UserStatus::Active));
        assert_eq!(UserStatus::from_str("inactive"), Ok(UserStatus::Inactive));
        assert_eq!(UserStatus::from_str("locked"), Ok(UserStatus::Locked));
        assert!(UserStatus::from_str("banned").is_err());
    }

    #[test]
    fn test_secondary_roles_json_form() {
        let user = test_user(Some(r#"["knowledge_editor","graph_reader"]"#));
        assert_eq!(
            user.secondary_roles_list(),
            vec!["knowledge_editor", "graph_reader"]
        );
    }

    #[test]
    fn test_secondary_roles_comma_form() {
        let user = test_user(Some("knowledge_editor, graph_reader"));
        assert_eq!(
            user.secondary_roles_list(),
            vec!["knowledge_editor", "graph_reader"]
        );
    }

    #[test]
    fn test_secondary_roles_empty() {
        assert!(test_user(None).secondary_roles_list().is_empty());
        assert!(test_user(Some("  ")).secondary_roles_list().is_empty());
    }

    #[test]
    fn test_all_roles_dedup() {
        let user = test_user(Some("knowledge_reader,knowledge_editor"));
        assert_eq!(
            user.all_roles(),
            vec!["knowledge_reader", "knowledge_editor"]
        );
    }

    #[test]
    fn test_public_view_is_sanitized() {
        let mut user = test_user(None);
        user.two_factor_secret = Some("JBSWY3DPEHPK3PXP".to_string());
        let public = UserPublic::from(&user);
        let json = serde_json::to_string(&public).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("JBSWY3DPEHPK3PXP"));
    }
}
