// Login/activity event rows. Failures on unknown users are still recorded
// with user_id = NULL to support enumeration-attack analysis.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::user_events;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = user_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserEvent {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub event_type: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = user_events)]
pub struct NewUserEvent {
    pub user_id: Option<Uuid>,
    pub event_type: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(thiserror::Error, Debug)]
pub enum UserEventError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),
}

impl UserEvent {
    pub async fn insert(
        conn: &mut AsyncPgConnection,
        event: NewUserEvent,
    ) -> Result<(), UserEventError> {
        use crate::schema::user_events::dsl::*;

        diesel::insert_into(user_events)
            .values(&event)
            .execute(conn)
            .await
            .map_err(UserEventError::Database)?;
        Ok(())
    }

    pub async fn recent_for_user(
        conn: &mut AsyncPgConnection,
        owner: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, UserEventError> {
        use crate::schema::user_events::dsl::*;

        user_events
            .filter(user_id.eq(owner))
            .order(created_at.desc())
            .limit(limit)
            .load::<UserEvent>(conn)
            .await
            .map_err(UserEventError::Database)
    }
}
