// Recovery code database model. Codes are stored only as bcrypt hashes and
// are strictly single use: used=true is terminal.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::two_factor_recovery_codes;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = two_factor_recovery_codes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RecoveryCode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code_hash: String,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = two_factor_recovery_codes)]
pub struct NewRecoveryCode {
    pub user_id: Uuid,
    pub code_hash: String,
}

#[derive(thiserror::Error, Debug)]
pub enum RecoveryCodeError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),
}

impl RecoveryCode {
    pub async fn insert_batch(
        conn: &mut AsyncPgConnection,
        codes: Vec<NewRecoveryCode>,
    ) -> Result<usize, RecoveryCodeError> {
        use crate::schema::two_factor_recovery_codes::dsl::*;

        diesel::insert_into(two_factor_recovery_codes)
            .values(&codes)
            .execute(conn)
            .await
            .map_err(RecoveryCodeError::Database)
    }

    pub async fn unused_for_user(
        conn: &mut AsyncPgConnection,
        owner: Uuid,
    ) -> Result<Vec<Self>, RecoveryCodeError> {
        use crate::schema::two_factor_recovery_codes::dsl::*;

        two_factor_recovery_codes
            .filter(user_id.eq(owner))
            .filter(used.eq(false))
            .order(created_at.asc())
            .load::<RecoveryCode>(conn)
            .await
            .map_err(RecoveryCodeError::Database)
    }

    /// Consume a single code. The used=false filter makes double spending
    /// impossible even under concurrent verification.
    pub async fn mark_used(
        conn: &mut AsyncPgConnection,
        code_id: Uuid,
    ) -> Result<bool, RecoveryCodeError> {
        use crate::schema::two_factor_recovery_codes::dsl::*;

        let updated = diesel::update(
            two_factor_recovery_codes
                .filter(id.eq(code_id))
                .filter(used.eq(false)),
        )
        .set((used.eq(true), used_at.eq(Utc::now())))
        .execute(conn)
        .await
        .map_err(RecoveryCodeError::Database)?;

        Ok(updated > 0)
    }

    pub async fn delete_all_for_user(
        conn: &mut AsyncPgConnection,
        owner: Uuid,
    ) -> Result<usize, RecoveryCodeError> {
        use crate::schema::two_factor_recovery_codes::dsl::*;

        diesel::delete(two_factor_recovery_codes.filter(user_id.eq(owner)))
            .execute(conn)
            .await
            .map_err(RecoveryCodeError::Database)
    }
}
