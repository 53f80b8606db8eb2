// Device database model. (user_id, fingerprint) is logically unique;
// first write wins on a race and later sightings update last_used_at.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::user_devices;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = user_devices)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Device {
    pub id: Uuid,
    pub user_id: Uuid,
    pub fingerprint: String,
    pub device_type: String,
    pub os: String,
    pub browser: String,
    pub is_trusted: bool,
    pub last_used_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = user_devices)]
pub struct NewDevice {
    pub user_id: Uuid,
    pub fingerprint: String,
    pub device_type: String,
    pub os: String,
    pub browser: String,
    pub is_trusted: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum DeviceError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Device not found")]
    NotFound,

    #[error("Connection pool error: {0}")]
    Pool(String),
}

impl Device {
    pub async fn insert(
        conn: &mut AsyncPgConnection,
        new_device: NewDevice,
    ) -> Result<Self, DeviceError> {
        use crate::schema::user_devices::dsl::*;

        diesel::insert_into(user_devices)
            .values(&new_device)
            .get_result::<Device>(conn)
            .await
            .map_err(DeviceError::Database)
    }

    /// Look up a device by owner and fingerprint, most recently used first.
    pub async fn find_by_fingerprint(
        conn: &mut AsyncPgConnection,
        owner: Uuid,
        fingerprint_val: &str,
    ) -> Result<Option<Self>, DeviceError> {
        use crate::schema::user_devices::dsl::*;

        user_devices
            .filter(user_id.eq(owner))
            .filter(fingerprint.eq(fingerprint_val))
            .order(last_used_at.desc())
            .first::<Device>(conn)
            .await
            .optional()
            .map_err(DeviceError::Database)
    }

    pub async fn find_for_user(
        conn: &mut AsyncPgConnection,
        owner: Uuid,
        device_id: Uuid,
    ) -> Result<Self, DeviceError> {
        use crate::schema::user_devices::dsl::*;

        user_devices
            .filter(user_id.eq(owner))
            .filter(id.eq(device_id))
            .first::<Device>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => DeviceError::NotFound,
                _ => DeviceError::Database(e),
            })
    }

    pub async fn list_for_user(
        conn: &mut AsyncPgConnection,
        owner: Uuid,
    ) -> Result<Vec<Self>, DeviceError> {
        use crate::schema::user_devices::dsl::*;

        user_devices
            .filter(user_id.eq(owner))
            .order(last_used_at.desc())
            .load::<Device>(conn)
            .await
            .map_err(DeviceError::Database)
    }

    pub async fn touch_last_used(
        conn: &mut AsyncPgConnection,
        device_id: Uuid,
    ) -> Result<(), DeviceError> {
        use crate::schema::user_devices::dsl::*;

        diesel::update(user_devices.filter(id.eq(device_id)))
            .set(last_used_at.eq(Utc::now()))
            .execute(conn)
            .await
            .map_err(DeviceError::Database)?;
        Ok(())
    }

    /// Toggle the trust flag; the ownership filter makes this a no-op for
    /// devices of other users.
    pub async fn set_trusted(
        conn: &mut AsyncPgConnection,
        owner: Uuid,
        device_id: Uuid,
        trusted: bool,
    ) -> Result<Self, DeviceError> {
        use crate::schema::user_devices::dsl::*;

        diesel::update(
            user_devices
                .filter(user_id.eq(owner))
                .filter(id.eq(device_id)),
        )
        .set(is_trusted.eq(trusted))
        .get_result::<Device>(conn)
        .await
        .map_err(|e| match e {
            diesel::result::Error::NotFound => DeviceError::NotFound,
            _ => DeviceError::Database(e),
        })
    }

    pub async fn remove(
        conn: &mut AsyncPgConnection,
        owner: Uuid,
        device_id: Uuid,
    ) -> Result<(), DeviceError> {
        use crate::schema::user_devices::dsl::*;

        let removed = diesel::delete(
            user_devices
                .filter(user_id.eq(owner))
                .filter(id.eq(device_id)),
        )
        .execute(conn)
        .await
        .map_err(DeviceError::Database)?;

        if removed == 0 {
            return Err(DeviceError::NotFound);
        }
        Ok(())
    }
}
