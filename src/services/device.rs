// Device registry: stable device identity from normalized fingerprints and
// the per-device trust flag.

use thiserror::Error;
use uuid::Uuid;

use crate::db::DieselPool;
use crate::models::device::{Device, DeviceError, NewDevice};
use crate::utils::device_fingerprint::{fingerprint, normalize_device, DeviceInfo};

#[derive(Error, Debug)]
pub enum DeviceRegistryError {
    #[error("Device not found")]
    NotFound,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Connection pool error: {0}")]
    Pool(String),
}

impl From<DeviceError> for DeviceRegistryError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::NotFound => DeviceRegistryError::NotFound,
            DeviceError::Database(e) => DeviceRegistryError::Storage(e.to_string()),
            DeviceError::Pool(e) => DeviceRegistryError::Pool(e),
        }
    }
}

#[derive(Clone)]
pub struct DeviceRegistry {
    pool: DieselPool,
}

impl DeviceRegistry {
    pub fn new(pool: DieselPool) -> Self {
        Self { pool }
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
        DeviceRegistryError,
    > {
        self.pool
            .get()
            .await
            .map_err(|e| DeviceRegistryError::Pool(e.to_string()))
    }

    /// Compute the stable fingerprint for a device report.
    pub fn fingerprint_for(&self, info: &DeviceInfo) -> String {
        fingerprint(&normalize_device(info))
    }

    /// Register a newly sighted device.
    pub async fn register(
        &self,
        user_id: Uuid,
        info: &DeviceInfo,
        is_trusted: bool,
    ) -> Result<Device, DeviceRegistryError> {
        let normalized = normalize_device(info);
        let fp = fingerprint(&normalized);

        let new_device = NewDevice {
            user_id,
            fingerprint: fp,
            device_type: normalized
                .device_type
                .unwrap_or_else(|| "unknown".to_string()),
            os: format!(
                "{} {}",
                normalized.os_name.as_deref().unwrap_or("unknown"),
                normalized.os_version.as_deref().unwrap_or("")
            )
            .trim_end()
            .to_string(),
            browser: format!(
                "{} {}",
                normalized.browser_name.as_deref().unwrap_or("unknown"),
                normalized.browser_version.as_deref().unwrap_or("")
            )
            .trim_end()
            .to_string(),
            is_trusted,
        };

        let mut conn = self.conn().await?;
        let device = Device::insert(&mut conn, new_device).await?;
        tracing::debug!(
            user_id = %user_id,
            device_id = %device.id,
            "Registered device"
        );
        Ok(device)
    }

    /// Identify a previously seen device by its fingerprint. Touches
    /// last_used_at on a hit.
    pub async fn identify(
        &self,
        user_id: Uuid,
        info: &DeviceInfo,
    ) -> Result<Option<Device>, DeviceRegistryError> {
        let fp = self.fingerprint_for(info);

        let mut conn = self.conn().await?;
        let device = Device::find_by_fingerprint(&mut conn, user_id, &fp).await?;

        if let Some(device) = &device {
            Device::touch_last_used(&mut conn, device.id).await?;
        }
        Ok(device)
    }

    /// Identify-or-register, optionally marking the device trusted. Used
    /// after a successful second factor with "remember this device".
    pub async fn register_and_trust(
        &self,
        user_id: Uuid,
        info: &DeviceInfo,
        auto_trust: bool,
    ) -> Result<Device, DeviceRegistryError> {
        match self.identify(user_id, info).await? {
            Some(device) => {
                if auto_trust && !device.is_trusted {
                    return Ok(self.trust(user_id, device.id).await?);
                }
                Ok(device)
            }
            None => self.register(user_id, info, auto_trust).await,
        }
    }

    pub async fn trust(
        &self,
        user_id: Uuid,
        device_id: Uuid,
    ) -> Result<Device, DeviceRegistryError> {
        let mut conn = self.conn().await?;
        // Ownership check is part of the update filter
        Ok(Device::set_trusted(&mut conn, user_id, device_id, true).await?)
    }

    pub async fn untrust(
        &self,
        user_id: Uuid,
        device_id: Uuid,
    ) -> Result<Device, DeviceRegistryError> {
        let mut conn = self.conn().await?;
        Ok(Device::set_trusted(&mut conn, user_id, device_id, false).await?)
    }

    pub async fn get(
        &self,
        user_id: Uuid,
        device_id: Uuid,
    ) -> Result<Device, DeviceRegistryError> {
        let mut conn = self.conn().await?;
        Ok(Device::find_for_user(&mut conn, user_id, device_id).await?)
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<Device>, DeviceRegistryError> {
        let mut conn = self.conn().await?;
        Ok(Device::list_for_user(&mut conn, user_id).await?)
    }

    pub async fn remove(
        &self,
        user_id: Uuid,
        device_id: Uuid,
    ) -> Result<(), DeviceRegistryError> {
        let mut conn = self.conn().await?;
        Device::remove(&mut conn, user_id, device_id).await?;
        Ok(())
    }
}
