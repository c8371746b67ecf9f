//! SQLite persistence: LED actuator state (single row), append-only sensor
//! readings, and the device registry.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::types::{LedState, SensorBatch};

/// Registered device row. `name` is the unique key; registration overwrites
/// the row wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Device {
    pub name: String,
    pub ip: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ReadingRow {
    pub device_name: String,
    pub sensor_type: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(url: &str) -> Result<Store, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;
        Ok(Store { pool })
    }

    /// In-memory database for tests. A single connection, otherwise each
    /// pooled connection would see its own empty database.
    pub async fn memory() -> Result<Store, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Ok(Store { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS led_state (
                id INTEGER PRIMARY KEY,
                red INTEGER NOT NULL DEFAULT 0,
                green INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("INSERT OR IGNORE INTO led_state (id, red, green) VALUES (1, 0, 0)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sensor_data (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                device_name TEXT NOT NULL,
                sensor_type TEXT NOT NULL,
                value REAL NOT NULL,
                timestamp DATETIME NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sensor_data_type_timestamp
             ON sensor_data (sensor_type, timestamp DESC)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS devices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                ip TEXT NOT NULL,
                type TEXT NOT NULL,
                last_seen DATETIME NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn led_state(&self) -> Result<LedState, sqlx::Error> {
        let row: Option<(i64, i64)> = sqlx::query_as("SELECT red, green FROM led_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row
            .map(|(red, green)| LedState {
                led_red: red,
                led_green: green,
            })
            .unwrap_or_default())
    }

    pub async fn set_led_state(&self, state: &LedState) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE led_state SET red = ?, green = ? WHERE id = 1")
            .bind(state.led_red)
            .bind(state.led_green)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Inserts every reading of a batch in one transaction: readers never
    /// observe a partially stored batch.
    pub async fn insert_readings(&self, batch: &SensorBatch) -> Result<(), sqlx::Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for sensor in &batch.sensors {
            sqlx::query(
                "INSERT INTO sensor_data (device_name, sensor_type, value, timestamp)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&batch.device)
            .bind(&sensor.sensor_type)
            .bind(sensor.value)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }

    pub async fn latest_readings(
        &self,
        sensor_type: &str,
        limit: i64,
    ) -> Result<Vec<ReadingRow>, sqlx::Error> {
        sqlx::query_as(
            "SELECT device_name, sensor_type, value, timestamp FROM sensor_data
             WHERE sensor_type = ?
             ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(sensor_type)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn upsert_device(
        &self,
        name: &str,
        ip: &str,
        device_type: &str,
    ) -> Result<Device, sqlx::Error> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO devices (name, ip, type, last_seen) VALUES (?, ?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET
                 ip = excluded.ip,
                 type = excluded.type,
                 last_seen = excluded.last_seen",
        )
        .bind(name)
        .bind(ip)
        .bind(device_type)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(Device {
            name: name.to_string(),
            ip: ip.to_string(),
            device_type: device_type.to_string(),
            last_seen: now,
        })
    }

    pub async fn list_devices(&self) -> Result<Vec<Device>, sqlx::Error> {
        sqlx::query_as(
            "SELECT name, ip, type AS device_type, last_seen FROM devices
             ORDER BY last_seen DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await
    }

    pub async fn most_recent_device_of_type(
        &self,
        device_type: &str,
    ) -> Result<Option<Device>, sqlx::Error> {
        sqlx::query_as(
            "SELECT name, ip, type AS device_type, last_seen FROM devices
             WHERE type = ?
             ORDER BY last_seen DESC, id DESC LIMIT 1",
        )
        .bind(device_type)
        .fetch_optional(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SensorItem;

    async fn store() -> Store {
        let store = Store::memory().await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    fn batch(device: &str, sensors: &[(&str, f64)]) -> SensorBatch {
        SensorBatch {
            device: device.into(),
            sensors: sensors
                .iter()
                .map(|(t, v)| SensorItem {
                    sensor_type: (*t).into(),
                    value: *v,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn led_state_defaults_to_off_after_migrate() {
        let store = store().await;
        assert_eq!(store.led_state().await.unwrap(), LedState::default());
    }

    #[tokio::test]
    async fn led_state_round_trip() {
        let store = store().await;
        let state = LedState {
            led_red: 1,
            led_green: 1,
        };
        store.set_led_state(&state).await.unwrap();
        assert_eq!(store.led_state().await.unwrap(), state);
    }

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let store = store().await;
        store
            .set_led_state(&LedState {
                led_red: 1,
                led_green: 0,
            })
            .await
            .unwrap();
        store.migrate().await.unwrap();
        // Re-running the migration must not reset the live row.
        assert_eq!(store.led_state().await.unwrap().led_red, 1);
    }

    #[tokio::test]
    async fn latest_readings_most_recent_first() {
        let store = store().await;
        store
            .insert_readings(&batch("node-a", &[("light", 10.0)]))
            .await
            .unwrap();
        store
            .insert_readings(&batch("node-b", &[("light", 23.7), ("temperature", 19.0)]))
            .await
            .unwrap();

        let rows = store.latest_readings("light", 5).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].device_name, "node-b");
        assert_eq!(rows[0].value, 23.7);
        assert_eq!(rows[1].device_name, "node-a");

        let temps = store.latest_readings("temperature", 5).await.unwrap();
        assert_eq!(temps.len(), 1);
    }

    #[tokio::test]
    async fn latest_readings_honors_limit() {
        let store = store().await;
        for i in 0..4 {
            store
                .insert_readings(&batch("node", &[("light", f64::from(i))]))
                .await
                .unwrap();
        }
        let rows = store.latest_readings("light", 2).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value, 3.0);
    }

    #[tokio::test]
    async fn upsert_device_overwrites_by_name() {
        let store = store().await;
        store
            .upsert_device("esp-1", "192.168.1.50", "controller")
            .await
            .unwrap();
        store
            .upsert_device("esp-1", "192.168.1.60", "controller")
            .await
            .unwrap();

        let devices = store.list_devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].ip, "192.168.1.60");
    }

    #[tokio::test]
    async fn most_recent_device_of_type_filters_and_orders() {
        let store = store().await;
        store
            .upsert_device("sensor-1", "192.168.1.10", "sensor")
            .await
            .unwrap();
        store
            .upsert_device("esp-old", "192.168.1.20", "controller")
            .await
            .unwrap();
        store
            .upsert_device("esp-new", "192.168.1.30", "controller")
            .await
            .unwrap();

        let dev = store
            .most_recent_device_of_type("controller")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dev.name, "esp-new");

        assert!(store
            .most_recent_device_of_type("valve")
            .await
            .unwrap()
            .is_none());
    }
}
