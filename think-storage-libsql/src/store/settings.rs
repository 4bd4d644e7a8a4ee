//! Settings key/value storage. API keys live here too, so they are
//! encrypted at rest with everything else.

use std::collections::HashMap;
use think_core::Result;

use super::storage_err;
use crate::LibsqlStore;

impl LibsqlStore {
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.reader().await?;
        let mut rows = conn
            .query(
                "SELECT value FROM settings WHERE key = ?",
                libsql::params![key],
            )
            .await
            .map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row.get(0).map_err(storage_err)?)),
            None => Ok(None),
        }
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.writer().await;
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)",
            libsql::params![key, value],
        )
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    pub async fn delete_setting(&self, key: &str) -> Result<()> {
        let conn = self.writer().await;
        conn.execute("DELETE FROM settings WHERE key = ?", libsql::params![key])
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    pub async fn all_settings(&self) -> Result<HashMap<String, String>> {
        let conn = self.reader().await?;
        let mut rows = conn
            .query("SELECT key, value FROM settings", ())
            .await
            .map_err(storage_err)?;

        let mut settings = HashMap::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            settings.insert(
                row.get(0).map_err(storage_err)?,
                row.get(1).map_err(storage_err)?,
            );
        }
        Ok(settings)
    }
}
