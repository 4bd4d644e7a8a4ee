//! Durable job records.

use think_core::types::{Job, JobStatus, JobUpdate};
use think_core::{Error, Result};
use uuid::Uuid;

use super::{now_ts, storage_err, ts_to_datetime};
use crate::LibsqlStore;

fn row_to_job(row: &libsql::Row) -> Result<Job> {
    let id_str: String = row.get(0).map_err(storage_err)?;
    let status_str: String = row.get(2).map_err(storage_err)?;
    Ok(Job {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| Error::Storage(format!("Invalid job id: {e}")))?,
        job_type: row.get(1).map_err(storage_err)?,
        status: status_str.parse().unwrap_or(JobStatus::Failed),
        params: row
            .get::<String>(3)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok()),
        result: row
            .get::<String>(4)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok()),
        error: row.get::<String>(5).ok(),
        progress: row.get::<i64>(6).ok().unwrap_or(0),
        processed: row.get::<i64>(7).ok().unwrap_or(0),
        failed: row.get::<i64>(8).ok().unwrap_or(0),
        total: row.get::<i64>(9).ok().unwrap_or(0),
        created_at: ts_to_datetime(row.get(10).map_err(storage_err)?),
        started_at: row.get::<i64>(11).ok().map(ts_to_datetime),
        completed_at: row.get::<i64>(12).ok().map(ts_to_datetime),
    })
}

const JOB_COLUMNS: &str = "id, type, status, params, result, error, progress, processed, \
    failed, total, created_at, started_at, completed_at";

impl LibsqlStore {
    pub async fn create_job(
        &self,
        job_type: &str,
        params: Option<serde_json::Value>,
    ) -> Result<Job> {
        let id = Uuid::new_v4();
        let params_json = params
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(Error::Serialization)?;
        let created_at = now_ts();

        let conn = self.writer().await;
        conn.execute(
            "INSERT INTO jobs (id, type, status, params, created_at) VALUES (?, ?, 'pending', ?, ?)",
            libsql::params![id.to_string(), job_type, params_json, created_at],
        )
        .await
        .map_err(storage_err)?;

        Ok(Job {
            id,
            job_type: job_type.to_string(),
            status: JobStatus::Pending,
            params,
            result: None,
            error: None,
            progress: 0,
            processed: 0,
            failed: 0,
            total: 0,
            created_at: ts_to_datetime(created_at),
            started_at: None,
            completed_at: None,
        })
    }

    pub async fn get_job(&self, id: Uuid) -> Result<Option<Job>> {
        let conn = self.reader().await?;
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?");
        let mut rows = conn
            .query(&sql, libsql::params![id.to_string()])
            .await
            .map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_job(&row)?)),
            None => Ok(None),
        }
    }

    /// Apply the non-`None` fields of the update.
    pub async fn update_job(&self, id: Uuid, update: JobUpdate) -> Result<bool> {
        let mut sets = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();

        if let Some(status) = update.status {
            sets.push("status = ?");
            params.push(libsql::Value::Text(status.as_str().to_string()));
        }
        if let Some(progress) = update.progress {
            sets.push("progress = ?");
            params.push(libsql::Value::Integer(progress));
        }
        if let Some(processed) = update.processed {
            sets.push("processed = ?");
            params.push(libsql::Value::Integer(processed));
        }
        if let Some(failed) = update.failed {
            sets.push("failed = ?");
            params.push(libsql::Value::Integer(failed));
        }
        if let Some(total) = update.total {
            sets.push("total = ?");
            params.push(libsql::Value::Integer(total));
        }
        if let Some(result) = &update.result {
            sets.push("result = ?");
            params.push(libsql::Value::Text(
                serde_json::to_string(result).map_err(Error::Serialization)?,
            ));
        }
        if let Some(error) = &update.error {
            sets.push("error = ?");
            params.push(libsql::Value::Text(error.clone()));
        }
        if let Some(started_at) = update.started_at {
            sets.push("started_at = ?");
            params.push(libsql::Value::Integer(started_at.timestamp()));
        }
        if let Some(completed_at) = update.completed_at {
            sets.push("completed_at = ?");
            params.push(libsql::Value::Integer(completed_at.timestamp()));
        }

        if sets.is_empty() {
            return Ok(true);
        }
        params.push(libsql::Value::Text(id.to_string()));

        let sql = format!("UPDATE jobs SET {} WHERE id = ?", sets.join(", "));
        let conn = self.writer().await;
        let changed = conn
            .execute(&sql, libsql::params_from_iter(params))
            .await
            .map_err(storage_err)?;
        Ok(changed > 0)
    }

    /// Most recent pending/running job of a type.
    pub async fn active_job(&self, job_type: &str) -> Result<Option<Job>> {
        let conn = self.reader().await?;
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE type = ? AND status IN ('pending', 'running') \
             ORDER BY created_at DESC, id DESC LIMIT 1"
        );
        let mut rows = conn
            .query(&sql, libsql::params![job_type])
            .await
            .map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_job(&row)?)),
            None => Ok(None),
        }
    }
}
