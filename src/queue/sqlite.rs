/// SQLite-backed durable queue
///
/// Jobs live in the `reset_jobs` table of the same database as the streaks.
/// Claiming is a single UPDATE under the connection lock, so two workers can
/// never hold the same job.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::queue::{
    FailureDisposition, JobId, JobQueue, JobStatus, QueueError, QueueOptions, QueueStats, QueuedJob,
    ResetJob,
};
use crate::storage::sqlite::{format_timestamp, parse_timestamp};
use crate::storage::SqliteStorage;

const JOB_COLUMNS: &str = "id, payload, options, status, attempts, run_after, last_error, created_at";

fn job_from_row(row: &Row) -> rusqlite::Result<QueuedJob> {
    let payload: String = row.get(1)?;
    let job: ResetJob = serde_json::from_str(&payload).map_err(|_| {
        rusqlite::Error::InvalidColumnType(1, "Invalid job payload".to_string(), rusqlite::types::Type::Text)
    })?;

    let options_json: String = row.get(2)?;
    let options: QueueOptions = serde_json::from_str(&options_json).map_err(|_| {
        rusqlite::Error::InvalidColumnType(2, "Invalid job options".to_string(), rusqlite::types::Type::Text)
    })?;

    let status_str: String = row.get(3)?;
    let status = JobStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(3, "Invalid job status".to_string(), rusqlite::types::Type::Text)
    })?;

    let run_after: String = row.get(5)?;
    let created_at: String = row.get(7)?;

    Ok(QueuedJob {
        id: JobId(row.get(0)?),
        job,
        options,
        status,
        attempts: row.get(4)?,
        run_after: parse_timestamp(5, &run_after)?,
        last_error: row.get(6)?,
        created_at: parse_timestamp(7, &created_at)?,
    })
}

fn load_job(conn: &Connection, id: JobId) -> Result<QueuedJob, QueueError> {
    conn.query_row(
        &format!("SELECT {} FROM reset_jobs WHERE id = ?1", JOB_COLUMNS),
        params![id.0],
        job_from_row,
    )
    .optional()?
    .ok_or(QueueError::JobNotFound(id))
}

fn expect_status(job: &QueuedJob, expected: JobStatus) -> Result<(), QueueError> {
    if job.status != expected {
        return Err(QueueError::InvalidState { id: job.id, status: job.status, expected });
    }
    Ok(())
}

/// Park or discard an exhausted job according to its options
fn finish_failed(conn: &Connection, job: &QueuedJob, reason: &str) -> Result<FailureDisposition, QueueError> {
    if job.options.retain_on_failure {
        conn.execute(
            "UPDATE reset_jobs SET status = 'failed', last_error = ?2 WHERE id = ?1",
            params![job.id.0, reason],
        )?;
        tracing::error!(
            job_id = %job.id,
            attempts = job.attempts,
            "Reset job for {} parked in failed set: {}",
            job.job.key(), reason
        );
        Ok(FailureDisposition::Parked)
    } else {
        conn.execute("DELETE FROM reset_jobs WHERE id = ?1", params![job.id.0])?;
        tracing::error!(job_id = %job.id, "Reset job for {} discarded: {}", job.job.key(), reason);
        Ok(FailureDisposition::Discarded)
    }
}

impl JobQueue for SqliteStorage {
    fn enqueue_all(
        &self,
        jobs: &[ResetJob],
        options: &QueueOptions,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobId>, QueueError> {
        let options_json = serde_json::to_string(options)?;
        let created_at = format_timestamp(now);

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut ids = Vec::with_capacity(jobs.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO reset_jobs (user_id, habit_id, payload, options, status, attempts, run_after, created_at)
                 VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5, ?5)",
            )?;
            for job in jobs {
                stmt.execute(params![
                    job.user_id.to_string(),
                    job.habit_id.to_string(),
                    serde_json::to_string(job)?,
                    options_json,
                    created_at,
                ])?;
                ids.push(JobId(tx.last_insert_rowid()));
            }
        }
        tx.commit()?;

        tracing::debug!("Enqueued {} reset jobs", ids.len());
        Ok(ids)
    }

    fn claim(&self, now: DateTime<Utc>) -> Result<Option<QueuedJob>, QueueError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let next: Option<i64> = tx
            .query_row(
                "SELECT id FROM reset_jobs
                 WHERE status = 'pending' AND run_after <= ?1
                 ORDER BY run_after, id LIMIT 1",
                params![format_timestamp(now)],
                |row| row.get(0),
            )
            .optional()?;

        let Some(id) = next else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE reset_jobs SET status = 'active', attempts = attempts + 1 WHERE id = ?1",
            params![id],
        )?;
        let job = load_job(&tx, JobId(id))?;
        tx.commit()?;

        Ok(Some(job))
    }

    fn complete(&self, id: JobId) -> Result<(), QueueError> {
        let conn = self.lock()?;
        let job = load_job(&conn, id)?;
        expect_status(&job, JobStatus::Active)?;

        if job.options.remove_on_success {
            conn.execute("DELETE FROM reset_jobs WHERE id = ?1", params![id.0])?;
        } else {
            conn.execute(
                "UPDATE reset_jobs SET status = 'completed', last_error = NULL WHERE id = ?1",
                params![id.0],
            )?;
        }
        Ok(())
    }

    fn fail(&self, id: JobId, reason: &str, now: DateTime<Utc>) -> Result<FailureDisposition, QueueError> {
        let conn = self.lock()?;
        let job = load_job(&conn, id)?;
        expect_status(&job, JobStatus::Active)?;

        if job.attempts >= job.options.max_attempts {
            return finish_failed(&conn, &job, reason);
        }

        let delay = job.options.backoff.delay_for(job.attempts);
        let run_after = now + Duration::milliseconds(delay.as_millis() as i64);
        conn.execute(
            "UPDATE reset_jobs SET status = 'pending', run_after = ?2, last_error = ?3 WHERE id = ?1",
            params![id.0, format_timestamp(run_after), reason],
        )?;

        tracing::warn!(
            job_id = %id,
            attempt = job.attempts,
            max_attempts = job.options.max_attempts,
            "Reset job for {} failed, retrying in {:?}: {}",
            job.job.key(), delay, reason
        );
        Ok(FailureDisposition::Retrying { attempt: job.attempts, run_after })
    }

    fn park(&self, id: JobId, reason: &str) -> Result<(), QueueError> {
        let conn = self.lock()?;
        let mut job = load_job(&conn, id)?;
        expect_status(&job, JobStatus::Active)?;
        // Terminal errors are always kept, whatever the retention option says
        job.options.retain_on_failure = true;
        finish_failed(&conn, &job, reason)?;
        Ok(())
    }

    fn requeue_stale(&self) -> Result<usize, QueueError> {
        let conn = self.lock()?;
        let count = conn.execute("UPDATE reset_jobs SET status = 'pending' WHERE status = 'active'", [])?;
        if count > 0 {
            tracing::warn!("Requeued {} reset jobs left active by a previous run", count);
        }
        Ok(count)
    }

    fn failed_jobs(&self) -> Result<Vec<QueuedJob>, QueueError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM reset_jobs WHERE status = 'failed' ORDER BY id",
            JOB_COLUMNS
        ))?;
        let job_iter = stmt.query_map([], job_from_row)?;

        let mut jobs = Vec::new();
        for job in job_iter {
            jobs.push(job?);
        }
        Ok(jobs)
    }

    fn retry_failed(&self, id: JobId, now: DateTime<Utc>) -> Result<(), QueueError> {
        let conn = self.lock()?;
        let job = load_job(&conn, id)?;
        expect_status(&job, JobStatus::Failed)?;

        conn.execute(
            "UPDATE reset_jobs SET status = 'pending', attempts = 0, run_after = ?2 WHERE id = ?1",
            params![id.0, format_timestamp(now)],
        )?;
        tracing::info!(job_id = %id, "Failed reset job for {} requeued", job.job.key());
        Ok(())
    }

    fn stats(&self) -> Result<QueueStats, QueueError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM reset_jobs GROUP BY status")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

        let mut stats = QueueStats::default();
        for row in rows {
            let (status, count) = row?;
            let count = count.max(0) as u64;
            match JobStatus::parse(&status) {
                Some(JobStatus::Pending) => stats.pending = count,
                Some(JobStatus::Active) => stats.active = count,
                Some(JobStatus::Completed) => stats.completed = count,
                Some(JobStatus::Failed) => stats.failed = count,
                None => tracing::warn!(status = %status, "Unknown job status in queue"),
            }
        }
        Ok(stats)
    }
}
