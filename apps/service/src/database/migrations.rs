use libsql::Connection;

use super::StorageError;

/// Schema version - increment when making schema changes
pub const SCHEMA_VERSION: i32 = 2;

/// Run database migrations
pub async fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::debug!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    tracing::info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Monitors and incidents").await?;
    }

    if current_version < 2 {
        run_migration_v2(conn).await?;
        record_migration(conn, 2, "Single open incident per monitor").await?;
    }

    tracing::info!("Database migrations completed (now at version {})", SCHEMA_VERSION);
    Ok(())
}

async fn get_current_version(conn: &Connection) -> Result<i32, StorageError> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<(), StorageError> {
    let now = chrono::Utc::now().timestamp();

    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, now, description],
    )
    .await?;

    tracing::info!("Applied migration v{}: {}", version, description);
    Ok(())
}

/// Migration v1: monitors and incidents
async fn run_migration_v1(conn: &Connection) -> Result<(), StorageError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS monitors (
            id TEXT PRIMARY KEY,
            owner TEXT NOT NULL,
            name TEXT NOT NULL,
            url TEXT NOT NULL,
            method TEXT NOT NULL DEFAULT 'GET',
            headers TEXT NOT NULL DEFAULT '[]',
            timeout_seconds INTEGER NOT NULL DEFAULT 30,
            expected_status_code INTEGER NOT NULL DEFAULT 200,
            interval_minutes INTEGER NOT NULL DEFAULT 5,
            is_active INTEGER NOT NULL DEFAULT 1,
            status TEXT NOT NULL DEFAULT 'unknown',
            consecutive_failures INTEGER NOT NULL DEFAULT 0,
            total_checks INTEGER NOT NULL DEFAULT 0,
            successful_checks INTEGER NOT NULL DEFAULT 0,
            failed_checks INTEGER NOT NULL DEFAULT 0,
            uptime_percentage REAL NOT NULL DEFAULT 100,
            last_checked INTEGER,
            last_response_time_ms INTEGER,
            alert_email INTEGER NOT NULL DEFAULT 1,
            alert_slack INTEGER NOT NULL DEFAULT 0,
            version INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_monitors_owner_active ON monitors(owner, is_active)",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS incidents (
            id TEXT PRIMARY KEY,
            monitor_id TEXT NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'open',
            start_time INTEGER NOT NULL,
            end_time INTEGER,
            duration_minutes INTEGER,
            details TEXT NOT NULL DEFAULT '{}',
            notifications TEXT NOT NULL DEFAULT '[]',
            resolved_by TEXT,
            created_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_incidents_monitor_status ON incidents(monitor_id, status)",
        (),
    )
    .await?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_incidents_start_time ON incidents(start_time DESC)",
        (),
    )
    .await?;

    Ok(())
}

/// Migration v2: storage-level guard for the one-open-incident rule
async fn run_migration_v2(conn: &Connection) -> Result<(), StorageError> {
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_incidents_one_open
            ON incidents(monitor_id) WHERE status IN ('open', 'acknowledged')",
        (),
    )
    .await?;

    Ok(())
}
