use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    create_schedules_table(pool).await?;
    create_timesheets_table(pool).await?;
    create_indexes(pool).await?;

    info!("Database migrations completed successfully");
    Ok(())
}

async fn create_schedules_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schedules (
            id INTEGER PRIMARY KEY,
            worker_id INTEGER NOT NULL,
            agency_id INTEGER NOT NULL,
            date DATE NOT NULL,
            start_time TIME NOT NULL,
            end_time TIME NOT NULL,
            break_start TIME,
            break_end TIME,
            status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'cancelled', 'completed')),
            notes TEXT,
            created_by INTEGER NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_timesheets_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS timesheets (
            id INTEGER PRIMARY KEY,
            worker_id INTEGER NOT NULL,
            agency_id INTEGER NOT NULL,
            date DATE NOT NULL,
            clock_in TIME NOT NULL,
            clock_out TIME,
            break_start TIME,
            break_end TIME,
            current_status TEXT NOT NULL DEFAULT 'working' CHECK (current_status IN ('not_started', 'working', 'on_break', 'finished')),
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_indexes(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_schedules_worker_date ON schedules (worker_id, date)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_timesheets_worker_date ON timesheets (worker_id, date)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
