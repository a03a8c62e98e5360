use crate::database::models::{Schedule, ScheduleStatus, Timesheet};
use crate::engine::coordinator::ScheduleLookup;
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::SqlitePool;

const SCHEDULE_COLUMNS: &str = "id, worker_id, agency_id, date, start_time, end_time, \
     break_start, break_end, status, notes, created_by, created_at, updated_at";

const TIMESHEET_COLUMNS: &str = "id, worker_id, agency_id, date, clock_in, clock_out, \
     break_start, break_end, current_status, created_at, updated_at";

/// 競合検出用: 指定ワーカー・指定日の有効なシフトを取得
pub async fn get_active_schedules(
    pool: &SqlitePool,
    worker_id: i64,
    date: NaiveDate,
) -> Result<Vec<Schedule>> {
    let sql = format!(
        "SELECT {SCHEDULE_COLUMNS} FROM schedules \
         WHERE worker_id = ? AND date = ? AND status = ? \
         ORDER BY start_time ASC"
    );

    let schedules = sqlx::query_as::<_, Schedule>(&sql)
        .bind(worker_id)
        .bind(date)
        .bind(ScheduleStatus::Active.as_str())
        .fetch_all(pool)
        .await?;

    Ok(schedules)
}

/// 予実突き合わせ用: 期間内のシフトを取得（状態は問わない）
pub async fn get_schedules_by_date_range(
    pool: &SqlitePool,
    from: NaiveDate,
    to: NaiveDate,
    agency_id: Option<i64>,
    worker_id: Option<i64>,
) -> Result<Vec<Schedule>> {
    let mut sql = format!(
        "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE date >= ? AND date <= ?"
    );
    if agency_id.is_some() {
        sql.push_str(" AND agency_id = ?");
    }
    if worker_id.is_some() {
        sql.push_str(" AND worker_id = ?");
    }
    sql.push_str(" ORDER BY date ASC, start_time ASC");

    let mut query = sqlx::query_as::<_, Schedule>(&sql).bind(from).bind(to);
    if let Some(agency_id) = agency_id {
        query = query.bind(agency_id);
    }
    if let Some(worker_id) = worker_id {
        query = query.bind(worker_id);
    }

    Ok(query.fetch_all(pool).await?)
}

/// 予実突き合わせ用: 期間内のタイムシートを取得
pub async fn get_timesheets_by_date_range(
    pool: &SqlitePool,
    from: NaiveDate,
    to: NaiveDate,
    agency_id: Option<i64>,
    worker_id: Option<i64>,
) -> Result<Vec<Timesheet>> {
    let mut sql = format!(
        "SELECT {TIMESHEET_COLUMNS} FROM timesheets WHERE date >= ? AND date <= ?"
    );
    if agency_id.is_some() {
        sql.push_str(" AND agency_id = ?");
    }
    if worker_id.is_some() {
        sql.push_str(" AND worker_id = ?");
    }
    sql.push_str(" ORDER BY date ASC, clock_in ASC");

    let mut query = sqlx::query_as::<_, Timesheet>(&sql).bind(from).bind(to);
    if let Some(agency_id) = agency_id {
        query = query.bind(agency_id);
    }
    if let Some(worker_id) = worker_id {
        query = query.bind(worker_id);
    }

    Ok(query.fetch_all(pool).await?)
}

/// コーディネーターに差し込むデータベース版のシフト参照
#[derive(Clone)]
pub struct DbScheduleLookup {
    pool: SqlitePool,
}

impl DbScheduleLookup {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleLookup for DbScheduleLookup {
    async fn active_schedules(&self, worker_id: i64, date: NaiveDate) -> Result<Vec<Schedule>> {
        get_active_schedules(&self.pool, worker_id, date).await
    }
}
