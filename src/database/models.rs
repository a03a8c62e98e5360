use crate::engine::interval::TimeSpan;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 管理画面で作成される勤務予定（シフト）。このエンジンからは読み取り専用
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: i64,
    pub worker_id: i64,
    pub agency_id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub break_start: Option<NaiveTime>,
    pub break_end: Option<NaiveTime>,
    pub status: String, // "active", "cancelled" or "completed"
    pub notes: Option<String>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    pub fn time_span(&self) -> TimeSpan {
        TimeSpan {
            date: self.date,
            start: self.start_time,
            end: self.end_time,
            break_start: self.break_start,
            break_end: self.break_end,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ScheduleStatus::Active.as_str()
    }
}

/// 打刻によって作られる実績記録。モバイルアプリ側が作成・更新する
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timesheet {
    pub id: i64,
    pub worker_id: i64,
    pub agency_id: i64,
    pub date: NaiveDate,
    pub clock_in: NaiveTime,
    pub clock_out: Option<NaiveTime>,
    pub break_start: Option<NaiveTime>,
    pub break_end: Option<NaiveTime>,
    pub current_status: String, // "not_started", "working", "on_break" or "finished"
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Timesheet {
    pub fn status(&self) -> TimesheetStatus {
        TimesheetStatus::from(self.current_status.clone())
    }

    /// 実際に取得した休憩時間（分）。片側しか記録がない場合は 0
    pub fn actual_break_minutes(&self) -> i64 {
        match (self.break_start, self.break_end) {
            (Some(bs), Some(be)) if be > bs => be.signed_duration_since(bs).num_minutes(),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleStatus {
    Active,
    Cancelled,
    Completed,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Active => "active",
            ScheduleStatus::Cancelled => "cancelled",
            ScheduleStatus::Completed => "completed",
        }
    }
}

impl From<String> for ScheduleStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "active" => ScheduleStatus::Active,
            "cancelled" => ScheduleStatus::Cancelled,
            "completed" => ScheduleStatus::Completed,
            _ => panic!("Invalid schedule status: {}", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimesheetStatus {
    NotStarted,
    Working,
    OnBreak,
    Finished,
}

impl TimesheetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimesheetStatus::NotStarted => "not_started",
            TimesheetStatus::Working => "working",
            TimesheetStatus::OnBreak => "on_break",
            TimesheetStatus::Finished => "finished",
        }
    }
}

impl From<String> for TimesheetStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "not_started" => TimesheetStatus::NotStarted,
            "working" => TimesheetStatus::Working,
            "on_break" => TimesheetStatus::OnBreak,
            "finished" => TimesheetStatus::Finished,
            _ => panic!("Invalid timesheet status: {}", s),
        }
    }
}
