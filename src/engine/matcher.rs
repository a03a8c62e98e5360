use crate::database::models::{Schedule, Timesheet, TimesheetStatus};
use crate::engine::interval::TimeSpan;
use crate::engine::punctuality::{PunctualityThresholds, classify_pair};
use crate::utils::time::minutes_between;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    OnTime,
    Late,
    EarlyLeave,
    Absent,
    MissingSchedule,
    MissingTimesheet,
    Unresolved,
}

/// ワーカー×日付×派遣先ごとの予実突き合わせ結果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRecord {
    pub worker_id: i64,
    pub agency_id: i64,
    pub date: NaiveDate,
    pub schedule: Option<Schedule>,
    pub timesheet: Option<Timesheet>,
    pub match_status: MatchStatus,
    pub start_delay_minutes: Option<i64>,
    pub end_delay_minutes: Option<i64>,
    pub break_deviation_minutes: Option<i64>,
    pub planned_minutes: Option<i64>,
    pub actual_minutes: Option<i64>,
}

/// 休憩を除いた予定実働時間（分）
fn planned_minutes(span: &TimeSpan) -> i64 {
    span.duration_minutes() - span.break_duration_minutes()
}

/// 休憩を除いた実働時間（分）。退勤打刻がなければ確定しない
fn actual_minutes(timesheet: &Timesheet) -> Option<i64> {
    timesheet
        .clock_out
        .map(|out| minutes_between(timesheet.clock_in, out) - timesheet.actual_break_minutes())
}

/// 予定（シフト）と実績（タイムシート）を期間内で突き合わせる
///
/// 入力は呼び出し側が取得したスナップショット。純粋関数で、
/// 同一キーに複数行がある場合は updated_at が最新のものを採用する
/// （データ品質の問題でありエラーではない）。結果は
/// (日付, ワーカー, 派遣先) の昇順
pub fn compare(
    schedules: &[Schedule],
    timesheets: &[Timesheet],
    from: NaiveDate,
    to: NaiveDate,
    today: NaiveDate,
    thresholds: &PunctualityThresholds,
) -> Vec<ComparisonRecord> {
    type Key = (NaiveDate, i64, i64);
    let mut paired: BTreeMap<Key, (Option<&Schedule>, Option<&Timesheet>)> = BTreeMap::new();

    for schedule in schedules {
        if schedule.date < from || schedule.date > to {
            continue;
        }
        if !schedule.is_active() {
            continue;
        }
        let key = (schedule.date, schedule.worker_id, schedule.agency_id);
        let slot = paired.entry(key).or_default();
        match slot.0 {
            None => slot.0 = Some(schedule),
            Some(current) => {
                warn!(
                    "Multiple active schedules for worker_id={} on {}: keeping most recently updated",
                    schedule.worker_id, schedule.date
                );
                if schedule.updated_at > current.updated_at {
                    slot.0 = Some(schedule);
                }
            }
        }
    }

    for timesheet in timesheets {
        if timesheet.date < from || timesheet.date > to {
            continue;
        }
        let key = (timesheet.date, timesheet.worker_id, timesheet.agency_id);
        let slot = paired.entry(key).or_default();
        match slot.1 {
            None => slot.1 = Some(timesheet),
            Some(current) => {
                warn!(
                    "Multiple timesheets for worker_id={} on {}: keeping most recently updated",
                    timesheet.worker_id, timesheet.date
                );
                if timesheet.updated_at > current.updated_at {
                    slot.1 = Some(timesheet);
                }
            }
        }
    }

    let mut records = Vec::new();

    for ((date, worker_id, agency_id), pair) in paired {
        let record = match pair {
            (Some(schedule), Some(timesheet)) => {
                if timesheet.clock_out.is_none()
                    && timesheet.status() == TimesheetStatus::Finished
                {
                    warn!(
                        "Timesheet id={} is marked finished but has no clock-out",
                        timesheet.id
                    );
                }

                let span = schedule.time_span();
                let c = classify_pair(&span, timesheet, thresholds);
                ComparisonRecord {
                    worker_id,
                    agency_id,
                    date,
                    schedule: Some(schedule.clone()),
                    timesheet: Some(timesheet.clone()),
                    match_status: c.status,
                    start_delay_minutes: Some(c.start_delay_minutes),
                    end_delay_minutes: c.end_delay_minutes,
                    break_deviation_minutes: c.break_deviation_minutes,
                    planned_minutes: Some(planned_minutes(&span)),
                    actual_minutes: actual_minutes(timesheet),
                }
            }
            (None, Some(timesheet)) => ComparisonRecord {
                worker_id,
                agency_id,
                date,
                schedule: None,
                timesheet: Some(timesheet.clone()),
                match_status: MatchStatus::MissingSchedule,
                start_delay_minutes: None,
                end_delay_minutes: None,
                break_deviation_minutes: None,
                planned_minutes: None,
                actual_minutes: actual_minutes(timesheet),
            },
            (Some(schedule), None) => {
                // 当日以降は未確定なのでレコードを出さない
                if date >= today {
                    continue;
                }
                ComparisonRecord {
                    worker_id,
                    agency_id,
                    date,
                    schedule: Some(schedule.clone()),
                    timesheet: None,
                    match_status: MatchStatus::MissingTimesheet,
                    start_delay_minutes: None,
                    end_delay_minutes: None,
                    break_deviation_minutes: None,
                    planned_minutes: Some(planned_minutes(&schedule.time_span())),
                    actual_minutes: None,
                }
            }
            (None, None) => continue,
        };
        records.push(record);
    }

    records
}
