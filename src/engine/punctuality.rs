use crate::database::models::Timesheet;
use crate::engine::interval::TimeSpan;
use crate::engine::matcher::{ComparisonRecord, MatchStatus};
use crate::utils::time::minutes_between;
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

/// 遅刻・欠勤の判定しきい値（分）。デプロイごとに注入される設定で、
/// エンジン側に既定値は持たない
#[derive(Debug, Clone)]
pub struct PunctualityThresholds {
    pub grace_minutes: i64,
    pub absent_after_minutes: i64,
}

impl PunctualityThresholds {
    pub fn new(grace_minutes: i64, absent_after_minutes: i64) -> Result<Self> {
        if grace_minutes < 0 {
            return Err(anyhow::anyhow!(
                "PUNCTUALITY_GRACE_MINUTES must not be negative"
            ));
        }
        if absent_after_minutes <= grace_minutes {
            return Err(anyhow::anyhow!(
                "PUNCTUALITY_ABSENT_AFTER_MINUTES must be greater than the grace period"
            ));
        }
        Ok(Self {
            grace_minutes,
            absent_after_minutes,
        })
    }
}

/// 予定と実績が揃っている1件分の判定結果
#[derive(Debug, Clone)]
pub struct PairClassification {
    pub status: MatchStatus,
    pub start_delay_minutes: i64,
    pub end_delay_minutes: Option<i64>,
    pub break_deviation_minutes: Option<i64>,
}

/// 予定の時間帯と実績タイムシートから勤怠ステータスを判定する
///
/// 早出と残業はペナルティにしない。退勤打刻がなく確定できない場合は
/// unresolved（開始遅延だけで late/absent が確定する場合を除く）
pub fn classify_pair(
    span: &TimeSpan,
    timesheet: &Timesheet,
    thresholds: &PunctualityThresholds,
) -> PairClassification {
    let start_delay = minutes_between(span.start, timesheet.clock_in);
    let end_delay = timesheet
        .clock_out
        .map(|out| minutes_between(span.end, out));

    // 休憩のずれは、予定か実績のどちらかに休憩があるときだけ意味を持つ
    let has_actual_break = timesheet.break_start.is_some() || timesheet.break_end.is_some();
    let break_deviation = if span.contains_break() || has_actual_break {
        Some((timesheet.actual_break_minutes() - span.break_duration_minutes()).abs())
    } else {
        None
    };

    let status = if start_delay > thresholds.absent_after_minutes {
        MatchStatus::Absent
    } else if start_delay > thresholds.grace_minutes {
        MatchStatus::Late
    } else {
        match end_delay {
            Some(delay) if delay < -thresholds.grace_minutes => MatchStatus::EarlyLeave,
            Some(_) => MatchStatus::OnTime,
            None => MatchStatus::Unresolved,
        }
    };

    PairClassification {
        status,
        start_delay_minutes: start_delay,
        end_delay_minutes: end_delay,
        break_deviation_minutes: break_deviation,
    }
}

/// ステータスごとの件数集計。結合的・可換なので並列シャードごとに
/// 集計して merge できる
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PunctualitySummary {
    pub on_time: u64,
    pub late: u64,
    pub early_leave: u64,
    pub absent: u64,
    pub missing_schedule: u64,
    pub missing_timesheet: u64,
    pub unresolved: u64,
}

impl PunctualitySummary {
    pub fn record(&mut self, status: MatchStatus) {
        match status {
            MatchStatus::OnTime => self.on_time += 1,
            MatchStatus::Late => self.late += 1,
            MatchStatus::EarlyLeave => self.early_leave += 1,
            MatchStatus::Absent => self.absent += 1,
            MatchStatus::MissingSchedule => self.missing_schedule += 1,
            MatchStatus::MissingTimesheet => self.missing_timesheet += 1,
            MatchStatus::Unresolved => self.unresolved += 1,
        }
    }

    pub fn merge(&self, other: &PunctualitySummary) -> PunctualitySummary {
        PunctualitySummary {
            on_time: self.on_time + other.on_time,
            late: self.late + other.late,
            early_leave: self.early_leave + other.early_leave,
            absent: self.absent + other.absent,
            missing_schedule: self.missing_schedule + other.missing_schedule,
            missing_timesheet: self.missing_timesheet + other.missing_timesheet,
            unresolved: self.unresolved + other.unresolved,
        }
    }

    /// 定刻判定の対象になった件数（missing と unresolved は分母に含めない）
    pub fn assessed(&self) -> u64 {
        self.on_time + self.late + self.early_leave + self.absent
    }

    /// 定時率。対象件数が 0 のときは None
    pub fn punctuality_rate(&self) -> Option<f64> {
        let assessed = self.assessed();
        if assessed == 0 {
            None
        } else {
            Some(self.on_time as f64 / assessed as f64)
        }
    }
}

pub fn summarize<'a, I>(records: I) -> PunctualitySummary
where
    I: IntoIterator<Item = &'a ComparisonRecord>,
{
    let mut summary = PunctualitySummary::default();
    for record in records {
        summary.record(record.match_status);
    }
    summary
}

pub fn summarize_by_agency(records: &[ComparisonRecord]) -> BTreeMap<i64, PunctualitySummary> {
    let mut by_agency: BTreeMap<i64, PunctualitySummary> = BTreeMap::new();
    for record in records {
        by_agency
            .entry(record.agency_id)
            .or_default()
            .record(record.match_status);
    }
    by_agency
}

/// 直前の同じ長さの期間との比較
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendDelta {
    pub punctuality_rate_delta: Option<f64>,
    pub on_time_delta: i64,
    pub late_delta: i64,
    pub early_leave_delta: i64,
    pub absent_delta: i64,
    pub missing_timesheet_delta: i64,
}

impl TrendDelta {
    pub fn between(current: &PunctualitySummary, prior: &PunctualitySummary) -> Self {
        let rate_delta = match (current.punctuality_rate(), prior.punctuality_rate()) {
            (Some(now), Some(before)) => Some(now - before),
            _ => None,
        };
        Self {
            punctuality_rate_delta: rate_delta,
            on_time_delta: current.on_time as i64 - prior.on_time as i64,
            late_delta: current.late as i64 - prior.late as i64,
            early_leave_delta: current.early_leave as i64 - prior.early_leave as i64,
            absent_delta: current.absent as i64 - prior.absent as i64,
            missing_timesheet_delta: current.missing_timesheet as i64
                - prior.missing_timesheet as i64,
        }
    }
}
