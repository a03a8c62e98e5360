use crate::database::models::Schedule;
use crate::engine::interval::TimeSpan;
use crate::utils::format::format_time_range;
use crate::utils::time::{format_duration_minutes, minutes_between};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Overlap,
    Duplicate,
    InvalidTime,
    ValidationError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// 検出された競合。永続化されない一時的な値
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub kind: ConflictKind,
    pub severity: Severity,
    pub message: String,
    pub related_schedule_id: Option<i64>,
}

/// 軽微な重複とみなす境界（分）。定数ではなく設定値
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub minor_overlap_minutes: i64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            minor_overlap_minutes: 15,
        }
    }
}

/// 検証対象のシフト下書き。未保存で、検証呼び出しの間だけ呼び出し側が所有する
#[derive(Debug, Clone)]
pub struct ScheduleDraft {
    pub worker_id: i64,
    pub agency_id: i64,
    pub span: TimeSpan,
    pub notes: Option<String>,
}

/// 下書きシフトを既存シフトと突き合わせて競合を検出する
///
/// 入力を変更しない純粋関数。時間帯が不正な場合は invalid_time の
/// 1件だけを返し、重複走査は行わない。結果は error が先、同じ重大度
/// 内では相手シフトの開始時刻順
pub fn detect(
    draft: &ScheduleDraft,
    existing: &[Schedule],
    exclude_id: Option<i64>,
    config: &DetectorConfig,
) -> Vec<Conflict> {
    if let Err(e) = draft.span.validate() {
        return vec![Conflict {
            kind: ConflictKind::InvalidTime,
            severity: Severity::Error,
            message: e.to_string(),
            related_schedule_id: None,
        }];
    }

    let mut found: Vec<(Conflict, NaiveTime)> = Vec::new();

    for schedule in existing {
        // 同一ワーカー・同一日の有効なシフトのみが対象。編集中の
        // シフト自身（exclude_id）は除外する
        if schedule.worker_id != draft.worker_id {
            continue;
        }
        if schedule.date != draft.span.date {
            continue;
        }
        if !schedule.is_active() {
            continue;
        }
        if exclude_id == Some(schedule.id) {
            continue;
        }

        let span = schedule.time_span();
        if !draft.span.overlaps(&span) {
            continue;
        }

        let conflict = if draft.span.identical_times(&span) {
            Conflict {
                kind: ConflictKind::Duplicate,
                severity: Severity::Error,
                message: format!(
                    "同一時間帯のシフトが既に存在します（{}）",
                    format_time_range(&span)
                ),
                related_schedule_id: Some(schedule.id),
            }
        } else {
            let Some((overlap_start, overlap_end)) = draft.span.overlap_window(&span) else {
                continue;
            };
            let overlap_minutes = minutes_between(overlap_start, overlap_end);

            let severity = if overlap_minutes <= config.minor_overlap_minutes
                || within_break(&draft.span, overlap_start, overlap_end)
                || within_break(&span, overlap_start, overlap_end)
            {
                Severity::Warning
            } else {
                Severity::Error
            };

            Conflict {
                kind: ConflictKind::Overlap,
                severity,
                message: format!(
                    "既存のシフト（{}）と重複しています（重複時間: {}）",
                    format_time_range(&span),
                    format_duration_minutes(overlap_minutes)
                ),
                related_schedule_id: Some(schedule.id),
            }
        };

        found.push((conflict, span.start));
    }

    found.sort_by_key(|(conflict, start)| (severity_rank(conflict.severity), *start));
    found.into_iter().map(|(conflict, _)| conflict).collect()
}

/// error 重大度の競合がひとつもなければ有効。warning は提出を妨げない
pub fn is_valid(conflicts: &[Conflict]) -> bool {
    !conflicts.iter().any(|c| c.severity == Severity::Error)
}

fn severity_rank(severity: Severity) -> u8 {
    match severity {
        Severity::Error => 0,
        Severity::Warning => 1,
    }
}

// どちらかの休憩枠に収まる重複は実働が重ならないので警告扱い
fn within_break(span: &TimeSpan, start: NaiveTime, end: NaiveTime) -> bool {
    span.break_window()
        .map(|(bs, be)| bs <= start && end <= be)
        .unwrap_or(false)
}

/// 検証1回分の結果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub conflicts: Vec<Conflict>,
    pub is_valid: bool,
}

impl ValidationResult {
    /// 検証対象なし（未入力の下書きなど）に対する中立な結果
    pub fn neutral() -> Self {
        Self {
            conflicts: Vec::new(),
            is_valid: true,
        }
    }

    pub fn from_conflicts(conflicts: Vec<Conflict>) -> Self {
        let is_valid = is_valid(&conflicts);
        Self { conflicts, is_valid }
    }

    /// 既存シフトの取得に失敗したときの結果。リトライはせず次の操作に委ねる
    pub fn lookup_failure() -> Self {
        Self {
            conflicts: vec![Conflict {
                kind: ConflictKind::ValidationError,
                severity: Severity::Warning,
                message: "シフト情報の取得に失敗しました。時間をおいて再度お試しください"
                    .to_string(),
                related_schedule_id: None,
            }],
            is_valid: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, 1).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn draft(start: NaiveTime, end: NaiveTime) -> ScheduleDraft {
        ScheduleDraft {
            worker_id: 1,
            agency_id: 10,
            span: TimeSpan::new(date(), start, end),
            notes: None,
        }
    }

    fn schedule(id: i64, worker_id: i64, start: NaiveTime, end: NaiveTime) -> Schedule {
        let now = Utc::now();
        Schedule {
            id,
            worker_id,
            agency_id: 10,
            date: date(),
            start_time: start,
            end_time: end,
            break_start: None,
            break_end: None,
            status: "active".to_string(),
            notes: None,
            created_by: 99,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn non_overlapping_spans_yield_no_conflicts() {
        let existing = vec![schedule(1, 1, t(9, 0), t(12, 0))];
        let conflicts = detect(
            &draft(t(12, 0), t(17, 0)),
            &existing,
            None,
            &DetectorConfig::default(),
        );
        assert!(conflicts.is_empty());
    }

    #[test]
    fn invalid_span_short_circuits_with_single_error() {
        let existing = vec![schedule(1, 1, t(9, 0), t(17, 0))];
        let conflicts = detect(
            &draft(t(17, 0), t(9, 0)),
            &existing,
            None,
            &DetectorConfig::default(),
        );
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::InvalidTime);
        assert_eq!(conflicts[0].severity, Severity::Error);
        assert!(!is_valid(&conflicts));
    }

    #[test]
    fn identical_times_classify_as_duplicate_not_overlap() {
        let existing = vec![schedule(1, 1, t(9, 0), t(17, 0))];
        let conflicts = detect(
            &draft(t(9, 0), t(17, 0)),
            &existing,
            None,
            &DetectorConfig::default(),
        );
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::Duplicate);
        assert_eq!(conflicts[0].severity, Severity::Error);
        assert_eq!(conflicts[0].related_schedule_id, Some(1));
    }

    #[test]
    fn same_times_but_different_break_is_plain_overlap() {
        let mut existing = schedule(1, 1, t(9, 0), t(17, 0));
        existing.break_start = Some(t(12, 0));
        existing.break_end = Some(t(13, 0));
        let conflicts = detect(
            &draft(t(9, 0), t(17, 0)),
            &[existing],
            None,
            &DetectorConfig::default(),
        );
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::Overlap);
    }

    #[test]
    fn short_overlap_is_a_warning() {
        let existing = vec![schedule(1, 1, t(9, 0), t(17, 0))];
        // 16:50〜17:00 の10分だけ重なる
        let conflicts = detect(
            &draft(t(16, 50), t(21, 0)),
            &existing,
            None,
            &DetectorConfig::default(),
        );
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].severity, Severity::Warning);
        assert!(is_valid(&conflicts));
    }

    #[test]
    fn long_overlap_is_an_error() {
        let existing = vec![schedule(1, 1, t(9, 0), t(17, 0))];
        let conflicts = detect(
            &draft(t(13, 0), t(21, 0)),
            &existing,
            None,
            &DetectorConfig::default(),
        );
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].severity, Severity::Error);
        assert!(!is_valid(&conflicts));
    }

    #[test]
    fn overlap_confined_to_break_window_is_a_warning() {
        let mut existing = schedule(1, 1, t(9, 0), t(17, 0));
        existing.break_start = Some(t(12, 0));
        existing.break_end = Some(t(13, 0));
        // 12:00〜13:00 の60分重なるが、既存シフトの休憩枠内に収まる
        let conflicts = detect(
            &draft(t(12, 0), t(13, 0)),
            &[existing],
            None,
            &DetectorConfig::default(),
        );
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].severity, Severity::Warning);
    }

    #[test]
    fn cancelled_and_other_worker_schedules_are_ignored() {
        let mut cancelled = schedule(1, 1, t(9, 0), t(17, 0));
        cancelled.status = "cancelled".to_string();
        let other_worker = schedule(2, 2, t(9, 0), t(17, 0));
        let conflicts = detect(
            &draft(t(9, 0), t(17, 0)),
            &[cancelled, other_worker],
            None,
            &DetectorConfig::default(),
        );
        assert!(conflicts.is_empty());
    }

    #[test]
    fn excluded_schedule_is_skipped_when_editing() {
        let existing = vec![schedule(5, 1, t(9, 0), t(17, 0))];
        let conflicts = detect(
            &draft(t(9, 0), t(17, 0)),
            &existing,
            Some(5),
            &DetectorConfig::default(),
        );
        assert!(conflicts.is_empty());
    }

    #[test]
    fn errors_come_first_then_start_time_ascending() {
        let existing = vec![
            schedule(1, 1, t(16, 50), t(18, 0)), // 10分重複 → warning
            schedule(2, 1, t(13, 0), t(15, 0)),  // 完全内包 → error
            schedule(3, 1, t(10, 0), t(12, 0)),  // 完全内包 → error
        ];
        let conflicts = detect(
            &draft(t(9, 0), t(17, 0)),
            &existing,
            None,
            &DetectorConfig::default(),
        );
        assert_eq!(conflicts.len(), 3);
        assert_eq!(conflicts[0].related_schedule_id, Some(3));
        assert_eq!(conflicts[1].related_schedule_id, Some(2));
        assert_eq!(conflicts[2].related_schedule_id, Some(1));
        assert_eq!(conflicts[2].severity, Severity::Warning);
    }

    #[test]
    fn detect_is_idempotent() {
        let existing = vec![
            schedule(1, 1, t(10, 0), t(12, 0)),
            schedule(2, 1, t(13, 0), t(15, 0)),
        ];
        let d = draft(t(9, 0), t(17, 0));
        let first = detect(&d, &existing, None, &DetectorConfig::default());
        let second = detect(&d, &existing, None, &DetectorConfig::default());
        assert_eq!(first, second);
    }

    #[test]
    fn lookup_failure_result_is_invalid_warning() {
        let result = ValidationResult::lookup_failure();
        assert!(!result.is_valid);
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].kind, ConflictKind::ValidationError);
        assert_eq!(result.conflicts[0].severity, Severity::Warning);
    }
}
