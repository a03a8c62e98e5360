use crate::api::{ApiError, AppState};
use crate::database::queries::{self, DbScheduleLookup};
use crate::engine::conflict::{self, Conflict, ConflictKind, Severity, ValidationResult};
use crate::engine::coordinator::{DraftFields, ValidationCoordinator};
use crate::utils::time::parse_time_string;
use axum::Json;
use axum::extract::State;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// シフト作成・編集フォームからの検証リクエスト。入力途中で呼ばれる
/// ため、どの項目も欠けている可能性がある
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub worker_id: Option<i64>,
    pub agency_id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub break_start: Option<String>,
    pub break_end: Option<String>,
    pub notes: Option<String>,
    pub exclude_id: Option<i64>,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub is_valid: bool,
    pub conflicts: Vec<Conflict>,
    pub warnings: Vec<Conflict>,
    pub suggestions: Vec<String>,
}

impl ValidateResponse {
    fn from_result(result: ValidationResult) -> Self {
        let mut suggestions = Vec::new();
        if result
            .conflicts
            .iter()
            .any(|c| c.kind == ConflictKind::InvalidTime)
        {
            suggestions.push("開始時間と終了時間を見直してください".to_string());
        }
        if result
            .conflicts
            .iter()
            .any(|c| c.kind == ConflictKind::Duplicate)
        {
            suggestions.push("同じ時間帯のシフトが既にあります。既存のシフトを編集してください".to_string());
        }
        if result
            .conflicts
            .iter()
            .any(|c| c.kind == ConflictKind::Overlap)
        {
            suggestions.push("重複を避けるには時間帯をずらしてください".to_string());
        }

        let (conflicts, warnings): (Vec<Conflict>, Vec<Conflict>) = result
            .conflicts
            .into_iter()
            .partition(|c| c.severity == Severity::Error);

        Self {
            is_valid: result.is_valid,
            conflicts,
            warnings,
            suggestions,
        }
    }
}

/// POST /schedules/validate
///
/// sessionId 付きのリクエストはそのフォームセッションのコーディネーターを
/// 経由する（同一内容の抑制と保留中検証の追い越しが効く）。なしの場合は
/// その場で1回だけ検証する
pub async fn validate_schedule(
    State(state): State<AppState>,
    Json(req): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>, ApiError> {
    let (fields, parse_error) = build_draft_fields(&req);

    // 時刻として読めない入力は invalid_time として返す（HTTPエラーにはしない）
    if let Some(message) = parse_error {
        let result = ValidationResult::from_conflicts(vec![Conflict {
            kind: ConflictKind::InvalidTime,
            severity: Severity::Error,
            message,
            related_schedule_id: None,
        }]);
        return Ok(Json(ValidateResponse::from_result(result)));
    }

    let result = match &req.session_id {
        Some(session_id) => {
            let coordinator = state.sessions.get_or_create(session_id, || {
                ValidationCoordinator::new(
                    Arc::new(DbScheduleLookup::new(state.pool.clone())),
                    state.config.detector.clone(),
                    Duration::from_millis(state.config.debounce_ms),
                )
            });
            coordinator.validate_now(fields).await
        }
        None => stateless_validate(&state, fields).await,
    };

    Ok(Json(ValidateResponse::from_result(result)))
}

async fn stateless_validate(state: &AppState, fields: DraftFields) -> ValidationResult {
    let Some((draft, exclude_id)) = fields.complete() else {
        return ValidationResult::neutral();
    };

    match queries::get_active_schedules(&state.pool, draft.worker_id, draft.span.date).await {
        Ok(existing) => {
            let conflicts = conflict::detect(&draft, &existing, exclude_id, &state.config.detector);
            ValidationResult::from_conflicts(conflicts)
        }
        Err(e) => {
            tracing::warn!("Schedule lookup failed during validation: {:?}", e);
            ValidationResult::lookup_failure()
        }
    }
}

fn build_draft_fields(req: &ValidateRequest) -> (DraftFields, Option<String>) {
    let mut parse_error = None;
    let mut parse = |value: &Option<String>| -> Option<NaiveTime> {
        let raw = value.as_deref()?;
        match parse_time_string(raw) {
            Ok(time) => Some(time),
            Err(_) => {
                parse_error = Some(format!("時刻の形式が正しくありません: {}", raw));
                None
            }
        }
    };

    let start = parse(&req.start);
    let end = parse(&req.end);
    let break_start = parse(&req.break_start);
    let break_end = parse(&req.break_end);

    let fields = DraftFields {
        worker_id: req.worker_id,
        agency_id: req.agency_id,
        date: req.date,
        start,
        end,
        break_start,
        break_end,
        notes: req.notes.clone(),
        exclude_id: req.exclude_id,
    };

    (fields, parse_error)
}
