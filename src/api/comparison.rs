use crate::api::{ApiError, AppState};
use crate::database::queries;
use crate::engine::matcher::{self, ComparisonRecord, MatchStatus};
use crate::engine::punctuality::{self, PunctualitySummary, TrendDelta};
use crate::utils::time::get_current_date_jst;
use axum::Json;
use axum::extract::{Query, State};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub agency_id: Option<i64>,
    pub worker_id: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResponse {
    pub records: Vec<ComparisonRecord>,
    pub summary: PunctualitySummary,
    pub punctuality_rate: Option<f64>,
    pub by_agency: BTreeMap<i64, PunctualitySummary>,
    pub trend: TrendDelta,
}

/// GET /timesheets/comparison
///
/// 期間内の予実突き合わせ結果と、派遣先ごとの集計、直前の同じ長さの
/// 期間とのトレンド比較を返す
pub async fn comparison_report(
    State(state): State<AppState>,
    Query(query): Query<ComparisonQuery>,
) -> Result<Json<ComparisonResponse>, ApiError> {
    if query.to < query.from {
        return Err(ApiError::bad_request(
            "終了日は開始日以降である必要があります",
        ));
    }

    let today = get_current_date_jst();
    let records = fetch_and_compare(
        &state,
        query.from,
        query.to,
        query.agency_id,
        query.worker_id,
        today,
    )
    .await?;

    let summary = punctuality::summarize(records.iter());
    let by_agency = punctuality::summarize_by_agency(&records);

    // 直前の同じ長さの期間と比較する
    let span_days = (query.to - query.from).num_days();
    let prior_to = query.from - Duration::days(1);
    let prior_from = prior_to - Duration::days(span_days);
    let prior_records = fetch_and_compare(
        &state,
        prior_from,
        prior_to,
        query.agency_id,
        query.worker_id,
        today,
    )
    .await?;
    let prior_summary = punctuality::summarize(prior_records.iter());
    let trend = TrendDelta::between(&summary, &prior_summary);

    Ok(Json(ComparisonResponse {
        punctuality_rate: summary.punctuality_rate(),
        records,
        summary,
        by_agency,
        trend,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub agency_id: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingResponse {
    pub count: usize,
    pub records: Vec<ComparisonRecord>,
}

/// GET /timesheets/missing
///
/// 予定があるのに実績が記録されていない過去日だけを抜き出す
pub async fn missing_timesheets(
    State(state): State<AppState>,
    Query(query): Query<MissingQuery>,
) -> Result<Json<MissingResponse>, ApiError> {
    if query.to < query.from {
        return Err(ApiError::bad_request(
            "終了日は開始日以降である必要があります",
        ));
    }

    let today = get_current_date_jst();
    let records = fetch_and_compare(&state, query.from, query.to, query.agency_id, None, today)
        .await?;

    let missing: Vec<ComparisonRecord> = records
        .into_iter()
        .filter(|r| r.match_status == MatchStatus::MissingTimesheet)
        .collect();

    Ok(Json(MissingResponse {
        count: missing.len(),
        records: missing,
    }))
}

async fn fetch_and_compare(
    state: &AppState,
    from: NaiveDate,
    to: NaiveDate,
    agency_id: Option<i64>,
    worker_id: Option<i64>,
    today: NaiveDate,
) -> Result<Vec<ComparisonRecord>, ApiError> {
    let schedules =
        queries::get_schedules_by_date_range(&state.pool, from, to, agency_id, worker_id).await?;
    let timesheets =
        queries::get_timesheets_by_date_range(&state.pool, from, to, agency_id, worker_id).await?;

    Ok(matcher::compare(
        &schedules,
        &timesheets,
        from,
        to,
        today,
        &state.config.thresholds,
    ))
}
