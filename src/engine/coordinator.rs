use crate::database::models::Schedule;
use crate::engine::conflict::{self, DetectorConfig, ScheduleDraft, ValidationResult};
use crate::engine::interval::TimeSpan;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// 検証時に既存シフトを参照するためのインターフェース。
/// 本番ではデータベース、テストではスタブを差し込む
#[async_trait]
pub trait ScheduleLookup: Send + Sync {
    async fn active_schedules(&self, worker_id: i64, date: NaiveDate) -> Result<Vec<Schedule>>;
}

/// フォーム入力途中の下書き。すべての項目が未確定になりうる
#[derive(Debug, Clone, Default)]
pub struct DraftFields {
    pub worker_id: Option<i64>,
    pub agency_id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub start: Option<NaiveTime>,
    pub end: Option<NaiveTime>,
    pub break_start: Option<NaiveTime>,
    pub break_end: Option<NaiveTime>,
    pub notes: Option<String>,
    pub exclude_id: Option<i64>,
}

impl DraftFields {
    /// 必須項目（ワーカー・派遣先・日付・開始・終了）がそろっていれば
    /// 完全な下書きに変換する
    pub fn complete(&self) -> Option<(ScheduleDraft, Option<i64>)> {
        let worker_id = self.worker_id?;
        let agency_id = self.agency_id?;
        let date = self.date?;
        let start = self.start?;
        let end = self.end?;

        let mut span = TimeSpan::new(date, start, end);
        span.break_start = self.break_start;
        span.break_end = self.break_end;

        Some((
            ScheduleDraft {
                worker_id,
                agency_id,
                span,
                notes: self.notes.clone(),
            },
            self.exclude_id,
        ))
    }

    /// 検証に関係する項目の決定的な直列化。連続する同一送信の抑制と、
    /// 追い越された結果の破棄キーに使う。未完成の下書きには存在しない
    pub fn fingerprint(&self) -> Option<String> {
        let worker_id = self.worker_id?;
        let agency_id = self.agency_id?;
        let date = self.date?;
        let start = self.start?;
        let end = self.end?;

        Some(format!(
            "{}|{}|{}|{}|{}|{}|{}|{}",
            worker_id,
            agency_id,
            date,
            start,
            end,
            fmt_opt(self.break_start),
            fmt_opt(self.break_end),
            fmt_opt(self.exclude_id),
        ))
    }
}

fn fmt_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "-".to_string(),
    }
}

struct CoordinatorState {
    last_fingerprint: Option<String>,
    last_result: Option<ValidationResult>,
}

/// フォーム編集1セッション分の検証コーディネーター
///
/// 下書きの編集ストリームを、最小限の検出器呼び出しに変換する。
/// デバウンス・フィンガープリントによる重複抑制・追い越し時の
/// 協調的キャンセル（結果適用前に世代を確認して古い結果を捨てる）を
/// ここで一元管理する。インスタンスはフォームのライフサイクルと共に
/// 生成・破棄され、セッション間で共有しない
pub struct ValidationCoordinator {
    lookup: Arc<dyn ScheduleLookup>,
    detector_config: DetectorConfig,
    debounce: Duration,
    generation: Arc<AtomicU64>,
    state: Arc<Mutex<CoordinatorState>>,
    results: Arc<watch::Sender<ValidationResult>>,
}

impl ValidationCoordinator {
    pub fn new(
        lookup: Arc<dyn ScheduleLookup>,
        detector_config: DetectorConfig,
        debounce: Duration,
    ) -> Self {
        let (tx, _rx) = watch::channel(ValidationResult::neutral());
        Self {
            lookup,
            detector_config,
            debounce,
            generation: Arc::new(AtomicU64::new(0)),
            state: Arc::new(Mutex::new(CoordinatorState {
                last_fingerprint: None,
                last_result: None,
            })),
            results: Arc::new(tx),
        }
    }

    /// 最新の検証結果を購読する。古い結果は保持されず常に最新値だけが見える
    pub fn subscribe(&self) -> watch::Receiver<ValidationResult> {
        self.results.subscribe()
    }

    /// 下書きの編集を1件受け付ける（デバウンスあり）
    ///
    /// 未完成の下書きは実行中の検証をリセットして中立な結果を流す。
    /// 完成した下書きは静止期間の経過後に検証され、途中の送信は
    /// キューに積まれず破棄される
    pub fn submit(&self, fields: DraftFields) {
        let Some(fingerprint) = fields.fingerprint() else {
            self.reset_and_emit_neutral();
            return;
        };

        {
            let state = self.state.lock().unwrap();
            if state.last_fingerprint.as_deref() == Some(fingerprint.as_str()) {
                // 同一内容の連続送信。検出器は呼ばない
                return;
            }
        }

        let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.state.lock().unwrap();
            state.last_fingerprint = Some(fingerprint);
            state.last_result = None;
        }

        let lookup = Arc::clone(&self.lookup);
        let detector_config = self.detector_config.clone();
        let debounce = self.debounce;
        let generation = Arc::clone(&self.generation);
        let state = Arc::clone(&self.state);
        let results = Arc::clone(&self.results);

        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if generation.load(Ordering::SeqCst) != my_generation {
                return;
            }

            let (result, succeeded) = run_detection(&lookup, &detector_config, &fields).await;

            // 追い越されていたら結果を適用しない
            if generation.load(Ordering::SeqCst) != my_generation {
                return;
            }

            apply_result(&state, &results, result, succeeded);
        });
    }

    /// デバウンスを介さず即時に検証する（送信ボタンなどの明示操作用）
    ///
    /// フィンガープリントによる重複抑制は維持し、保留中のデバウンス検証は
    /// 追い越して無効化する
    pub async fn validate_now(&self, fields: DraftFields) -> ValidationResult {
        let Some(fingerprint) = fields.fingerprint() else {
            self.reset_and_emit_neutral();
            return ValidationResult::neutral();
        };

        {
            let state = self.state.lock().unwrap();
            if state.last_fingerprint.as_deref() == Some(fingerprint.as_str()) {
                if let Some(result) = state.last_result.clone() {
                    return result;
                }
            }
        }

        let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.state.lock().unwrap();
            state.last_fingerprint = Some(fingerprint);
            state.last_result = None;
        }

        let (result, succeeded) = run_detection(&self.lookup, &self.detector_config, &fields).await;

        if self.generation.load(Ordering::SeqCst) == my_generation {
            apply_result(&self.state, &self.results, result.clone(), succeeded);
        }

        result
    }

    fn reset_and_emit_neutral(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        state.last_fingerprint = None;
        state.last_result = None;
        let _ = self.results.send(ValidationResult::neutral());
    }
}

async fn run_detection(
    lookup: &Arc<dyn ScheduleLookup>,
    detector_config: &DetectorConfig,
    fields: &DraftFields,
) -> (ValidationResult, bool) {
    // fingerprint が存在した時点で complete は成立している
    let Some((draft, exclude_id)) = fields.complete() else {
        return (ValidationResult::neutral(), true);
    };

    match lookup.active_schedules(draft.worker_id, draft.span.date).await {
        Ok(existing) => {
            let conflicts = conflict::detect(&draft, &existing, exclude_id, detector_config);
            (ValidationResult::from_conflicts(conflicts), true)
        }
        Err(e) => {
            tracing::warn!("Schedule lookup failed during validation: {:?}", e);
            (ValidationResult::lookup_failure(), false)
        }
    }
}

fn apply_result(
    state: &Arc<Mutex<CoordinatorState>>,
    results: &Arc<watch::Sender<ValidationResult>>,
    result: ValidationResult,
    succeeded: bool,
) {
    {
        let mut state = state.lock().unwrap();
        if succeeded {
            state.last_result = Some(result.clone());
        } else {
            // 失敗はキャッシュしない。次の validate_now が自然に再試行する
            state.last_fingerprint = None;
            state.last_result = None;
        }
    }
    let _ = results.send(result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::conflict::ConflictKind;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;

    struct StubLookup {
        calls: AtomicUsize,
        delay: Duration,
        schedules: Vec<Schedule>,
        fail: bool,
    }

    impl StubLookup {
        fn new(schedules: Vec<Schedule>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                schedules,
                fail: false,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ScheduleLookup for StubLookup {
        async fn active_schedules(
            &self,
            _worker_id: i64,
            _date: NaiveDate,
        ) -> Result<Vec<Schedule>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(anyhow::anyhow!("database unavailable"));
            }
            Ok(self.schedules.clone())
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, 1).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn fields(start: NaiveTime, end: NaiveTime) -> DraftFields {
        DraftFields {
            worker_id: Some(1),
            agency_id: Some(10),
            date: Some(date()),
            start: Some(start),
            end: Some(end),
            ..Default::default()
        }
    }

    fn existing_schedule() -> Schedule {
        let now = Utc::now();
        Schedule {
            id: 1,
            worker_id: 1,
            agency_id: 10,
            date: date(),
            start_time: t(9, 0),
            end_time: t(17, 0),
            break_start: None,
            break_end: None,
            status: "active".to_string(),
            notes: None,
            created_by: 99,
            created_at: now,
            updated_at: now,
        }
    }

    fn coordinator(lookup: Arc<StubLookup>, debounce: Duration) -> ValidationCoordinator {
        ValidationCoordinator::new(lookup, DetectorConfig::default(), debounce)
    }

    #[test]
    fn fingerprint_requires_all_mandatory_fields() {
        let mut partial = fields(t(9, 0), t(17, 0));
        partial.worker_id = None;
        assert!(partial.fingerprint().is_none());

        let complete = fields(t(9, 0), t(17, 0));
        assert!(complete.fingerprint().is_some());
    }

    #[test]
    fn fingerprint_distinguishes_exclude_id() {
        let base = fields(t(9, 0), t(17, 0));
        let mut editing = fields(t(9, 0), t(17, 0));
        editing.exclude_id = Some(5);
        assert_ne!(base.fingerprint(), editing.fingerprint());
    }

    #[tokio::test]
    async fn identical_submissions_trigger_at_most_one_detector_call() {
        let lookup = Arc::new(StubLookup::new(vec![]));
        let coordinator = coordinator(Arc::clone(&lookup), Duration::from_millis(10));

        coordinator.submit(fields(t(9, 0), t(17, 0)));
        coordinator.submit(fields(t(9, 0), t(17, 0)));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(lookup.call_count(), 1);
    }

    #[tokio::test]
    async fn superseding_submission_discards_stale_result() {
        let mut lookup = StubLookup::new(vec![existing_schedule()]);
        lookup.delay = Duration::from_millis(50);
        let lookup = Arc::new(lookup);
        let coordinator = coordinator(Arc::clone(&lookup), Duration::from_millis(5));
        let mut rx = coordinator.subscribe();

        // A: 既存シフトと同一時間帯 → duplicate エラーになるはず
        coordinator.submit(fields(t(9, 0), t(17, 0)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        // B: 競合しない時間帯。A の検証はまだ実行中
        coordinator.submit(fields(t(17, 0), t(21, 0)));

        tokio::time::sleep(Duration::from_millis(200)).await;

        // 最終的に見えるのは B の結果だけ。A の遅れて届いた結果は捨てられる
        let latest = rx.borrow_and_update().clone();
        assert!(latest.is_valid);
        assert!(latest.conflicts.is_empty());
    }

    #[tokio::test]
    async fn incomplete_draft_resets_inflight_and_emits_neutral() {
        let mut lookup = StubLookup::new(vec![existing_schedule()]);
        lookup.delay = Duration::from_millis(50);
        let lookup = Arc::new(lookup);
        let coordinator = coordinator(Arc::clone(&lookup), Duration::from_millis(5));
        let mut rx = coordinator.subscribe();

        coordinator.submit(fields(t(9, 0), t(17, 0)));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut incomplete = fields(t(9, 0), t(17, 0));
        incomplete.end = None;
        coordinator.submit(incomplete);

        tokio::time::sleep(Duration::from_millis(200)).await;

        let latest = rx.borrow_and_update().clone();
        assert!(latest.is_valid);
        assert!(latest.conflicts.is_empty());
    }

    #[tokio::test]
    async fn validate_now_bypasses_debounce_and_deduplicates() {
        let lookup = Arc::new(StubLookup::new(vec![existing_schedule()]));
        // デバウンスが事実上無限でも validate_now は即時に返る
        let coordinator = coordinator(Arc::clone(&lookup), Duration::from_secs(60));

        let result = coordinator.validate_now(fields(t(9, 0), t(17, 0))).await;
        assert!(!result.is_valid);
        assert_eq!(result.conflicts[0].kind, ConflictKind::Duplicate);
        assert_eq!(lookup.call_count(), 1);

        // 同じ内容なら検出器は呼ばれずキャッシュが返る
        let again = coordinator.validate_now(fields(t(9, 0), t(17, 0))).await;
        assert_eq!(again, result);
        assert_eq!(lookup.call_count(), 1);
    }

    #[tokio::test]
    async fn validate_now_supersedes_pending_debounced_submission() {
        let lookup = Arc::new(StubLookup::new(vec![]));
        let coordinator = coordinator(Arc::clone(&lookup), Duration::from_secs(60));

        coordinator.submit(fields(t(9, 0), t(17, 0)));
        let result = coordinator.validate_now(fields(t(10, 0), t(18, 0))).await;
        assert!(result.is_valid);

        // デバウンス中だった送信は追い越されて実行されない
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(lookup.call_count(), 1);
    }

    #[tokio::test]
    async fn lookup_failure_surfaces_warning_and_is_retried_on_next_call() {
        let mut lookup = StubLookup::new(vec![]);
        lookup.fail = true;
        let lookup = Arc::new(lookup);
        let coordinator = coordinator(Arc::clone(&lookup), Duration::from_millis(5));

        let result = coordinator.validate_now(fields(t(9, 0), t(17, 0))).await;
        assert!(!result.is_valid);
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].kind, ConflictKind::ValidationError);

        // 失敗はキャッシュされないので、同じ内容でも再試行される
        let retry = coordinator.validate_now(fields(t(9, 0), t(17, 0))).await;
        assert!(!retry.is_valid);
        assert_eq!(lookup.call_count(), 2);
    }
}
