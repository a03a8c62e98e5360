use anyhow::Result;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// 1日分の勤務時間帯（日付 + 開始/終了、任意の休憩）を表す不変の値型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSpan {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub break_start: Option<NaiveTime>,
    pub break_end: Option<NaiveTime>,
}

impl TimeSpan {
    pub fn new(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            date,
            start,
            end,
            break_start: None,
            break_end: None,
        }
    }

    pub fn with_break(
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        break_start: NaiveTime,
        break_end: NaiveTime,
    ) -> Self {
        Self {
            date,
            start,
            end,
            break_start: Some(break_start),
            break_end: Some(break_end),
        }
    }

    /// 時間帯の不変条件を検証する
    ///
    /// 不変条件: start < end、休憩は両端指定かつ
    /// start <= break_start < break_end <= end
    pub fn validate(&self) -> Result<()> {
        if self.end <= self.start {
            return Err(anyhow::anyhow!(
                "終了時間は開始時間より後である必要があります"
            ));
        }

        match (self.break_start, self.break_end) {
            (None, None) => {}
            (Some(bs), Some(be)) => {
                if bs >= be {
                    return Err(anyhow::anyhow!(
                        "休憩の終了時間は休憩の開始時間より後である必要があります"
                    ));
                }
                if bs < self.start || be > self.end {
                    return Err(anyhow::anyhow!(
                        "休憩時間は勤務時間の範囲内である必要があります"
                    ));
                }
            }
            _ => {
                return Err(anyhow::anyhow!(
                    "休憩の開始と終了は両方指定する必要があります"
                ));
            }
        }

        Ok(())
    }

    /// 2つの時間帯が重なるかどうか（半開区間なので連続シフトは重ならない）
    pub fn overlaps(&self, other: &TimeSpan) -> bool {
        self.date == other.date && self.start < other.end && other.start < self.end
    }

    /// 重なっている区間を返す（重なっていなければ None）
    pub fn overlap_window(&self, other: &TimeSpan) -> Option<(NaiveTime, NaiveTime)> {
        if !self.overlaps(other) {
            return None;
        }
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        Some((start, end))
    }

    pub fn duration_minutes(&self) -> i64 {
        self.end.signed_duration_since(self.start).num_minutes()
    }

    pub fn break_duration_minutes(&self) -> i64 {
        match (self.break_start, self.break_end) {
            (Some(bs), Some(be)) => be.signed_duration_since(bs).num_minutes(),
            _ => 0,
        }
    }

    pub fn contains_break(&self) -> bool {
        self.break_start.is_some() && self.break_end.is_some()
    }

    pub fn break_window(&self) -> Option<(NaiveTime, NaiveTime)> {
        match (self.break_start, self.break_end) {
            (Some(bs), Some(be)) => Some((bs, be)),
            _ => None,
        }
    }

    /// 開始・終了・休憩がすべて一致するか（重複シフト判定に使用）
    pub fn identical_times(&self, other: &TimeSpan) -> bool {
        self.start == other.start
            && self.end == other.end
            && self.break_start == other.break_start
            && self.break_end == other.break_end
    }
}
