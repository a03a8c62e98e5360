use crate::engine::interval::TimeSpan;
use chrono::NaiveTime;

pub fn format_time_hm(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

pub fn format_time_range(span: &TimeSpan) -> String {
    format!("{}～{}", format_time_hm(span.start), format_time_hm(span.end))
}
