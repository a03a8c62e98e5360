use anyhow::Result;
use chrono::{NaiveDate, NaiveTime, Utc};

pub fn get_current_date_jst() -> NaiveDate {
    let jst_offset = chrono::FixedOffset::east_opt(9 * 3600).unwrap();
    let now_jst = Utc::now().with_timezone(&jst_offset);
    now_jst.date_naive()
}

pub fn parse_time_string(time_str: &str) -> Result<NaiveTime> {
    let time_str = time_str.trim();

    if let Ok(time) = NaiveTime::parse_from_str(time_str, "%H:%M") {
        return Ok(time);
    }

    if let Ok(time) = NaiveTime::parse_from_str(time_str, "%H:%M:%S") {
        return Ok(time);
    }

    Err(anyhow::anyhow!("Invalid time format. Use HH:MM or HH:MM:SS"))
}

/// from から to までの分数（to が前なら負）
pub fn minutes_between(from: NaiveTime, to: NaiveTime) -> i64 {
    to.signed_duration_since(from).num_minutes()
}

pub fn format_duration_minutes(minutes: i64) -> String {
    let hours = minutes / 60;
    let mins = minutes % 60;

    if hours > 0 {
        format!("{}時間{}分", hours, mins)
    } else {
        format!("{}分", mins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hm_and_hms() {
        assert_eq!(
            parse_time_string("09:30").unwrap(),
            NaiveTime::from_hms_opt(9, 30, 0).unwrap()
        );
        assert_eq!(
            parse_time_string(" 17:00:30 ").unwrap(),
            NaiveTime::from_hms_opt(17, 0, 30).unwrap()
        );
        assert!(parse_time_string("9時30分").is_err());
    }

    #[test]
    fn minutes_between_is_signed() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let nine_twenty = NaiveTime::from_hms_opt(9, 20, 0).unwrap();
        assert_eq!(minutes_between(nine, nine_twenty), 20);
        assert_eq!(minutes_between(nine_twenty, nine), -20);
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration_minutes(45), "45分");
        assert_eq!(format_duration_minutes(130), "2時間10分");
    }
}
