use chrono::{DateTime, Datelike, Utc};

const MINUTES_IN_DAY: i64 = 1440;
const MINUTES_IN_ALMOST_TWO_DAYS: i64 = 2520;
const MINUTES_IN_MONTH: i64 = 43200;
const MINUTES_IN_TWO_MONTHS: i64 = 86400;

/// Removes `<...>` tags, leaving text content. An unterminated `<` is kept.
pub fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(open) = rest.find('<') {
        match rest[open..].find('>') {
            Some(close) => {
                text.push_str(&rest[..open]);
                rest = &rest[open + close + 1..];
            }
            None => break,
        }
    }
    text.push_str(rest);
    text
}

/// e.g. `Mar 01, 2024 14:05`
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%b %d, %Y %H:%M").to_string()
}

/// Human distance between `date` and `now` with an "ago"/"in" suffix,
/// e.g. "less than a minute ago", "about 3 hours ago", "in 2 days".
pub fn format_relative_time(date: &DateTime<Utc>, now: &DateTime<Utc>) -> String {
    let (earlier, later) = if date <= now { (date, now) } else { (now, date) };
    let seconds = (*later - *earlier).num_seconds();
    let minutes = (seconds as f64 / 60.0).round() as i64;

    let distance = if minutes < 2 {
        if minutes == 0 {
            "less than a minute".to_string()
        } else {
            plural(minutes, "minute")
        }
    } else if minutes < 45 {
        plural(minutes, "minute")
    } else if minutes < 90 {
        "about 1 hour".to_string()
    } else if minutes < MINUTES_IN_DAY {
        format!("about {}", plural(rounded(minutes, 60), "hour"))
    } else if minutes < MINUTES_IN_ALMOST_TWO_DAYS {
        "1 day".to_string()
    } else if minutes < MINUTES_IN_MONTH {
        plural(rounded(minutes, MINUTES_IN_DAY), "day")
    } else if minutes < MINUTES_IN_TWO_MONTHS {
        format!("about {}", plural(rounded(minutes, MINUTES_IN_MONTH), "month"))
    } else {
        let months = full_months_between(earlier, later);
        if months < 12 {
            plural(rounded(minutes, MINUTES_IN_MONTH), "month")
        } else {
            let years = months / 12;
            match months % 12 {
                0..=2 => format!("about {}", plural(years, "year")),
                3..=8 => format!("over {}", plural(years, "year")),
                _ => format!("almost {}", plural(years + 1, "year")),
            }
        }
    };

    if date > now {
        format!("in {}", distance)
    } else {
        format!("{} ago", distance)
    }
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", count, unit)
    }
}

fn rounded(minutes: i64, per: i64) -> i64 {
    (minutes as f64 / per as f64).round() as i64
}

/// Calendar months elapsed between two instants, counting only full months.
fn full_months_between(earlier: &DateTime<Utc>, later: &DateTime<Utc>) -> i64 {
    let mut months = (later.year() as i64 - earlier.year() as i64) * 12
        + (later.month() as i64 - earlier.month() as i64);

    let later_in_month = (later.day(), later.time());
    let earlier_in_month = (earlier.day(), earlier.time());
    if months > 0 && later_in_month < earlier_in_month {
        months -= 1;
    }
    months
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn ago(now: DateTime<Utc>, d: Duration) -> String {
        format_relative_time(&(now - d), &now)
    }

    #[test]
    fn strips_tags_like_the_sidebar_preview() {
        assert_eq!(strip_html("<p>Hello <em>there</em></p>"), "Hello there");
        assert_eq!(strip_html("a < b"), "a < b");
        assert_eq!(strip_html("<br/>x<br>"), "x");
        assert_eq!(strip_html(""), "");
    }

    #[test]
    fn formats_absolute_dates() {
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 14, 5, 0).unwrap();
        assert_eq!(format_date(&date), "Mar 01, 2024 14:05");
    }

    #[test]
    fn formats_relative_distances() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        assert_eq!(ago(now, Duration::seconds(10)), "less than a minute ago");
        assert_eq!(ago(now, Duration::seconds(70)), "1 minute ago");
        assert_eq!(ago(now, Duration::minutes(5)), "5 minutes ago");
        assert_eq!(ago(now, Duration::minutes(50)), "about 1 hour ago");
        assert_eq!(ago(now, Duration::hours(3)), "about 3 hours ago");
        assert_eq!(ago(now, Duration::hours(30)), "1 day ago");
        assert_eq!(ago(now, Duration::days(4)), "4 days ago");
        assert_eq!(ago(now, Duration::days(40)), "about 1 month ago");
        assert_eq!(ago(now, Duration::days(95)), "3 months ago");
        assert_eq!(ago(now, Duration::days(370)), "about 1 year ago");
        assert_eq!(ago(now, Duration::days(365 + 180)), "over 1 year ago");
        assert_eq!(ago(now, Duration::days(365 + 320)), "almost 2 years ago");
        assert_eq!(
            format_relative_time(&(now + Duration::days(2)), &now),
            "in 2 days"
        );
    }
}
