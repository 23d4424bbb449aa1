use time::{macros::format_description, Date};

// `iso_date` and `iso_date::option` serde adapters for `YYYY-MM-DD`.
time::serde::format_description!(pub iso_date, Date, "[year]-[month]-[day]");

pub fn parse_iso_date(s: &str) -> Option<Date> {
    Date::parse(
        s.trim(),
        format_description!("[year]-[month padding:none]-[day padding:none]"),
    )
    .ok()
}

pub fn today_utc() -> Date {
    time::OffsetDateTime::now_utc().date()
}
