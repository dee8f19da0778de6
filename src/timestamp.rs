use crate::error::Error;
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Field of `config.json` holding the dashboard's "last updated" banner.
pub const MESSAGE_FIELD: &str = "ultimo_aggiornamento";

static UPDATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"aggiornati alle ore (?P<hour>[0-9]{1,2}).(?P<minute>[0-9]{2}) del (?P<day>[0-9]{1,2})[^0-9](?P<month>[0-9]{1,2})[^0-9](?P<year>[0-9]{4})",
    )
    .expect("update pattern is valid")
});

/// Extract the "data as of" instant from the backend's config payload.
pub fn extract_update_time(config: &Value) -> Result<NaiveDateTime, Error> {
    let message = config
        .get(MESSAGE_FIELD)
        .and_then(Value::as_str)
        .ok_or(Error::MissingField { field: MESSAGE_FIELD })?;
    parse_update_message(message)
}

/// Parse `"... aggiornati alle ore H.MM del D/M/YYYY ..."` into a naive local date-time.
pub fn parse_update_message(message: &str) -> Result<NaiveDateTime, Error> {
    let caps = UPDATE_RE.captures(message).ok_or_else(|| Error::PatternNotFound {
        message: message.to_string(),
    })?;

    // ASCII-only groups of at most 4 digits always fit a u32
    let num = |name: &str| -> Result<u32, Error> {
        caps[name]
            .parse()
            .map_err(|_| Error::InvalidDateTime(format!("{} '{}'", name, &caps[name])))
    };
    let (year, month, day) = (num("year")? as i32, num("month")?, num("day")?);
    let (hour, minute) = (num("hour")?, num("minute")?);

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .ok_or_else(|| {
            Error::InvalidDateTime(format!(
                "{:04}-{:02}-{:02} {:02}:{:02}",
                year, month, day, hour, minute
            ))
        })
}
