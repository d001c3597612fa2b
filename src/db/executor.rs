use anyhow::Result;
use chrono::{Duration, NaiveDate};

use crate::db::session::TdsClient;
use crate::db::types::{Column, ResultSet, Value};
use crate::error::{AppError, ErrorKind};

pub async fn run_query(query: tiberius::Query<'_>, client: &mut TdsClient) -> Result<Vec<ResultSet>> {
    let stream = query
        .query(client)
        .await
        .map_err(|err| AppError::new(ErrorKind::Query, err.to_string()))?;
    collect_result_sets(stream).await
}

pub async fn collect_result_sets(stream: tiberius::QueryStream<'_>) -> Result<Vec<ResultSet>> {
    let result_sets = stream
        .into_results()
        .await
        .map_err(|err| AppError::new(ErrorKind::Query, err.to_string()))?;

    Ok(result_sets
        .into_iter()
        .map(|rows| {
            let columns = rows
                .first()
                .map(|row| row.columns().iter().map(|col| Column::named(col.name())).collect())
                .unwrap_or_default();
            let rows = rows
                .iter()
                .map(|row| row.cells().map(|(_, data)| map_column_data(data)).collect())
                .collect();
            ResultSet { columns, rows }
        })
        .collect())
}

fn text_or_null<T: ToString>(value: Option<T>) -> Value {
    value.map(|v| Value::Text(v.to_string())).unwrap_or(Value::Null)
}

fn map_column_data(data: &tiberius::ColumnData<'_>) -> Value {
    use tiberius::ColumnData::*;
    match data {
        U8(value) => value.map(|v| Value::Int(v as i64)).unwrap_or(Value::Null),
        I16(value) => value.map(|v| Value::Int(v as i64)).unwrap_or(Value::Null),
        I32(value) => value.map(|v| Value::Int(v as i64)).unwrap_or(Value::Null),
        I64(value) => value.map(Value::Int).unwrap_or(Value::Null),
        F32(value) => value.map(|v| Value::Float(v as f64)).unwrap_or(Value::Null),
        F64(value) => value.map(Value::Float).unwrap_or(Value::Null),
        Bit(value) => value.map(Value::Bool).unwrap_or(Value::Null),
        String(value) => text_or_null(value.as_ref()),
        Guid(value) => text_or_null(value.as_ref()),
        Numeric(value) => text_or_null(value.as_ref()),
        Xml(value) => text_or_null(value.as_ref()),
        Binary(value) => value
            .as_ref()
            .map(|v| Value::Text(format!("0x{}", hex(v))))
            .unwrap_or(Value::Null),
        DateTime(value) => value
            .as_ref()
            .map(|v| {
                // days since 1900-01-01, fragments of 1/300 s
                let ms = v.seconds_fragments() as i64 * 1000 / 300;
                format_offset_from(epoch_1900(), v.days() as i64, Duration::milliseconds(ms), 3)
            })
            .unwrap_or(Value::Null),
        SmallDateTime(value) => value
            .as_ref()
            .map(|v| {
                let minutes = Duration::minutes(v.seconds_fragments() as i64);
                format_offset_from(epoch_1900(), v.days() as i64, minutes, 0)
            })
            .unwrap_or(Value::Null),
        #[cfg(feature = "tds73")]
        Time(value) => value
            .map(|v| Value::Text(format_time_of_day(time_duration(v))))
            .unwrap_or(Value::Null),
        #[cfg(feature = "tds73")]
        Date(value) => value
            .map(|v| match epoch_year_one().checked_add_signed(Duration::days(v.days() as i64)) {
                Some(date) => Value::Text(date.format("%Y-%m-%d").to_string()),
                None => Value::Null,
            })
            .unwrap_or(Value::Null),
        #[cfg(feature = "tds73")]
        DateTime2(value) => value
            .map(|v| {
                format_offset_from(
                    epoch_year_one(),
                    v.date().days() as i64,
                    time_duration(v.time()),
                    7,
                )
            })
            .unwrap_or(Value::Null),
        #[cfg(feature = "tds73")]
        DateTimeOffset(value) => value
            .map(|v| {
                let base = format_offset_from(
                    epoch_year_one(),
                    v.datetime2().date().days() as i64,
                    time_duration(v.datetime2().time()),
                    7,
                );
                let offset = v.offset();
                let sign = if offset >= 0 { '+' } else { '-' };
                let abs = offset.abs();
                match base {
                    Value::Text(text) => Value::Text(format!(
                        "{text} {sign}{:02}:{:02}",
                        abs / 60,
                        abs % 60
                    )),
                    other => other,
                }
            })
            .unwrap_or(Value::Null),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

fn epoch_1900() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or_default()
}

#[cfg(feature = "tds73")]
fn epoch_year_one() -> NaiveDate {
    NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or_default()
}

#[cfg(feature = "tds73")]
fn time_duration(time: tiberius::time::Time) -> Duration {
    let nanos = time.increments() as i64 * 10i64.pow(9 - time.scale() as u32);
    Duration::nanoseconds(nanos)
}

/// Formats `epoch + days + time_of_day`; `max_fraction` caps fractional digits.
fn format_offset_from(epoch: NaiveDate, days: i64, time_of_day: Duration, max_fraction: usize) -> Value {
    let Some(date) = epoch.checked_add_signed(Duration::days(days)) else {
        return Value::Null;
    };
    let mut text = date.format("%Y-%m-%d").to_string();
    text.push(' ');
    let mut time = format_time_of_day(time_of_day);
    if let Some(dot) = time.find('.') {
        time.truncate((dot + 1 + max_fraction).min(time.len()));
        if max_fraction == 0 {
            time.truncate(dot);
        }
    }
    text.push_str(&time);
    Value::Text(text)
}

fn format_time_of_day(time: Duration) -> String {
    let total_secs = time.num_seconds();
    let frac_nanos = (time - Duration::seconds(total_secs))
        .num_nanoseconds()
        .unwrap_or(0);
    let clock = format!(
        "{:02}:{:02}:{:02}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60
    );
    if frac_nanos > 0 {
        let frac = format!("{frac_nanos:09}");
        format!("{clock}.{}", frac.trim_end_matches('0'))
    } else {
        clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_legacy_datetime_offsets() {
        let value = format_offset_from(epoch_1900(), 366, Duration::milliseconds(3_723_500), 3);
        assert_eq!(value, Value::Text("1901-01-02 01:02:03.5".to_string()));
    }

    #[test]
    fn drops_fraction_when_not_requested() {
        let value = format_offset_from(epoch_1900(), 0, Duration::minutes(90), 0);
        assert_eq!(value, Value::Text("1900-01-01 01:30:00".to_string()));
    }

    #[test]
    fn hex_encodes_binary() {
        assert_eq!(hex(&[0x0a, 0xff]), "0AFF");
    }
}
