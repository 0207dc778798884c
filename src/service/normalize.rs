//! Payload normalization before validation, and entity serialization on the way out.
//!
//! Inbound steps run in a fixed order: scope foreign keys, numeric defaults, date coercion,
//! omitted-field stripping. Stripping comes last so injected scope fields always survive.

use crate::case::keys_to_camel_case;
use crate::schema::{fields_of_type, FieldMap, FieldSpec, FieldType};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt::Write;

/// Copies every scope key from the route parameters into the payload. A client-supplied value is
/// always overwritten; a key missing from the route is removed so validation reports it.
pub fn inject_foreign_keys(
    payload: &mut Map<String, Value>,
    params: &HashMap<String, String>,
    scope_keys: &[String],
) {
    for key in scope_keys {
        match params.get(key) {
            Some(v) => {
                payload.insert(key.clone(), Value::String(v.clone()));
            }
            None => {
                payload.remove(key);
            }
        }
    }
}

/// Sets every absent or null number field to 0.
pub fn default_numbers(payload: &mut Map<String, Value>, fields: &FieldMap) {
    for key in fields_of_type(fields, FieldType::Number) {
        let empty = payload.get(key).map(Value::is_null).unwrap_or(true);
        if empty {
            payload.insert(key.to_string(), Value::Number(0.into()));
        }
    }
}

/// Rewrites every present, non-null date field as RFC 3339 UTC. Values that cannot be read as a
/// date are kept so the validator can report them.
pub fn coerce_dates(payload: &mut Map<String, Value>, fields: &FieldMap) {
    for (key, spec) in fields {
        let FieldSpec::Validated(c) = spec else { continue };
        if c.field_type != FieldType::Date {
            continue;
        }
        if let Some(v) = payload.get_mut(key) {
            if v.is_null() {
                continue;
            }
            if let Some(d) = parse_date(v, c.date_format.as_deref()) {
                *v = Value::String(to_rfc3339(&d));
            }
        }
    }
}

/// Removes every field marked as omitted.
pub fn strip_omitted(payload: &mut Map<String, Value>, fields: &FieldMap) {
    for (key, spec) in fields {
        if spec.is_omitted() {
            payload.remove(key);
        }
    }
}

/// Runs the inbound steps in order.
pub fn normalize_payload(
    payload: &mut Map<String, Value>,
    params: &HashMap<String, String>,
    scope_keys: &[String],
    fields: &FieldMap,
) {
    inject_foreign_keys(payload, params, scope_keys);
    default_numbers(payload, fields);
    coerce_dates(payload, fields);
    strip_omitted(payload, fields);
}

/// Shapes a stored row (column names) into an API entity: camelCase keys, date fields rendered
/// with their declared format, omitted fields removed.
pub fn serialize_entity(row: &Map<String, Value>, fields: &FieldMap) -> Map<String, Value> {
    let mut entity = keys_to_camel_case(row);
    for (key, spec) in fields {
        let FieldSpec::Validated(c) = spec else { continue };
        let (FieldType::Date, Some(fmt)) = (c.field_type, c.date_format.as_deref()) else {
            continue;
        };
        if let Some(v) = entity.get_mut(key) {
            let Some(d) = parse_date(v, Some(fmt)) else { continue };
            let mut rendered = String::new();
            if write!(rendered, "{}", d.format(fmt)).is_ok() {
                *v = Value::String(rendered);
            }
        }
    }
    strip_omitted(&mut entity, fields);
    entity
}

/// Reads a date from its external representation: RFC 3339, ISO date-time without offset,
/// ISO date, the field's own format, or epoch milliseconds.
pub fn parse_date(v: &Value, format: Option<&str>) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => parse_date_str(s.trim(), format),
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

fn parse_date_str(s: &str, format: Option<&str>) -> Option<DateTime<Utc>> {
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Some(d.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(d) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&d));
        }
    }
    let date_formats = format.into_iter().chain(std::iter::once("%Y-%m-%d"));
    for fmt in date_formats {
        if let Ok(d) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&d));
        }
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|d| Utc.from_utc_datetime(&d));
        }
    }
    None
}

pub fn to_rfc3339(d: &DateTime<Utc>) -> String {
    d.to_rfc3339_opts(SecondsFormat::Millis, true)
}
