//! The Telemetry Recorder: an optional, scoped per-run recording
//! interface bracketing each job execution. The concrete vendor backend
//! (New Relic) is an external collaborator; this module defines the
//! interface plus a no-op and a stdout-logging implementation, modeled on
//! `pyworker/reporter.py`'s `Reporter` class.

use serde_json::Value;

pub const GROUP_NAME: &str = "DelayedJob";

pub trait TelemetryRecorder: Send + Sync {
    fn scope<'a>(&'a self, name: &str) -> Box<dyn TelemetryScope + 'a>;
    fn shutdown(&self);
}

pub trait TelemetryScope {
    /// Emits key/value attributes for the scope currently open. Keys are
    /// prefixed and camelCased; `null` values are dropped; unsupported
    /// value types are JSON-serialized (`Reporter._format_attributes`).
    fn report(&self, attributes: &[(&str, Value)]);

    /// Records an exception's text against the currently open scope
    /// (`Reporter.record_exception`).
    fn record_exception(&self, message: &str);
}

/// Used when `NEW_RELIC_LICENSE_KEY`/`NEW_RELIC_APP_NAME` are absent.
/// Every call is free.
pub struct NoopTelemetry;

struct NoopScope;

impl TelemetryRecorder for NoopTelemetry {
    fn scope<'a>(&'a self, _name: &str) -> Box<dyn TelemetryScope + 'a> {
        Box::new(NoopScope)
    }

    fn shutdown(&self) {}
}

impl TelemetryScope for NoopScope {
    fn report(&self, _attributes: &[(&str, Value)]) {}
    fn record_exception(&self, _message: &str) {}
}

/// Prints one JSON line per scope event, in the teacher's `println!`
/// idiom. A stand-in for a real vendor agent integration — anything
/// implementing `newrelic.agent`'s `BackgroundTask`/`add_custom_attributes`
/// contract could replace it without touching the worker loop.
pub struct LoggingTelemetry {
    attribute_prefix: String,
}

impl LoggingTelemetry {
    pub fn new(attribute_prefix: impl Into<String>) -> Self {
        Self {
            attribute_prefix: attribute_prefix.into(),
        }
    }
}

impl TelemetryRecorder for LoggingTelemetry {
    fn scope<'a>(&'a self, name: &str) -> Box<dyn TelemetryScope + 'a> {
        println!(
            "{}",
            serde_json::json!({"telemetry": "scope_open", "group": GROUP_NAME, "name": name})
        );
        Box::new(LoggingScope {
            name: name.to_string(),
            prefix: self.attribute_prefix.clone(),
        })
    }

    fn shutdown(&self) {
        println!("{}", serde_json::json!({"telemetry": "shutdown"}));
    }
}

struct LoggingScope {
    name: String,
    prefix: String,
}

impl TelemetryScope for LoggingScope {
    fn report(&self, attributes: &[(&str, Value)]) {
        let formatted = format_attributes(&self.prefix, attributes);
        println!(
            "{}",
            serde_json::json!({
                "telemetry": "report",
                "group": GROUP_NAME,
                "name": self.name,
                "attributes": formatted,
            })
        );
    }

    fn record_exception(&self, message: &str) {
        println!(
            "{}",
            serde_json::json!({
                "telemetry": "record_exception",
                "group": GROUP_NAME,
                "name": self.name,
                "message": message,
            })
        );
    }
}

/// Prefixes then camelCases every key; drops `null` values; JSON-dumps
/// anything that isn't a string/number/bool
/// (`Reporter._format_attributes`/`_convert_value`).
pub fn format_attributes(prefix: &str, attributes: &[(&str, Value)]) -> serde_json::Map<String, Value> {
    let mut out = serde_json::Map::new();
    for (key, value) in attributes {
        if value.is_null() {
            continue;
        }
        let formatted_key = format!("{prefix}{}", to_camel_case(key));
        let formatted_value = convert_value(value);
        out.insert(formatted_key, formatted_value);
    }
    out
}

fn convert_value(value: &Value) -> Value {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => value.clone(),
        other => Value::String(serde_json::to_string(other).unwrap_or_default()),
    }
}

/// Uppercases the letter following each `-`/`_`/` ` separator and drops
/// the separator itself; every other character is passed through
/// untouched. Because only separator-adjacent letters are ever recased,
/// applying this to an already-camelCased string is a no-op — there are
/// no separators left to act on, so `to_camel_case` is idempotent.
pub fn to_camel_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut capitalize_next = false;
    let mut started = false;
    for c in s.chars() {
        if matches!(c, '-' | '_' | ' ') {
            capitalize_next = true;
            continue;
        }
        if !started {
            out.push(c);
            started = true;
        } else if capitalize_next {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        capitalize_next = false;
    }
    out
}
