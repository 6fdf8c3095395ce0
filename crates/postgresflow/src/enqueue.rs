//! The Enqueuer: produces a `handler` blob in the producer's exact format
//! and inserts a row, so other DelayedJob consumers can also process it.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};

#[derive(Clone)]
pub struct Enqueuer {
    pool: PgPool,
}

impl Enqueuer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a row whose `handler` matches the producer's instance-form
    /// or class-form blob, depending on `use_instance_form`.
    pub async fn enqueue(
        &self,
        class_name: &str,
        attrs: &[(String, Value)],
        queue: &str,
        use_instance_form: bool,
        method_name: &str,
    ) -> anyhow::Result<i64> {
        self.enqueue_at(class_name, attrs, queue, use_instance_form, method_name, Utc::now())
            .await
    }

    pub async fn enqueue_at(
        &self,
        class_name: &str,
        attrs: &[(String, Value)],
        queue: &str,
        use_instance_form: bool,
        method_name: &str,
        run_at: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        let handler = build_handler_blob(class_name, attrs, use_instance_form, method_name);
        let row = sqlx::query(
            r#"
            INSERT INTO delayed_jobs (handler, queue, run_at, created_at, updated_at)
            VALUES ($1, $2, $3, now(), now())
            RETURNING id
            "#,
        )
        .bind(handler)
        .bind(queue)
        .bind(run_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }
}

/// Mirrors `generate_handler` byte-for-byte in shape.
pub fn build_handler_blob(
    class_name: &str,
    attrs: &[(String, Value)],
    use_instance_form: bool,
    method_name: &str,
) -> String {
    if use_instance_form {
        let formatted = format_args(attrs, false);
        format!(
            "--- !ruby/object:Delayed::PerformableMethod\nobject: !ruby/object:{class_name}\n  raw_attributes:\n{formatted}\n"
        )
    } else {
        let formatted = format_args(attrs, true);
        format!(
            "--- !ruby/object:Delayed::PerformableMethod\nobject: !ruby/class '{class_name}'\nmethod_name: :{method_name}\nargs:\n{formatted}\n"
        )
    }
}

/// `format_args`: `null`/empty-string ⇒ blank; string ⇒ double-quoted;
/// object/array ⇒ JSON; other scalars ⇒ `Display`-formatted as-is
/// (booleans render capitalized, matching Python's `str(True)`).
fn format_args(attrs: &[(String, Value)], yaml_style: bool) -> String {
    let lines: Vec<String> = attrs
        .iter()
        .map(|(key, value)| {
            let formatted_value = format_attribute_value(value);
            if yaml_style {
                format!(" :{key}: {formatted_value}")
            } else {
                format!("    {key}: {formatted_value}")
            }
        })
        .collect();

    if !yaml_style {
        return lines.join("\n");
    }

    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                format!("-{line}")
            } else {
                format!(" {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_attribute_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) if s.is_empty() => String::new(),
        Value::String(s) => format!("\"{s}\""),
        Value::Object(_) | Value::Array(_) => serde_json::to_string(value).unwrap_or_default(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_form_blob_shape() {
        let attrs = vec![
            ("id".to_string(), Value::from(100)),
            ("title".to_string(), Value::from("hello")),
        ];
        let blob = build_handler_blob("RegisteredJob", &attrs, true, "run");
        assert!(blob.starts_with("--- !ruby/object:Delayed::PerformableMethod\n"));
        assert!(blob.contains("object: !ruby/object:RegisteredJob\n"));
        assert!(blob.contains("  raw_attributes:\n"));
        assert!(blob.contains("    id: 100\n"));
        assert!(blob.contains("    title: \"hello\"\n"));
    }

    #[test]
    fn class_form_blob_shape() {
        let attrs = vec![
            ("user_id".to_string(), Value::from(7)),
            ("send_email".to_string(), Value::from(true)),
        ];
        let blob = build_handler_blob("ReportJob", &attrs, false, "run");
        assert!(blob.contains("object: !ruby/class 'ReportJob'\n"));
        assert!(blob.contains("method_name: :run\n"));
        assert!(blob.contains("args:\n- :user_id: 7\n  :send_email: True\n"));
    }

    #[test]
    fn enqueue_then_parse_round_trips_through_handler_parser() {
        use crate::handler::parse_handler;

        let attrs = vec![
            ("id".to_string(), Value::from(100)),
            ("title".to_string(), Value::from("hello")),
            ("active".to_string(), Value::from(true)),
            ("score".to_string(), Value::from(1.5)),
            ("deleted_at".to_string(), Value::Null),
            ("meta".to_string(), serde_json::json!({"k": "v"})),
        ];
        let blob = build_handler_blob("RegisteredJob", &attrs, true, "run");
        let parsed = parse_handler(&blob).unwrap();
        assert_eq!(parsed.class_name, "RegisteredJob");
        assert_eq!(parsed.attributes["id"], 100);
        assert_eq!(parsed.attributes["title"], "hello");
        assert_eq!(parsed.attributes["active"], true);
        assert_eq!(parsed.attributes["score"], 1.5);
        assert_eq!(parsed.attributes["meta"]["k"], "v");
    }
}
