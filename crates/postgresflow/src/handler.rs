//! Decodes the `handler` text column into a class name plus attributes.
//!
//! The blob is produced by a foreign ecosystem (Ruby's `DelayedJob`); we
//! do not hand it to a general YAML loader wholesale, since a loader with
//! object-construction tags enabled would try to instantiate arbitrary
//! Ruby classes. Only the two fixed header lines are matched with a
//! regex; the indented attribute/args block is extracted by plain line
//! scanning and handed to `serde_yaml` as a flat document.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq)]
pub enum HandlerShape {
    /// `object: !ruby/object:<ClassName>` — executed on a constructed instance.
    Instance,
    /// `object: !ruby/class '<ClassName>'` — executed as `<method_name>` on the class.
    Class { method_name: String },
}

#[derive(Debug, Clone)]
pub struct ParsedHandler {
    pub class_name: String,
    pub shape: HandlerShape,
    pub attributes: Value,
}

fn object_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^object: !ruby/object:(.+)$").unwrap())
}

fn class_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^object: !ruby/class '(.+)'$").unwrap())
}

fn method_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^method_name: :?(.+)$").unwrap())
}

pub fn parse_handler(blob: &str) -> anyhow::Result<ParsedHandler> {
    let lines: Vec<&str> = blob.lines().collect();
    if lines.len() < 2 {
        anyhow::bail!("handler blob too short to contain a header");
    }
    let header = lines[1];

    if let Some(caps) = object_header_re().captures(header) {
        let class_name = caps[1].to_string();
        let attribute_lines = extract_indented_block(&lines[2..], "  raw_attributes:");
        let attributes = parse_attribute_block(&attribute_lines)?;
        return Ok(ParsedHandler {
            class_name,
            shape: HandlerShape::Instance,
            attributes,
        });
    }

    if let Some(caps) = class_header_re().captures(header) {
        let class_name = caps[1].to_string();
        let method_name = lines[2..]
            .iter()
            .find_map(|line| method_name_re().captures(line).map(|c| c[1].to_string()))
            .ok_or_else(|| anyhow::anyhow!("class-form handler missing method_name line"))?;
        let args_lines = extract_args_block(&lines[2..]);
        let attributes = parse_args_block(&args_lines)?;
        return Ok(ParsedHandler {
            class_name,
            shape: HandlerShape::Class { method_name },
            attributes,
        });
    }

    anyhow::bail!("unrecognized handler header: {header}")
}

/// Locates the first line equal to `marker` and collects every following
/// line that begins with four spaces, stopping at the first line that
/// starts with a shallower prefix after collection began. This mirrors
/// `pyworker/job.py`'s `extract_attributes` exactly.
fn extract_indented_block(lines: &[&str], marker: &str) -> Vec<String> {
    let mut collecting = false;
    let mut out = Vec::new();
    for line in lines {
        if line.starts_with(marker) {
            collecting = true;
        } else if !line.starts_with("    ") {
            if collecting {
                break;
            }
        } else if collecting {
            out.push(line.to_string());
        }
    }
    out
}

fn parse_attribute_block(lines: &[String]) -> anyhow::Result<Value> {
    if lines.is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    let mut doc = String::from("object:\n  attributes:\n");
    for line in lines {
        doc.push_str(line);
        doc.push('\n');
    }
    let yaml_value: serde_yaml::Value = serde_yaml::from_str(&doc)?;
    let attributes = yaml_value
        .get("object")
        .and_then(|o| o.get("attributes"))
        .cloned()
        .unwrap_or(serde_yaml::Value::Mapping(Default::default()));
    Ok(serde_json::to_value(attributes)?)
}

/// Collects the `args:` sequence block: lines starting with `-` (the
/// first entry) or leading whitespace (continuations/subsequent entries),
/// stopping at the first unindented, non-`-` line.
fn extract_args_block(lines: &[&str]) -> Vec<String> {
    let mut collecting = false;
    let mut out = Vec::new();
    for line in lines {
        if *line == "args:" || line.starts_with("args:") {
            collecting = true;
            continue;
        }
        if !collecting {
            continue;
        }
        if line.starts_with('-') || line.starts_with(' ') {
            out.push(line.to_string());
        } else {
            break;
        }
    }
    out
}

fn parse_args_block(lines: &[String]) -> anyhow::Result<Value> {
    if lines.is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    let mut doc = String::from("args:\n");
    for line in lines {
        doc.push_str(line);
        doc.push('\n');
    }
    let yaml_value: serde_yaml::Value = serde_yaml::from_str(&doc)?;
    let sequence = yaml_value
        .get("args")
        .cloned()
        .unwrap_or(serde_yaml::Value::Sequence(Default::default()));

    // Each sequence entry is a single-key mapping whose key carries a
    // leading `:` (a Ruby symbol literal). Merge all entries into one
    // flat mapping and strip the leading `:` so callers see plain string
    // keys, matching the instance-form attribute shape.
    let mut merged = serde_json::Map::new();
    if let serde_yaml::Value::Sequence(entries) = sequence {
        for entry in entries {
            if let serde_yaml::Value::Mapping(map) = entry {
                for (k, v) in map {
                    let key = match k {
                        serde_yaml::Value::String(s) => s,
                        other => serde_yaml::to_string(&other)?.trim().to_string(),
                    };
                    let key = key.strip_prefix(':').unwrap_or(&key).to_string();
                    merged.insert(key, serde_json::to_value(v)?);
                }
            }
        }
    }
    Ok(Value::Object(merged))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_instance_form() {
        let blob = "--- !ruby/object:Delayed::PerformableMethod\nobject: !ruby/object:RegisteredJob\n  raw_attributes:\n    id: 100\n    title: \"hello\"\n";
        let parsed = parse_handler(blob).unwrap();
        assert_eq!(parsed.class_name, "RegisteredJob");
        assert_eq!(parsed.shape, HandlerShape::Instance);
        assert_eq!(parsed.attributes["id"], 100);
        assert_eq!(parsed.attributes["title"], "hello");
    }

    #[test]
    fn parses_class_form() {
        let blob = "--- !ruby/object:Delayed::PerformableMethod\nobject: !ruby/class 'ReportJob'\nmethod_name: :run\nargs:\n- :user_id: 7\n  :send_email: true\n";
        let parsed = parse_handler(blob).unwrap();
        assert_eq!(parsed.class_name, "ReportJob");
        assert_eq!(
            parsed.shape,
            HandlerShape::Class {
                method_name: "run".to_string()
            }
        );
        assert_eq!(parsed.attributes["user_id"], 7);
        assert_eq!(parsed.attributes["send_email"], true);
    }

    #[test]
    fn unrecognized_header_is_an_error() {
        let blob = "--- !ruby/object:Delayed::PerformableMethod\nsomething: else\n";
        assert!(parse_handler(blob).is_err());
    }

    #[test]
    fn too_short_blob_is_an_error() {
        assert!(parse_handler("only one line").is_err());
    }
}
