use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// `{{key}}` substitution into every string leaf of a JSON payload template.
/// Deliberately this simple: the spec's Non-goals exclude a full templating
/// language (conditionals, loops, filters) — recipients differ only by the
/// variables map, not by control flow.
#[must_use]
pub fn render(payload_template: &JsonValue, variables: &BTreeMap<String, String>) -> JsonValue {
    match payload_template {
        JsonValue::String(s) => JsonValue::String(substitute(s, variables)),
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(|v| render(v, variables)).collect()),
        JsonValue::Object(map) => {
            JsonValue::Object(map.iter().map(|(k, v)| (k.clone(), render(v, variables))).collect())
        }
        other => other.clone(),
    }
}

fn substitute(template: &str, variables: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        match after_open.find("}}") {
            Some(end) => {
                let key = after_open[..end].trim();
                if let Some(value) = variables.get(key) {
                    out.push_str(value);
                } else {
                    out.push_str(&rest[start..start + 2 + end + 2]);
                }
                rest = &after_open[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_known_keys_and_leaves_unknown_ones_verbatim() {
        let mut vars = BTreeMap::new();
        vars.insert("name".to_string(), "Ada".to_string());
        assert_eq!(substitute("Hello {{name}}, id {{missing}}", &vars), "Hello Ada, id {{missing}}");
    }

    #[test]
    fn renders_nested_objects_and_arrays() {
        let mut vars = BTreeMap::new();
        vars.insert("city".to_string(), "Berlin".to_string());
        let template = json!({"body": {"lines": ["Hi from {{city}}", "static"]}});
        let rendered = render(&template, &vars);
        assert_eq!(rendered, json!({"body": {"lines": ["Hi from Berlin", "static"]}}));
    }
}
