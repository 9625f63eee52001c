// Variable interpolation against the captured event context
//
// Supports `{{dotted.path}}` tokens. A string that consists of exactly one
// token resolves to the typed context value (so `"{{invoice.amount}}"` stays
// a number). Tokens embedded in longer strings are stringified; tokens whose
// path resolves to nothing are left untouched so a missing variable is a
// visible no-op rather than corrupted output.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").unwrap());
static WHOLE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{\{\s*([^{}]+?)\s*\}\}$").unwrap());

/// Walk a dotted path through nested objects. Any missing segment yields
/// `None`; arrays and scalars do not participate in path traversal.
pub fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = context;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Interpolate a single string. Returns a typed value for whole-token
/// strings, otherwise a string with embedded tokens substituted.
pub fn interpolate_string(template: &str, context: &Value) -> Value {
    if let Some(captures) = WHOLE_TOKEN.captures(template) {
        return match lookup(context, &captures[1]) {
            Some(value) => value.clone(),
            None => Value::String(template.to_string()),
        };
    }

    let replaced = TOKEN.replace_all(template, |captures: &regex::Captures<'_>| {
        match lookup(context, &captures[1]) {
            Some(value) => display_scalar(value),
            None => captures[0].to_string(),
        }
    });

    Value::String(replaced.into_owned())
}

/// Recursively interpolate every string inside a JSON value. Non-string
/// scalars pass through unchanged.
pub fn interpolate_value(value: &Value, context: &Value) -> Value {
    match value {
        Value::String(s) => interpolate_string(s, context),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| interpolate_value(item, context))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), interpolate_value(item, context)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Interpolate a typed action configuration by round-tripping it through
/// JSON. Fails when a resolved value no longer fits the config's shape
/// (e.g. a path resolving to an object where a string is required); callers
/// treat that as a handled configuration failure.
pub fn interpolate_config<T>(config: &T, context: &Value) -> Result<T, serde_json::Error>
where
    T: Serialize + DeserializeOwned,
{
    let raw = serde_json::to_value(config)?;
    serde_json::from_value(interpolate_value(&raw, context))
}

fn display_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> Value {
        json!({
            "client": {"first_name": "Ana", "email": "a@b.com", "id": 42},
            "invoice": {"number": "INV-1", "amount": 120.5}
        })
    }

    #[test]
    fn test_plain_string_unchanged() {
        let result = interpolate_string("no tokens here", &context());
        assert_eq!(result, json!("no tokens here"));
    }

    #[test]
    fn test_whole_token_preserves_type() {
        assert_eq!(interpolate_string("{{client.id}}", &context()), json!(42));
        assert_eq!(
            interpolate_string("{{invoice.amount}}", &context()),
            json!(120.5)
        );
    }

    #[test]
    fn test_embedded_tokens_stringify() {
        let result = interpolate_string("Follow up {{client.first_name}}", &context());
        assert_eq!(result, json!("Follow up Ana"));

        let result = interpolate_string("Invoice {{invoice.number}}: {{invoice.amount}}", &context());
        assert_eq!(result, json!("Invoice INV-1: 120.5"));
    }

    #[test]
    fn test_missing_path_left_untouched() {
        let result = interpolate_string("Hi {{client.nickname}}", &context());
        assert_eq!(result, json!("Hi {{client.nickname}}"));

        let result = interpolate_string("{{piano.brand}}", &context());
        assert_eq!(result, json!("{{piano.brand}}"));
    }

    #[test]
    fn test_recursive_value_interpolation() {
        let config = json!({
            "to": "{{client.email}}",
            "amount": "{{invoice.amount}}",
            "nested": {"line": "For {{client.first_name}}"},
            "count": 3
        });

        let result = interpolate_value(&config, &context());
        assert_eq!(result["to"], json!("a@b.com"));
        assert_eq!(result["amount"], json!(120.5));
        assert_eq!(result["nested"]["line"], json!("For Ana"));
        assert_eq!(result["count"], json!(3));
    }

    #[test]
    fn test_lookup_missing_segments() {
        let ctx = context();
        assert!(lookup(&ctx, "client.email").is_some());
        assert!(lookup(&ctx, "client.email.domain").is_none());
        assert!(lookup(&ctx, "quote.number").is_none());
    }
}
