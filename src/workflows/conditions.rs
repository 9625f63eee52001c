// Workflow Conditions - Branch expression parsing and evaluation
//
// The grammar is deliberately tiny: `LHS <op> RHS` with op one of
// ==, !=, >, < . Each side is either a `{{path}}` context reference or a
// JSON literal (bare words fall back to string literals). There are no
// boolean combinators; rule-level filters use the dispatcher's conjunction
// of exact-match pairs instead. Interpolated text is never executed.

use serde_json::Value;

use super::interpolate;
use crate::error::WorkflowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Gt,
    Lt,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A `{{dotted.path}}` reference into the event context.
    Path(String),
    Literal(Value),
}

/// Parsed form of a branch expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub lhs: Operand,
    pub comparator: Comparator,
    pub rhs: Operand,
}

impl Comparison {
    /// Parse `LHS <op> RHS`. Called at rule-creation time so malformed
    /// expressions are rejected before a rule can ever run.
    pub fn parse(expression: &str) -> Result<Self, WorkflowError> {
        let (lhs, comparator, rhs) = split_on_operator(expression)?;

        Ok(Self {
            lhs: parse_operand(lhs),
            comparator,
            rhs: parse_operand(rhs),
        })
    }

    /// Evaluate against an event context. Never fails: unresolvable paths
    /// compare as null, non-numeric ordering operands yield false.
    pub fn evaluate(&self, context: &Value) -> bool {
        let lhs = resolve(&self.lhs, context);
        let rhs = resolve(&self.rhs, context);

        match self.comparator {
            Comparator::Eq => normalize(&lhs) == normalize(&rhs),
            Comparator::Ne => normalize(&lhs) != normalize(&rhs),
            Comparator::Gt => match (as_number(&lhs), as_number(&rhs)) {
                (Some(l), Some(r)) => l > r,
                _ => false,
            },
            Comparator::Lt => match (as_number(&lhs), as_number(&rhs)) {
                (Some(l), Some(r)) => l < r,
                _ => false,
            },
        }
    }
}

/// Find the single top-level comparison operator, skipping anything inside
/// `{{ }}` tokens or double-quoted literals.
fn split_on_operator(expression: &str) -> Result<(&str, Comparator, &str), WorkflowError> {
    // Byte-wise scan; every byte this cares about is ASCII, so slicing at
    // an operator position is always a char boundary.
    let bytes = expression.as_bytes();
    let mut brace_depth = 0usize;
    let mut in_quotes = false;
    let mut i = 0;

    while i < bytes.len() {
        let pair = (bytes[i], bytes.get(i + 1).copied());

        if in_quotes {
            if bytes[i] == b'"' {
                in_quotes = false;
            }
            i += 1;
            continue;
        }

        if pair == (b'{', Some(b'{')) {
            brace_depth += 1;
            i += 2;
            continue;
        }
        if pair == (b'}', Some(b'}')) {
            brace_depth = brace_depth.saturating_sub(1);
            i += 2;
            continue;
        }
        if bytes[i] == b'"' {
            in_quotes = true;
            i += 1;
            continue;
        }

        if brace_depth == 0 {
            let comparator = match pair {
                (b'=', Some(b'=')) => Some((Comparator::Eq, 2)),
                (b'!', Some(b'=')) => Some((Comparator::Ne, 2)),
                (b'>', Some(b'=')) | (b'<', Some(b'=')) => {
                    return Err(WorkflowError::InvalidRule(format!(
                        "unsupported operator in condition '{expression}'"
                    )));
                }
                (b'>', _) => Some((Comparator::Gt, 1)),
                (b'<', _) => Some((Comparator::Lt, 1)),
                _ => None,
            };

            if let Some((comparator, width)) = comparator {
                let lhs = expression[..i].trim();
                let rhs = expression[i + width..].trim();
                if lhs.is_empty() || rhs.is_empty() {
                    return Err(WorkflowError::InvalidRule(format!(
                        "condition '{expression}' is missing an operand"
                    )));
                }
                return Ok((lhs, comparator, rhs));
            }
        }

        i += 1;
    }

    Err(WorkflowError::InvalidRule(format!(
        "condition '{expression}' has no comparison operator"
    )))
}

fn parse_operand(text: &str) -> Operand {
    if text.starts_with("{{") && text.ends_with("}}") {
        let path = text[2..text.len() - 2].trim().to_string();
        return Operand::Path(path);
    }

    match serde_json::from_str::<Value>(text) {
        Ok(value) => Operand::Literal(value),
        // Bare words read as string literals, e.g. `{{service.type}} == tuning`.
        Err(_) => Operand::Literal(Value::String(text.to_string())),
    }
}

fn resolve(operand: &Operand, context: &Value) -> Value {
    match operand {
        Operand::Path(path) => interpolate::lookup(context, path)
            .cloned()
            .unwrap_or(Value::Null),
        Operand::Literal(value) => value.clone(),
    }
}

/// JSON-normalize for equality: strings that parse as a JSON scalar compare
/// as their parsed form, so `"3"` and `3` are equal.
fn normalize(value: &Value) -> Value {
    if let Value::String(s) = value {
        if let Ok(parsed) = serde_json::from_str::<Value>(s.trim()) {
            return parsed;
        }
    }
    value.clone()
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_shapes() {
        let comparison = Comparison::parse("{{invoice.amount}} > 100").unwrap();
        assert_eq!(comparison.comparator, Comparator::Gt);
        assert_eq!(comparison.lhs, Operand::Path("invoice.amount".to_string()));
        assert_eq!(comparison.rhs, Operand::Literal(json!(100)));

        let comparison = Comparison::parse("{{service.type}} == \"tuning\"").unwrap();
        assert_eq!(comparison.rhs, Operand::Literal(json!("tuning")));

        let comparison = Comparison::parse("{{service.type}} == tuning").unwrap();
        assert_eq!(comparison.rhs, Operand::Literal(json!("tuning")));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Comparison::parse("{{x}}").is_err());
        assert!(Comparison::parse("{{x}} >= 3").is_err());
        assert!(Comparison::parse("{{x}} ==").is_err());
    }

    #[test]
    fn test_numeric_comparison() {
        let ctx = json!({"x": 15});
        assert!(Comparison::parse("{{x}} > 10").unwrap().evaluate(&ctx));
        assert!(!Comparison::parse("{{x}} < 10").unwrap().evaluate(&ctx));

        // Non-numeric operands make the comparison false, never an error.
        let ctx = json!({"x": "abc"});
        assert!(!Comparison::parse("{{x}} > 10").unwrap().evaluate(&ctx));

        // Numeric strings coerce.
        let ctx = json!({"x": "15"});
        assert!(Comparison::parse("{{x}} > 10").unwrap().evaluate(&ctx));
    }

    #[test]
    fn test_equality_json_normalized() {
        let ctx = json!({"count": 3, "label": "3"});
        assert!(Comparison::parse("{{count}} == 3").unwrap().evaluate(&ctx));
        assert!(Comparison::parse("{{label}} == 3").unwrap().evaluate(&ctx));
        assert!(Comparison::parse("{{count}} != 4").unwrap().evaluate(&ctx));
    }

    #[test]
    fn test_missing_path_compares_as_null() {
        let ctx = json!({});
        assert!(!Comparison::parse("{{x}} == 3").unwrap().evaluate(&ctx));
        assert!(Comparison::parse("{{x}} != 3").unwrap().evaluate(&ctx));
        assert!(Comparison::parse("{{x}} == null").unwrap().evaluate(&ctx));
        assert!(!Comparison::parse("{{x}} > 1").unwrap().evaluate(&ctx));
    }

    #[test]
    fn test_operator_inside_quotes_ignored() {
        let comparison = Comparison::parse("\"a > b\" == {{label}}").unwrap();
        assert_eq!(comparison.comparator, Comparator::Eq);
        assert_eq!(comparison.lhs, Operand::Literal(json!("a > b")));
        assert!(comparison.evaluate(&json!({"label": "a > b"})));
    }
}
