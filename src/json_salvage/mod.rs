mod repair;

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Result of tolerant JSON extraction from free-form LLM output.
///
/// Callers pattern-match on this rather than inspecting a `serde_json::Value`
/// directly, since a `Value` can also be a bare string or number — shapes
/// this pipeline never expects from a chat completion.
#[derive(Debug, Clone, PartialEq)]
pub enum LLMValue {
    Object(serde_json::Map<String, Value>),
    Array(Vec<Value>),
    Null,
}

impl LLMValue {
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            LLMValue::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&serde_json::Map<String, Value>> {
        match self {
            LLMValue::Object(m) => Some(m),
            _ => None,
        }
    }
}

fn from_value(v: Value) -> LLMValue {
    match v {
        Value::Object(m) => LLMValue::Object(m),
        Value::Array(a) => LLMValue::Array(a),
        _ => LLMValue::Null,
    }
}

fn code_fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").unwrap())
}

/// Tolerant JSON extraction, per the strategy:
/// 1. trim; empty -> Null (treated by callers as "no usable data")
/// 2. fenced code block -> strict parse, then permissive repair
/// 3. whole text -> strict parse
/// 4. scan to first `{`/`[` -> permissive repair on the tail
/// 5. permissive repair on the whole text
/// 6. give up -> Null
pub fn salvage(text: &str) -> LLMValue {
    let text = text.trim();
    if text.is_empty() {
        return LLMValue::Array(Vec::new());
    }

    if let Some(caps) = code_fence_re().captures(text) {
        let inner = caps.get(1).map(|m| m.as_str()).unwrap_or("").trim();
        if let Ok(v) = serde_json::from_str::<Value>(inner) {
            return from_value(v);
        }
        if let Some(v) = repair::repair(inner) {
            return from_value(v);
        }
    }

    if let Ok(v) = serde_json::from_str::<Value>(text) {
        return from_value(v);
    }

    if let Some(start) = text.find(['{', '[']) {
        if let Some(v) = repair::repair(&text[start..]) {
            return from_value(v);
        }
    }

    if let Some(v) = repair::repair(text) {
        return from_value(v);
    }

    LLMValue::Array(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_empty_list() {
        assert_eq!(salvage(""), LLMValue::Array(Vec::new()));
        assert_eq!(salvage("   "), LLMValue::Array(Vec::new()));
    }

    #[test]
    fn idempotent_on_valid_json() {
        let input = r#"[{"id":1,"trans":"hi"}]"#;
        let a = salvage(input);
        let again = serde_json::to_string(&match &a {
            LLMValue::Array(v) => Value::Array(v.clone()),
            _ => panic!("expected array"),
        })
        .unwrap();
        assert_eq!(salvage(&again), a);
    }

    #[test]
    fn extracts_from_fenced_code_block() {
        let input = "Here you go:\n```json\n{\"a\": \"b\"}\n```\nthanks";
        let v = salvage(input);
        assert_eq!(v.as_object().unwrap().get("a").unwrap(), "b");
    }

    #[test]
    fn extracts_from_plain_code_fence() {
        let input = "```\n[1,2,3]\n```";
        let v = salvage(input);
        assert_eq!(v.as_array().unwrap().len(), 3);
    }

    #[test]
    fn parses_bare_json() {
        let v = salvage(r#"{"x": 1}"#);
        assert_eq!(v.as_object().unwrap().get("x").unwrap(), 1);
    }

    #[test]
    fn strips_leading_prose_before_braces() {
        let input = "Sure, here is the result: {\"a\": 1}";
        let v = salvage(input);
        assert_eq!(v.as_object().unwrap().get("a").unwrap(), 1);
    }

    #[test]
    fn repairs_trailing_commas_and_single_quotes() {
        let input = "{'a': 1, 'b': 2,}";
        let v = salvage(input);
        let obj = v.as_object().unwrap();
        assert_eq!(obj.get("a").unwrap(), 1);
        assert_eq!(obj.get("b").unwrap(), 2);
    }

    #[test]
    fn total_gibberish_returns_empty_list() {
        assert_eq!(salvage("the quick brown fox"), LLMValue::Array(Vec::new()));
    }
}
