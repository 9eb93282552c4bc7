use serde_json::{Map, Number, Value};
use std::iter::Peekable;
use std::str::CharIndices;

/// Permissive JSON repair: tolerates trailing commas, unquoted keys, single
/// quotes, unterminated strings/arrays/objects, and extraneous prose around
/// the JSON body (the caller is expected to have already trimmed obvious
/// prose via the fenced-block / brace-scan steps in `salvage`; this pass
/// only needs to cope with what's left).
///
/// Returns `None` when the input contains no recognizable JSON value at all
/// (e.g. plain prose with no braces, brackets, quotes, or literals).
pub fn repair(input: &str) -> Option<Value> {
    let mut cursor = Cursor::new(input);
    cursor.skip_ws();
    match cursor.peek_char()? {
        '{' | '[' => cursor.parse_value(),
        _ => None,
    }
}

struct Cursor<'a> {
    src: &'a str,
    iter: Peekable<CharIndices<'a>>,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, iter: src.char_indices().peekable() }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.iter.peek().map(|(_, c)| *c)
    }

    fn bump(&mut self) -> Option<char> {
        self.iter.next().map(|(_, c)| c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek_char(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn skip_ws_and_commas(&mut self) {
        while matches!(self.peek_char(), Some(c) if c.is_whitespace() || c == ',') {
            self.bump();
        }
    }

    fn parse_value(&mut self) -> Option<Value> {
        self.skip_ws();
        match self.peek_char()? {
            '{' => self.parse_object(),
            '[' => self.parse_array(),
            '"' | '\'' => Some(Value::String(self.parse_string()?)),
            _ => self.parse_bare(),
        }
    }

    fn parse_object(&mut self) -> Option<Value> {
        self.bump(); // consume '{'
        let mut map = Map::new();
        loop {
            self.skip_ws_and_commas();
            match self.peek_char() {
                None => break,
                Some('}') => {
                    self.bump();
                    break;
                }
                _ => {}
            }
            let key = self.parse_key()?;
            self.skip_ws();
            if self.peek_char() == Some(':') {
                self.bump();
            } else {
                // malformed key/value pair with no colon; skip it
                continue;
            }
            self.skip_ws();
            let value = self.parse_value().unwrap_or(Value::Null);
            map.insert(key, value);
            self.skip_ws();
            match self.peek_char() {
                Some(',') => {
                    self.bump();
                }
                Some('}') => {
                    self.bump();
                    break;
                }
                _ => {}
            }
        }
        Some(Value::Object(map))
    }

    fn parse_array(&mut self) -> Option<Value> {
        self.bump(); // consume '['
        let mut items = Vec::new();
        loop {
            self.skip_ws_and_commas();
            match self.peek_char() {
                None => break,
                Some(']') => {
                    self.bump();
                    break;
                }
                _ => {}
            }
            let value = self.parse_value()?;
            items.push(value);
            self.skip_ws();
            match self.peek_char() {
                Some(',') => {
                    self.bump();
                }
                Some(']') => {
                    self.bump();
                    break;
                }
                _ => {}
            }
        }
        Some(Value::Array(items))
    }

    fn parse_key(&mut self) -> Option<String> {
        self.skip_ws();
        match self.peek_char()? {
            '"' | '\'' => self.parse_string(),
            _ => {
                let mut out = String::new();
                while let Some(c) = self.peek_char() {
                    if c == ':' || c.is_whitespace() || c == ',' || c == '}' {
                        break;
                    }
                    out.push(c);
                    self.bump();
                }
                if out.is_empty() { None } else { Some(out) }
            }
        }
    }

    fn parse_string(&mut self) -> Option<String> {
        let quote = self.bump()?; // consume opening quote
        let mut out = String::new();
        loop {
            match self.bump() {
                None => break, // unterminated string: return what we have
                Some(c) if c == quote => break,
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(other) => out.push(other),
                    None => break,
                },
                Some(c) => out.push(c),
            }
        }
        Some(out)
    }

    fn parse_bare(&mut self) -> Option<Value> {
        let start = self.iter.peek()?.0;
        let mut end = start;
        while let Some((i, c)) = self.iter.peek().copied() {
            if c == ',' || c == '}' || c == ']' || c.is_whitespace() {
                break;
            }
            end = i + c.len_utf8();
            self.bump();
        }
        let tok = &self.src[start..end];
        if tok.is_empty() {
            return None;
        }
        match tok {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            "null" => Some(Value::Null),
            _ => {
                if let Ok(n) = tok.parse::<i64>() {
                    Some(Value::Number(Number::from(n)))
                } else if let Ok(f) = tok.parse::<f64>() {
                    Number::from_f64(f).map(Value::Number)
                } else {
                    Some(Value::String(tok.to_string()))
                }
            }
        }
    }
}
