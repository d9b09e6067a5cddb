//! Reader for inventories written as Python literal text.
//!
//! Older inventory files hold `str(list_of_dicts)` rather than JSON, e.g.
//! `[{'name': 'r1', 'ip': '10.0.0.1', ...}]`. Only that exact shape is
//! accepted: a list of dicts whose keys and values are all string literals.
//! Numbers, nested containers, names and calls are rejected, so nothing in the
//! decrypted text is ever evaluated.

use serde_json::{Map, Value};

/// Parses a list of string-to-string dicts into a JSON array of objects.
///
/// Returns `None` for anything outside that shape.
pub(crate) fn parse_records(text: &str) -> Option<Value> {
    let mut parser = Parser {
        chars: text.chars().collect(),
        pos: 0,
    };
    let records = parser.list()?;
    parser.skip_ws();
    if parser.pos != parser.chars.len() {
        return None;
    }
    Some(Value::Array(records))
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Parses `open item (, item)* [,] close`, allowing an empty sequence.
    fn sequence<T>(
        &mut self,
        open: char,
        close: char,
        mut item: impl FnMut(&mut Self) -> Option<T>,
    ) -> Option<Vec<T>> {
        if !self.eat(open) {
            return None;
        }
        let mut items = Vec::new();
        if self.eat(close) {
            return Some(items);
        }
        loop {
            items.push(item(self)?);
            if self.eat(close) {
                return Some(items);
            }
            if !self.eat(',') {
                return None;
            }
            if self.eat(close) {
                return Some(items);
            }
        }
    }

    fn list(&mut self) -> Option<Vec<Value>> {
        self.sequence('[', ']', Self::dict)
    }

    fn dict(&mut self) -> Option<Value> {
        let pairs = self.sequence('{', '}', |p| {
            let key = p.string()?;
            if !p.eat(':') {
                return None;
            }
            let value = p.string()?;
            Some((key, value))
        })?;

        let mut map = Map::new();
        for (key, value) in pairs {
            if map.insert(key, Value::String(value)).is_some() {
                return None;
            }
        }
        Some(Value::Object(map))
    }

    /// Parses one single- or double-quoted string literal.
    fn string(&mut self) -> Option<String> {
        self.skip_ws();
        let quote = match self.next()? {
            q @ ('\'' | '"') => q,
            _ => return None,
        };

        let mut out = String::new();
        loop {
            match self.next()? {
                c if c == quote => return Some(out),
                '\n' => return None,
                '\\' => out.push(self.escape()?),
                c => out.push(c),
            }
        }
    }

    fn escape(&mut self) -> Option<char> {
        Some(match self.next()? {
            '\\' => '\\',
            '\'' => '\'',
            '"' => '"',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            '0' => '\0',
            'a' => '\u{07}',
            'b' => '\u{08}',
            'f' => '\u{0c}',
            'v' => '\u{0b}',
            'x' => self.hex(2)?,
            'u' => self.hex(4)?,
            'U' => self.hex(8)?,
            _ => return None,
        })
    }

    fn hex(&mut self, digits: usize) -> Option<char> {
        let mut code = 0u32;
        for _ in 0..digits {
            code = code * 16 + self.next()?.to_digit(16)?;
        }
        char::from_u32(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_repr_of_device_list() {
        let text = "[{'name': 'r1', 'ip': '10.0.0.1', 'user': 'admin', 'password': 'pw', 'os': 'cisco_ios'}, \
                    {'name': 'sw1', 'ip': 'sw1.lab', 'user': 'ops', 'password': 'x', 'os': 'arista_eos'}]";

        let value = parse_records(text).unwrap();

        assert_eq!(
            value,
            json!([
                {"name": "r1", "ip": "10.0.0.1", "user": "admin", "password": "pw", "os": "cisco_ios"},
                {"name": "sw1", "ip": "sw1.lab", "user": "ops", "password": "x", "os": "arista_eos"}
            ])
        );
    }

    #[test]
    fn test_empty_list() {
        assert_eq!(parse_records("[]").unwrap(), json!([]));
        assert_eq!(parse_records(" [ ] \n").unwrap(), json!([]));
    }

    #[test]
    fn test_quotes_and_escapes() {
        // repr switches to double quotes when the text holds a single quote.
        let text = r#"[{"password": "it's", 'note': 'a\\b\'c\n\x41é'}]"#;

        let value = parse_records(text).unwrap();

        assert_eq!(value, json!([{"password": "it's", "note": "a\\b'c\nAé"}]));
    }

    #[test]
    fn test_rejects_non_string_values() {
        assert!(parse_records("[{'name': 'r1', 'port': 22}]").is_none());
        assert!(parse_records("[{'name': None}]").is_none());
        assert!(parse_records("[{'name': ['r1']}]").is_none());
        assert!(parse_records("['r1']").is_none());
    }

    #[test]
    fn test_rejects_expressions_and_trailing_text() {
        assert!(parse_records("__import__('os').system('id')").is_none());
        assert!(parse_records("[{'name': 'r1'}] + []").is_none());
        assert!(parse_records("[{'name': 'r1'}").is_none());
        assert!(parse_records("[{'name': 'r1', 'name': 'r2'}]").is_none());
        assert!(parse_records("[{'name': 'unterminated}]").is_none());
    }
}
