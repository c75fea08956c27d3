//! Keys from text, one per line.

use crate::builder::PhashError;
use crate::config::{KeyKind, Mode};
use crate::key::KeyData;
use std::io::BufRead;

/// Read one key per line in the format `mode` expects.
///
/// String modes keep every line, empty ones included, minus the line ending.
/// Numeric modes skip blank lines; pair modes want two numbers per line.
pub fn load_keys<R: BufRead>(mut reader: R, mode: Mode) -> Result<Vec<KeyData>, PhashError> {
    let mut keys = Vec::new();
    let mut buf = Vec::new();
    let mut line = 0;
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| PhashError::Parse { line: line + 1, reason: e.to_string() })?;
        if n == 0 {
            break;
        }
        line += 1;
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        match mode.radix() {
            None => keys.push(KeyData::Bytes(buf.clone())),
            Some(radix) => {
                let text = std::str::from_utf8(&buf)
                    .map_err(|e| PhashError::Parse { line, reason: e.to_string() })?;
                let mut fields = text.split_whitespace();
                let Some(first) = fields.next() else { continue };
                let a = parse(first, radix, line)?;
                let key = if mode.kind() == KeyKind::Pair {
                    let second = fields.next().ok_or_else(|| PhashError::Parse {
                        line,
                        reason: "expected two numbers".into(),
                    })?;
                    KeyData::Pair { a, b: parse(second, radix, line)? }
                } else {
                    KeyData::Int(a)
                };
                keys.push(key);
            }
        }
    }
    Ok(keys)
}

fn parse(field: &str, radix: u32, line: usize) -> Result<u32, PhashError> {
    let digits = if radix == 16 {
        field.strip_prefix("0x").or_else(|| field.strip_prefix("0X")).unwrap_or(field)
    } else {
        field
    };
    u32::from_str_radix(digits, radix).map_err(|e| PhashError::Parse { line, reason: format!("{field:?}: {e}") })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn strings_keep_empty_lines() {
        let keys = load_keys(Cursor::new("if\n\nelse\n"), Mode::Inline).unwrap();
        assert_eq!(keys, vec![KeyData::from("if"), KeyData::from(""), KeyData::from("else")]);
    }

    #[test]
    fn last_line_needs_no_newline() {
        let keys = load_keys(Cursor::new(b"a\xffb\nend".as_slice()), Mode::Generic).unwrap();
        assert_eq!(keys, vec![KeyData::from(b"a\xffb"), KeyData::from("end")]);
    }

    #[test]
    fn hex_and_decimal() {
        let keys = load_keys(Cursor::new("ff\n  \n0x10\n"), Mode::Hex).unwrap();
        assert_eq!(keys, vec![KeyData::Int(255), KeyData::Int(16)]);
        let keys = load_keys(Cursor::new("10\n4294967295\n"), Mode::Decimal).unwrap();
        assert_eq!(keys, vec![KeyData::Int(10), KeyData::Int(u32::MAX)]);
    }

    #[test]
    fn pairs() {
        let keys = load_keys(Cursor::new("1 2\n3\t4\n"), Mode::DecimalPair).unwrap();
        assert_eq!(keys, vec![KeyData::Pair { a: 1, b: 2 }, KeyData::Pair { a: 3, b: 4 }]);
        let err = load_keys(Cursor::new("a b\nc\n"), Mode::HexPair).unwrap_err();
        assert!(matches!(err, PhashError::Parse { line: 2, .. }));
    }

    #[test]
    fn bad_numbers_name_the_line() {
        let err = load_keys(Cursor::new("1\n2\nx3\n"), Mode::Decimal).unwrap_err();
        assert!(matches!(err, PhashError::Parse { line: 3, .. }));
        assert!(err.to_string().starts_with("line 3: "));
    }
}
