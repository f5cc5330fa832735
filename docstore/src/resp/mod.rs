// RESP wire values - command encoding and incremental reply parsing

use crate::error::TransportError;
use std::fmt;

/// A reply value as sent by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Nil,
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Vec<u8>),
    Array(Vec<Value>),
}

impl Value {
    pub fn bulk(bytes: impl Into<Vec<u8>>) -> Self {
        Value::BulkString(bytes.into())
    }

    pub fn ok() -> Self {
        Value::SimpleString("OK".to_string())
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Value::SimpleString(s) if s == "OK")
    }

    /// Textual content of a simple or bulk string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::SimpleString(s) => Some(s),
            Value::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::SimpleString(s) => Some(s.as_bytes()),
            Value::BulkString(b) => Some(b),
            _ => None,
        }
    }

    /// Integer replies, or strings holding an integer (some commands send counts as strings).
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            other => other.as_str().and_then(|s| s.parse().ok()),
        }
    }

    pub fn into_array(self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Turn an error reply into a `TransportError::Server`.
    pub fn into_result(self) -> Result<Value, TransportError> {
        match self {
            Value::Error(message) => Err(TransportError::Server(message)),
            other => Ok(other),
        }
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Value::Nil => out.extend_from_slice(b"$-1\r\n"),
            Value::SimpleString(s) => write_line(out, b'+', s.as_bytes()),
            Value::Error(s) => write_line(out, b'-', s.as_bytes()),
            Value::Integer(n) => write_line(out, b':', n.to_string().as_bytes()),
            Value::BulkString(b) => write_bulk(out, b),
            Value::Array(items) => {
                write_line(out, b'*', items.len().to_string().as_bytes());
                for item in items {
                    item.write_to(out);
                }
            }
        }
    }

    /// Serialize the value in RESP form.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("(nil)"),
            Value::SimpleString(s) => f.write_str(s),
            Value::Error(s) => write!(f, "(error) {s}"),
            Value::Integer(n) => write!(f, "(integer) {n}"),
            Value::BulkString(b) => write!(f, "\"{}\"", String::from_utf8_lossy(b)),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

fn write_line(out: &mut Vec<u8>, tag: u8, body: &[u8]) {
    out.push(tag);
    out.extend_from_slice(body);
    out.extend_from_slice(b"\r\n");
}

fn write_bulk(out: &mut Vec<u8>, bytes: &[u8]) {
    write_line(out, b'$', bytes.len().to_string().as_bytes());
    out.extend_from_slice(bytes);
    out.extend_from_slice(b"\r\n");
}

/// A command: the name followed by its arguments, all sent as bulk strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<Vec<u8>>,
}

impl Command {
    pub fn new(name: &str) -> Self {
        Command {
            args: vec![name.as_bytes().to_vec()],
        }
    }

    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(arg.as_ref().to_vec());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        self.args.extend(args.into_iter().map(|a| a.as_ref().to_vec()));
        self
    }

    /// Upper-cased command name, e.g. `JSON.SET`.
    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.args[0]).to_uppercase()
    }

    /// Name followed by arguments.
    pub fn parts(&self) -> &[Vec<u8>] {
        &self.args
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + self.args.iter().map(|a| a.len() + 16).sum::<usize>());
        write_line(&mut out, b'*', self.args.len().to_string().as_bytes());
        for arg in &self.args {
            write_bulk(&mut out, arg);
        }
        out
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(&String::from_utf8_lossy(arg))?;
        }
        Ok(())
    }
}

/// Largest bulk string accepted from the server (512 MiB, the Redis limit).
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Largest array accepted from the server.
pub const MAX_ARRAY_LEN: i64 = i32::MAX as i64;

/// Parse one value from the front of `buf`.
///
/// Returns `Ok(None)` when `buf` holds an incomplete value, otherwise the value
/// and the number of bytes it occupied.
pub fn parse(buf: &[u8]) -> Result<Option<(Value, usize)>, TransportError> {
    parse_at(buf, 0)
}

fn parse_at(buf: &[u8], start: usize) -> Result<Option<(Value, usize)>, TransportError> {
    let Some((line, next)) = read_line(buf, start) else {
        return Ok(None);
    };
    let Some((&tag, body)) = line.split_first() else {
        return Err(TransportError::Protocol("empty reply line".to_string()));
    };

    match tag {
        b'+' => Ok(Some((Value::SimpleString(utf8(body)?), next))),
        b'-' => Ok(Some((Value::Error(utf8(body)?), next))),
        b':' => Ok(Some((Value::Integer(number(body)?), next))),
        b'_' => Ok(Some((Value::Nil, next))),
        b'$' => {
            let len = number(body)?;
            if len < 0 {
                return Ok(Some((Value::Nil, next)));
            }
            if len > MAX_BULK_LEN {
                return Err(TransportError::Protocol(format!(
                    "bulk string length {len} exceeds {MAX_BULK_LEN}"
                )));
            }
            let end = next + len as usize;
            if buf.len() < end + 2 {
                return Ok(None);
            }
            if &buf[end..end + 2] != b"\r\n" {
                return Err(TransportError::Protocol(
                    "bulk string not terminated by CRLF".to_string(),
                ));
            }
            Ok(Some((Value::BulkString(buf[next..end].to_vec()), end + 2)))
        }
        b'*' => {
            let len = number(body)?;
            if len < 0 {
                return Ok(Some((Value::Nil, next)));
            }
            if len > MAX_ARRAY_LEN {
                return Err(TransportError::Protocol(format!(
                    "array length {len} exceeds {MAX_ARRAY_LEN}"
                )));
            }
            // Each element takes at least three bytes, so the buffer bounds the
            // allocation until the elements actually arrive.
            let remaining = buf.len().saturating_sub(next) / 3;
            let mut items = Vec::with_capacity((len as usize).min(remaining));
            let mut pos = next;
            for _ in 0..len {
                match parse_at(buf, pos)? {
                    Some((item, after)) => {
                        items.push(item);
                        pos = after;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((Value::Array(items), pos)))
        }
        other => Err(TransportError::Protocol(format!(
            "unknown reply type byte 0x{other:02x}"
        ))),
    }
}

fn read_line(buf: &[u8], start: usize) -> Option<(&[u8], usize)> {
    let rest = buf.get(start..)?;
    let end = rest.windows(2).position(|w| w == b"\r\n")?;
    Some((&rest[..end], start + end + 2))
}

fn utf8(bytes: &[u8]) -> Result<String, TransportError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| TransportError::Protocol(format!("invalid UTF-8 in reply: {e}")))
}

fn number(bytes: &[u8]) -> Result<i64, TransportError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            TransportError::Protocol(format!(
                "invalid integer '{}'",
                String::from_utf8_lossy(bytes)
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_command() {
        let cmd = Command::new("JSON.SET").arg("account:1").arg("$").arg(br#"{"a":1}"#);
        assert_eq!(
            cmd.encode(),
            b"*4\r\n$8\r\nJSON.SET\r\n$9\r\naccount:1\r\n$1\r\n$\r\n$7\r\n{\"a\":1}\r\n".to_vec()
        );
        assert_eq!(cmd.name(), "JSON.SET");
        assert_eq!(cmd.to_string(), r#"JSON.SET account:1 $ {"a":1}"#);
    }

    #[test]
    fn test_parse_scalars() {
        assert_eq!(parse(b"+OK\r\n").unwrap(), Some((Value::ok(), 5)));
        assert_eq!(
            parse(b"-ERR no such index\r\n").unwrap(),
            Some((Value::Error("ERR no such index".into()), 20))
        );
        assert_eq!(parse(b":42\r\n").unwrap(), Some((Value::Integer(42), 5)));
        assert_eq!(parse(b"$-1\r\n").unwrap(), Some((Value::Nil, 5)));
        assert_eq!(parse(b"_\r\n").unwrap(), Some((Value::Nil, 3)));
        assert_eq!(parse(b"$3\r\nabc\r\n").unwrap(), Some((Value::bulk("abc"), 9)));
    }

    #[test]
    fn test_parse_nested_array() {
        let buf = b"*3\r\n:2\r\n$9\r\naccount:1\r\n*2\r\n$1\r\n$\r\n$2\r\n{}\r\n";
        let (value, used) = parse(buf).unwrap().unwrap();
        assert_eq!(used, buf.len());
        assert_eq!(
            value,
            Value::Array(vec![
                Value::Integer(2),
                Value::bulk("account:1"),
                Value::Array(vec![Value::bulk("$"), Value::bulk("{}")]),
            ])
        );
    }

    #[test]
    fn test_parse_incomplete() {
        assert_eq!(parse(b"").unwrap(), None);
        assert_eq!(parse(b"+OK").unwrap(), None);
        assert_eq!(parse(b"$5\r\nab").unwrap(), None);
        assert_eq!(parse(b"*2\r\n:1\r\n").unwrap(), None);
    }

    #[test]
    fn test_parse_leaves_trailing_bytes() {
        let (value, used) = parse(b":1\r\n:2\r\n").unwrap().unwrap();
        assert_eq!(value, Value::Integer(1));
        assert_eq!(used, 4);
    }

    #[test]
    fn test_parse_malformed() {
        assert!(parse(b"?what\r\n").is_err());
        assert!(parse(b":abc\r\n").is_err());
        assert!(parse(b"$3\r\nabcXY").is_err());
    }

    #[test]
    fn test_parse_rejects_oversized_lengths() {
        assert!(matches!(
            parse(b"*9223372036854775807\r\n"),
            Err(TransportError::Protocol(_))
        ));
        assert!(matches!(
            parse(b"$9223372036854775807\r\n"),
            Err(TransportError::Protocol(_))
        ));
        assert!(matches!(parse(b"$536870913\r\n"), Err(TransportError::Protocol(_))));

        // Within the limits, a large header just waits for more bytes.
        assert_eq!(parse(b"*1000000\r\n:1\r\n").unwrap(), None);
        assert_eq!(parse(b"$536870912\r\nabc").unwrap(), None);
    }

    #[test]
    fn test_value_encode_parses_back() {
        let value = Value::Array(vec![Value::Integer(-3), Value::Nil, Value::ok(), Value::bulk("x")]);
        let bytes = value.encode();
        assert_eq!(parse(&bytes).unwrap(), Some((value, bytes.len())));
    }

    #[test]
    fn test_into_result() {
        assert!(Value::ok().into_result().is_ok());
        assert!(matches!(
            Value::Error("ERR boom".into()).into_result(),
            Err(TransportError::Server(msg)) if msg == "ERR boom"
        ));
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::bulk("12").as_integer(), Some(12));
        assert_eq!(Value::Integer(3).as_integer(), Some(3));
        assert_eq!(Value::SimpleString("hi".into()).as_str(), Some("hi"));
        assert!(Value::Nil.is_nil());
        assert!(Value::ok().is_ok());
        assert_eq!(Value::Nil.into_array(), None);
    }
}
