// In-process store emulating the JSON and search commands the client uses

use super::Transport;
use crate::codec::json_pointer;
use crate::error::TransportError;
use crate::resp::{Command, Value};
use crate::schema::{FieldKind, SchemaDescriptor};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value as Json;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, OnceLock};

/// An in-memory store speaking the subset of JSON and search commands the
/// client issues. Useful for tests and for running without a server.
///
/// Search supports `*`, bare terms, `@field:term`, `@field:prefix*` and
/// `@field:[min max]` (with `(` exclusive bounds and `-inf`/`+inf`), joined by
/// whitespace as AND. Unsorted results come back in key order.
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    documents: BTreeMap<String, Json>,
    indexes: BTreeMap<String, IndexDef>,
}

struct IndexDef {
    prefixes: Vec<String>,
    fields: Vec<IndexedField>,
}

struct IndexedField {
    path: String,
    pointer: String,
    name: String,
    kind: FieldKind,
    sortable: bool,
}

enum FieldValue {
    Number(f64),
    Text(String),
}

enum Clause {
    All,
    Range { field: String, min: Bound, max: Bound },
    Term { field: Option<String>, term: String },
}

#[derive(Clone, Copy)]
struct Bound {
    value: f64,
    exclusive: bool,
}

type Reply = Result<Value, TransportError>;

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents across all keys.
    pub fn len(&self) -> usize {
        self.lock().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw stored JSON at a key, bypassing the command layer.
    pub fn document(&self, key: &str) -> Option<Json> {
        self.lock().documents.get(key).cloned()
    }

    /// Field definitions of an index as created, in declaration order.
    pub fn index_schema(&self, index: &str) -> Option<SchemaDescriptor> {
        let state = self.lock();
        let def = state.indexes.get(index)?;
        Some(def.fields.iter().fold(SchemaDescriptor::new(), |schema, f| {
            schema.field(&f.path, &f.name, f.kind, f.sortable)
        }))
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn execute(&self, command: &Command) -> Reply {
        let args: Vec<String> = command
            .parts()
            .iter()
            .map(|a| String::from_utf8_lossy(a).into_owned())
            .collect();
        let mut state = self.lock();
        let reply = match command.name().as_str() {
            "PING" => Ok(Value::SimpleString("PONG".to_string())),
            "JSON.SET" => state.json_set(&args[1..]),
            "JSON.GET" => state.json_get(&args[1..]),
            "JSON.DEL" => state.json_del(&args[1..]),
            "FT._LIST" => Ok(Value::Array(
                state.indexes.keys().map(|name| Value::bulk(name.as_str())).collect(),
            )),
            "FT.CREATE" => state.ft_create(&args[1..]),
            "FT.DROPINDEX" => state.ft_dropindex(&args[1..]),
            "FT.SEARCH" => state.ft_search(&args[1..]),
            other => Ok(error(format!("ERR unknown command '{other}'"))),
        };
        Ok(reply.unwrap_or_else(|e| match e {
            TransportError::Server(message) => Value::Error(message),
            other => Value::Error(other.to_string()),
        }))
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

fn error(message: impl Into<String>) -> Value {
    Value::Error(message.into())
}

fn server(message: impl Into<String>) -> TransportError {
    TransportError::Server(message.into())
}

fn arity(args: &[String], min: usize, command: &str) -> Result<(), TransportError> {
    if args.len() < min {
        return Err(server(format!(
            "ERR wrong number of arguments for '{command}' command"
        )));
    }
    Ok(())
}

fn is_root(path: Option<&String>) -> bool {
    matches!(path.map(String::as_str), None | Some("$") | Some("."))
}

impl MemoryState {
    fn json_set(&mut self, args: &[String]) -> Reply {
        arity(args, 3, "json.set")?;
        let (key, path, raw) = (&args[0], &args[1], &args[2]);
        if !is_root(Some(path)) {
            return Err(server("ERR only root path is supported"));
        }
        let doc: Json = serde_json::from_str(raw)
            .map_err(|e| server(format!("ERR invalid JSON: {e}")))?;

        if let Some(option) = args.get(3) {
            return Err(server(format!("ERR unsupported JSON.SET option '{option}'")));
        }
        self.documents.insert(key.clone(), doc);
        Ok(Value::ok())
    }

    fn json_get(&self, args: &[String]) -> Reply {
        arity(args, 1, "json.get")?;
        let Some(doc) = self.documents.get(&args[0]) else {
            return Ok(Value::Nil);
        };

        let body = match args.get(1).map(String::as_str) {
            None | Some(".") => doc.to_string(),
            Some(path) if path.starts_with('$') => {
                let found: Vec<&Json> = doc.pointer(&json_pointer(path)).into_iter().collect();
                Json::from(found.into_iter().cloned().collect::<Vec<_>>()).to_string()
            }
            Some(path) => return Err(server(format!("ERR unsupported path '{path}'"))),
        };
        Ok(Value::bulk(body))
    }

    fn json_del(&mut self, args: &[String]) -> Reply {
        arity(args, 1, "json.del")?;
        if !is_root(args.get(1)) {
            return Err(server("ERR only root path is supported"));
        }
        let removed = self.documents.remove(&args[0]).is_some();
        Ok(Value::Integer(removed as i64))
    }

    fn ft_create(&mut self, args: &[String]) -> Reply {
        arity(args, 3, "ft.create")?;
        let name = &args[0];
        if self.indexes.contains_key(name) {
            return Err(server("Index already exists"));
        }

        let mut prefixes = Vec::new();
        let mut i = 1;
        while i < args.len() && !args[i].eq_ignore_ascii_case("SCHEMA") {
            match args[i].to_uppercase().as_str() {
                "ON" => {
                    let kind = args.get(i + 1).map(|s| s.to_uppercase());
                    if kind.as_deref() != Some("JSON") {
                        return Err(server("ERR only ON JSON indexes are supported"));
                    }
                    i += 2;
                }
                "PREFIX" => {
                    let count: usize = args
                        .get(i + 1)
                        .and_then(|n| n.parse().ok())
                        .ok_or_else(|| server("ERR bad PREFIX count"))?;
                    let end = i + 2 + count;
                    if end > args.len() {
                        return Err(server("ERR bad PREFIX count"));
                    }
                    prefixes.extend(args[i + 2..end].iter().cloned());
                    i = end;
                }
                other => return Err(server(format!("ERR unknown argument '{other}'"))),
            }
        }

        let mut fields = Vec::new();
        let mut rest = args.get(i + 1..).unwrap_or_default().iter().peekable();
        while let Some(path) = rest.next() {
            let mut alias = path.clone();
            if rest.peek().is_some_and(|a| a.eq_ignore_ascii_case("AS")) {
                rest.next();
                alias = rest.next().ok_or_else(|| server("ERR missing alias"))?.clone();
            }
            let kind = match rest.next().map(|k| k.to_uppercase()).as_deref() {
                Some("NUMERIC") => FieldKind::Numeric,
                Some("TEXT") => FieldKind::Text,
                other => return Err(server(format!("ERR unsupported field type {other:?}"))),
            };
            let sortable = rest.peek().is_some_and(|a| a.eq_ignore_ascii_case("SORTABLE"));
            if sortable {
                rest.next();
            }
            fields.push(IndexedField {
                path: path.clone(),
                pointer: json_pointer(path),
                name: alias,
                kind,
                sortable,
            });
        }
        if fields.is_empty() {
            return Err(server("Fields arguments are missing"));
        }
        if prefixes.is_empty() {
            prefixes.push(String::new());
        }

        self.indexes.insert(name.clone(), IndexDef { prefixes, fields });
        Ok(Value::ok())
    }

    fn ft_dropindex(&mut self, args: &[String]) -> Reply {
        arity(args, 1, "ft.dropindex")?;
        if let Some(option) = args.get(1) {
            return Err(server(format!("ERR unsupported FT.DROPINDEX option '{option}'")));
        }
        self.indexes
            .remove(&args[0])
            .ok_or_else(|| server("Unknown Index name"))?;
        Ok(Value::ok())
    }

    fn ft_search(&self, args: &[String]) -> Reply {
        arity(args, 2, "ft.search")?;
        let def = self
            .indexes
            .get(&args[0])
            .ok_or_else(|| server(format!("{}: no such index", args[0])))?;
        let clauses = parse_query(&args[1], def)?;

        let (mut offset, mut limit) = (0usize, 10usize);
        let mut sort: Option<(String, bool)> = None;
        let mut i = 2;
        while i < args.len() {
            match args[i].to_uppercase().as_str() {
                "LIMIT" => {
                    let parse = |j: usize| -> Result<usize, TransportError> {
                        args.get(j)
                            .and_then(|n| n.parse().ok())
                            .ok_or_else(|| server("ERR bad LIMIT arguments"))
                    };
                    offset = parse(i + 1)?;
                    limit = parse(i + 2)?;
                    i += 3;
                }
                "SORTBY" => {
                    let field = args.get(i + 1).ok_or_else(|| server("ERR missing SORTBY field"))?;
                    if !def.fields.iter().any(|f| &f.name == field) {
                        return Err(server(format!(
                            "Property `{field}` not loaded nor in schema"
                        )));
                    }
                    let direction = args.get(i + 2).map(|d| d.to_uppercase());
                    match direction.as_deref() {
                        Some("ASC") => {
                            sort = Some((field.clone(), true));
                            i += 3;
                        }
                        Some("DESC") => {
                            sort = Some((field.clone(), false));
                            i += 3;
                        }
                        _ => {
                            sort = Some((field.clone(), true));
                            i += 2;
                        }
                    }
                }
                other => return Err(server(format!("ERR unknown argument '{other}'"))),
            }
        }

        let mut hits: Vec<(&String, &Json, BTreeMap<&str, FieldValue>)> = self
            .documents
            .iter()
            .filter(|(key, _)| def.prefixes.iter().any(|p| key.starts_with(p.as_str())))
            .filter_map(|(key, doc)| def.extract(doc).map(|values| (key, doc, values)))
            .filter(|(_, _, values)| clauses.iter().all(|c| c.matches(values)))
            .collect();

        if let Some((field, ascending)) = &sort {
            hits.sort_by(|a, b| {
                let ord = compare(a.2.get(field.as_str()), b.2.get(field.as_str()));
                if *ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }

        let total = hits.len();
        let mut reply = vec![Value::Integer(total as i64)];
        for (key, doc, _) in hits.into_iter().skip(offset).take(limit) {
            reply.push(Value::bulk(key.as_str()));
            reply.push(Value::Array(vec![Value::bulk("$"), Value::bulk(doc.to_string())]));
        }
        Ok(Value::Array(reply))
    }
}

impl IndexDef {
    /// Indexed values of a document, or `None` if a field has the wrong type
    /// (such documents are left out of the index).
    fn extract<'a>(&'a self, doc: &Json) -> Option<BTreeMap<&'a str, FieldValue>> {
        let mut values = BTreeMap::new();
        for field in &self.fields {
            let value = match (field.kind, doc.pointer(&field.pointer)) {
                (_, None) | (_, Some(Json::Null)) => continue,
                (FieldKind::Numeric, Some(Json::Number(n))) => FieldValue::Number(n.as_f64()?),
                (FieldKind::Text, Some(Json::String(s))) => FieldValue::Text(s.clone()),
                _ => return None,
            };
            values.insert(field.name.as_str(), value);
        }
        Some(values)
    }

    fn field(&self, name: &str) -> Option<&IndexedField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl Clause {
    fn matches(&self, values: &BTreeMap<&str, FieldValue>) -> bool {
        match self {
            Clause::All => true,
            Clause::Range { field, min, max } => match values.get(field.as_str()) {
                Some(FieldValue::Number(n)) => min.below(*n) && max.above(*n),
                _ => false,
            },
            Clause::Term { field: Some(field), term } => match values.get(field.as_str()) {
                Some(FieldValue::Text(text)) => text_matches(text, term),
                _ => false,
            },
            Clause::Term { field: None, term } => values.values().any(|v| match v {
                FieldValue::Text(text) => text_matches(text, term),
                FieldValue::Number(_) => false,
            }),
        }
    }
}

impl Bound {
    fn parse(raw: &str) -> Result<Self, TransportError> {
        let (exclusive, number) = match raw.strip_prefix('(') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let value = match number.to_lowercase().as_str() {
            "-inf" => f64::NEG_INFINITY,
            "inf" | "+inf" => f64::INFINITY,
            n => n
                .parse()
                .map_err(|_| server(format!("Syntax error: bad numeric bound '{raw}'")))?,
        };
        Ok(Bound { value, exclusive })
    }

    /// `self` as a lower bound admits `n`.
    fn below(&self, n: f64) -> bool {
        if self.exclusive {
            n > self.value
        } else {
            n >= self.value
        }
    }

    /// `self` as an upper bound admits `n`.
    fn above(&self, n: f64) -> bool {
        if self.exclusive {
            n < self.value
        } else {
            n <= self.value
        }
    }
}

fn query_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"@(\w+):\[\s*(\S+)\s+(\S+?)\s*\]|@(\w+):(\S+)|(\S+)")
            .expect("query pattern is a valid regex")
    })
}

fn parse_query(query: &str, def: &IndexDef) -> Result<Vec<Clause>, TransportError> {
    let query = query.trim();
    if query.is_empty() || query == "*" {
        return Ok(vec![Clause::All]);
    }

    let known = |name: &str, kind: FieldKind| -> Result<String, TransportError> {
        match def.field(name) {
            Some(f) if f.kind == kind => Ok(name.to_string()),
            Some(_) => Err(server(format!("Field `{name}` has the wrong type for this query"))),
            None => Err(server(format!("Unknown field `{name}`"))),
        }
    };

    let mut clauses = Vec::new();
    for caps in query_pattern().captures_iter(query) {
        let clause = if let (Some(field), Some(min), Some(max)) = (caps.get(1), caps.get(2), caps.get(3)) {
            Clause::Range {
                field: known(field.as_str(), FieldKind::Numeric)?,
                min: Bound::parse(min.as_str())?,
                max: Bound::parse(max.as_str())?,
            }
        } else if let (Some(field), Some(term)) = (caps.get(4), caps.get(5)) {
            Clause::Term {
                field: Some(known(field.as_str(), FieldKind::Text)?),
                term: term.as_str().to_lowercase(),
            }
        } else if let Some(term) = caps.get(6) {
            match term.as_str() {
                "*" => Clause::All,
                t => Clause::Term {
                    field: None,
                    term: t.to_lowercase(),
                },
            }
        } else {
            continue;
        };
        clauses.push(clause);
    }
    Ok(clauses)
}

/// Case-insensitive token match; a trailing `*` matches by prefix.
fn text_matches(text: &str, term: &str) -> bool {
    let (needle, prefix) = match term.strip_suffix('*') {
        Some(stem) => (stem, true),
        None => (term, false),
    };
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .any(|token| if prefix { token.starts_with(needle) } else { token == needle })
}

/// Missing values sort after present ones.
fn compare(a: Option<&FieldValue>, b: Option<&FieldValue>) -> Ordering {
    match (a, b) {
        (Some(FieldValue::Number(x)), Some(FieldValue::Number(y))) => x.total_cmp(y),
        (Some(FieldValue::Text(x)), Some(FieldValue::Text(y))) => x.to_lowercase().cmp(&y.to_lowercase()),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}
