use crate::codec::Codec;
use crate::connection::{Connection, ConnectionConfig, ConnectionState, Transport};
use crate::document::{DocumentType, SearchHit, SearchResults};
use crate::error::{CodecError, DocStoreError, Result};
use crate::index::IndexManager;
use crate::keyspace::Keyspace;
use crate::query::SearchQuery;
use crate::resp::{Command, Value};
use crate::schema::SchemaDescriptor;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// JSONPath of the whole document.
pub const ROOT_PATH: &str = "$";

/// Field holding the document body in search replies.
const SEARCH_PAYLOAD_FIELD: &str = "$";

/// Typed client for one document type.
///
/// Every document lives at `<namespace>:<id>` as a JSON value, and the search
/// index `idx:<namespace>` covers that prefix. The client owns its connection
/// exclusively; dropping the client closes the socket.
pub struct Client<T> {
    keyspace: Keyspace,
    codec: Codec<T>,
    connection: Connection,
}

impl<T> Client<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Create an unconnected client whose namespace derives from `type_name`.
    pub fn new(type_name: &str) -> Result<Self> {
        Ok(Client {
            keyspace: Keyspace::new(type_name)?,
            codec: Codec::new(),
            connection: Connection::new(),
        })
    }

    /// Create an unconnected client for a [`DocumentType`].
    pub fn for_type() -> Result<Self>
    where
        T: DocumentType,
    {
        Self::new(T::TYPE_NAME)
    }

    pub fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    pub fn codec(&self) -> &Codec<T> {
        &self.codec
    }

    /// The converter set applied to every encode and decode.
    pub fn codec_mut(&mut self) -> &mut Codec<T> {
        &mut self.codec
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Connect using a connection string such as `localhost:6379,password=secret`.
    pub async fn connect(&mut self, configuration: &str) -> Result<()> {
        let config: ConnectionConfig = configuration.parse()?;
        self.connect_with(&config).await
    }

    pub async fn connect_with(&mut self, config: &ConnectionConfig) -> Result<()> {
        self.connection.open(config).await
    }

    /// Connect over an existing transport, e.g. a [`crate::MemoryTransport`].
    pub async fn attach(&mut self, transport: Arc<dyn Transport>) {
        self.connection.attach(transport).await
    }

    /// Close the connection. Idempotent, and a no-op if never connected.
    pub async fn dispose(&mut self) -> Result<()> {
        self.connection.dispose().await
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connection.is_connected() {
            Ok(())
        } else {
            Err(DocStoreError::NotConnected)
        }
    }

    /// Round-trip a `PING`, returning the elapsed time.
    pub async fn ping(&self) -> Result<Duration> {
        self.ensure_connected()?;
        let started = Instant::now();
        self.connection.execute(Command::new("PING")).await?;
        Ok(started.elapsed())
    }

    // ── Index ────────────────────────────────────────────────────────

    pub fn index(&self) -> IndexManager<'_> {
        IndexManager::new(&self.connection, &self.keyspace)
    }

    /// Drop the type's index if it exists and create it again from `schema`.
    /// Documents are kept. See [`IndexManager::rebuild`].
    pub async fn rebuild_index(&self, schema: &SchemaDescriptor) -> Result<()> {
        self.ensure_connected()?;
        self.index().rebuild(schema).await
    }

    pub async fn drop_index(&self) -> Result<bool> {
        self.ensure_connected()?;
        self.index().drop_index().await
    }

    pub async fn index_exists(&self) -> Result<bool> {
        self.ensure_connected()?;
        self.index().exists().await
    }

    // ── Documents ────────────────────────────────────────────────────

    /// Write `doc` at `id`, replacing whatever was there. Returns whether the
    /// store acknowledged the write.
    pub async fn set(&self, id: &str, doc: &T) -> Result<bool> {
        self.ensure_connected()?;
        let key = self.keyspace.key(id);
        let body = self.codec.encode(doc).map_err(DocStoreError::Encode)?;

        let reply = self
            .connection
            .execute(Command::new("JSON.SET").arg(&key).arg(ROOT_PATH).arg(body))
            .await?;
        Ok(reply.is_ok())
    }

    /// Read the document at `id`. Missing documents are `None`; documents that
    /// exist but cannot be decoded are a `DecodeFailed` error.
    pub async fn get(&self, id: &str) -> Result<Option<T>> {
        self.ensure_connected()?;
        let key = self.keyspace.key(id);

        let reply = self
            .connection
            .execute(Command::new("JSON.GET").arg(&key).arg(ROOT_PATH))
            .await?;
        let bytes = match &reply {
            Value::Nil => return Ok(None),
            other => other.as_bytes().ok_or_else(|| DocStoreError::UnexpectedReply {
                command: "JSON.GET".to_string(),
                reply: other.to_string(),
            })?,
        };

        let decode_failed = |source: CodecError| DocStoreError::DecodeFailed {
            key: key.clone(),
            source,
        };
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| decode_failed(e.into()))?;

        // A `$` path reply wraps the match in an array.
        let doc = match value {
            serde_json::Value::Array(mut matches) => {
                if matches.is_empty() {
                    return Ok(None);
                }
                matches.swap_remove(0)
            }
            other => other,
        };

        self.codec.decode_value(doc).map_err(decode_failed)
    }

    /// Remove the document at `id`. Returns whether anything was removed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        self.ensure_connected()?;
        let key = self.keyspace.key(id);

        let reply = self
            .connection
            .execute(Command::new("JSON.DEL").arg(&key).arg(ROOT_PATH))
            .await?;
        let removed = reply.as_integer().ok_or_else(|| DocStoreError::UnexpectedReply {
            command: "JSON.DEL".to_string(),
            reply: reply.to_string(),
        })?;
        Ok(removed > 0)
    }

    /// Read-modify-write: load `id`, apply `f`, and store the result.
    /// Returns the new value, or `None` if there was no document.
    ///
    /// Not atomic; a concurrent write between the read and the write is lost.
    pub async fn update<F>(&self, id: &str, f: F) -> Result<Option<T>>
    where
        F: FnOnce(T) -> T,
    {
        let Some(current) = self.get(id).await? else {
            return Ok(None);
        };
        let updated = f(current);
        self.set(id, &updated).await?;
        Ok(Some(updated))
    }

    // ── Search ───────────────────────────────────────────────────────

    /// Run a query against the type's index and return the decoded documents in
    /// result order. An empty query matches every document.
    ///
    /// `sort_ascending` only applies when `sort_by` is given; `None` leaves the
    /// direction to the store.
    pub async fn search(
        &self,
        query: &str,
        offset: usize,
        count: usize,
        sort_by: Option<&str>,
        sort_ascending: Option<bool>,
    ) -> Result<Vec<T>> {
        let mut request = SearchQuery::new(query).limit(offset, count);
        if let Some(field) = sort_by {
            request = request.sort_by(field, sort_ascending);
        }
        Ok(self.search_with(&request).await?.into_documents())
    }

    /// Run a [`SearchQuery`], keeping ids and the store's total-match hint.
    ///
    /// Entries whose payload is missing, `null`, or does not decode are left
    /// out of the results; the index can briefly refer to documents that were
    /// just deleted or rewritten.
    pub async fn search_with(&self, query: &SearchQuery) -> Result<SearchResults<T>> {
        self.ensure_connected()?;
        let reply = self
            .connection
            .execute(query.to_command(self.keyspace.index_name()))
            .await?;

        let unexpected = |reply: &Value| DocStoreError::UnexpectedReply {
            command: "FT.SEARCH".to_string(),
            reply: reply.to_string(),
        };
        let items = match reply {
            Value::Array(items) => items,
            other => return Err(unexpected(&other)),
        };
        let mut items = items.into_iter();
        let total = items
            .next()
            .and_then(|v| v.as_integer())
            .filter(|n| *n >= 0)
            .ok_or_else(|| DocStoreError::UnexpectedReply {
                command: "FT.SEARCH".to_string(),
                reply: "missing result count".to_string(),
            })? as u64;

        let capacity = (total as usize).min(query.count());
        let mut hits = Vec::with_capacity(capacity);

        while let Some(key) = items.next() {
            let key = key.as_str().ok_or_else(|| unexpected(&key))?.to_string();
            let fields = match items.next() {
                Some(Value::Array(fields)) => fields,
                // The index can still list a document deleted moments ago.
                Some(other) => {
                    log::warn!("Skipping search result {key}: no fields ({other})");
                    continue;
                }
                None => Vec::new(),
            };

            match self.decode_hit(&key, &fields) {
                Some(document) => {
                    let id = self.keyspace.id_from_key(&key).unwrap_or(&key).to_string();
                    hits.push(SearchHit { id, document });
                }
                None => log::warn!("Skipping search result {key}: no decodable document"),
            }
        }

        Ok(SearchResults { total, hits })
    }

    fn decode_hit(&self, key: &str, fields: &[Value]) -> Option<T> {
        let payload = fields
            .chunks(2)
            .find(|pair| pair[0].as_str() == Some(SEARCH_PAYLOAD_FIELD))
            .and_then(|pair| pair.get(1))
            .and_then(Value::as_bytes)?;

        match self.codec.decode(payload) {
            Ok(doc) => doc,
            Err(e) => {
                log::debug!("Failed to decode {key}: {e}");
                None
            }
        }
    }
}
