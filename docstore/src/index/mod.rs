// Index management - create, drop and rebuild the per-type search index

use crate::connection::Connection;
use crate::error::{DocStoreError, Result};
use crate::keyspace::Keyspace;
use crate::resp::{Command, Value};
use crate::schema::SchemaDescriptor;

/// Manages the single search index bound to one keyspace.
///
/// The index covers every JSON document whose key starts with the keyspace
/// prefix; the store indexes documents written after creation incrementally.
pub struct IndexManager<'a> {
    connection: &'a Connection,
    keyspace: &'a Keyspace,
}

impl<'a> IndexManager<'a> {
    pub fn new(connection: &'a Connection, keyspace: &'a Keyspace) -> Self {
        IndexManager {
            connection,
            keyspace,
        }
    }

    pub fn name(&self) -> &str {
        self.keyspace.index_name()
    }

    /// Names of every index in the store.
    pub async fn list(&self) -> Result<Vec<String>> {
        let reply = self.connection.execute(Command::new("FT._LIST")).await?;
        let unexpected = |reply: &Value| DocStoreError::UnexpectedReply {
            command: "FT._LIST".to_string(),
            reply: reply.to_string(),
        };

        match reply {
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string).ok_or_else(|| unexpected(item)))
                .collect(),
            Value::Nil => Ok(Vec::new()),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn exists(&self) -> Result<bool> {
        let name = self.name();
        Ok(self.list().await?.iter().any(|n| n == name))
    }

    /// Drop the index if present, keeping the documents. Returns whether an
    /// index was dropped.
    pub async fn drop_index(&self) -> Result<bool> {
        if !self.exists().await? {
            return Ok(false);
        }
        self.connection
            .execute(Command::new("FT.DROPINDEX").arg(self.name()))
            .await?;
        log::info!("Dropped index {}", self.name());
        Ok(true)
    }

    /// Create the index. Fails if an index with the same name exists.
    pub async fn create(&self, schema: &SchemaDescriptor) -> Result<()> {
        schema.validate()?;
        let reply = self.connection.execute(self.create_command(schema)).await?;
        if !reply.is_ok() {
            return Err(DocStoreError::UnexpectedReply {
                command: "FT.CREATE".to_string(),
                reply: reply.to_string(),
            });
        }
        log::info!(
            "Created index {} on prefix '{}' with {} fields",
            self.name(),
            self.keyspace.prefix(),
            schema.len()
        );
        Ok(())
    }

    /// Drop any existing index of the same name, then create it from `schema`.
    ///
    /// Not atomic: between the drop and the create there is no index, and a
    /// failure part-way leaves the store as the failed step left it.
    pub async fn rebuild(&self, schema: &SchemaDescriptor) -> Result<()> {
        if !self.connection.is_connected() {
            return Err(DocStoreError::NotConnected);
        }
        schema.validate()?;

        let failed = |source: DocStoreError| DocStoreError::IndexRebuildFailed {
            index: self.name().to_string(),
            source: Box::new(source),
        };

        self.drop_index().await.map_err(failed)?;
        self.create(schema).await.map_err(failed)?;
        Ok(())
    }

    /// `FT.CREATE <index> ON JSON PREFIX 1 <prefix> SCHEMA ...`
    pub fn create_command(&self, schema: &SchemaDescriptor) -> Command {
        Command::new("FT.CREATE")
            .arg(self.name())
            .args(["ON", "JSON", "PREFIX", "1"])
            .arg(self.keyspace.prefix())
            .args(schema.to_args())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MemoryTransport;
    use crate::error::TransportError;
    use std::sync::Arc;

    fn schema() -> SchemaDescriptor {
        SchemaDescriptor::new()
            .numeric("$.id", "id", false)
            .text("$.name", "name", true)
    }

    async fn connected() -> (Connection, Arc<MemoryTransport>) {
        let store = Arc::new(MemoryTransport::new());
        let mut conn = Connection::new();
        conn.attach(store.clone()).await;
        (conn, store)
    }

    #[test]
    fn test_create_command() {
        let conn = Connection::new();
        let ks = Keyspace::new("Account").unwrap();
        let cmd = IndexManager::new(&conn, &ks).create_command(&schema());
        assert_eq!(
            cmd.to_string(),
            "FT.CREATE idx:account ON JSON PREFIX 1 account: SCHEMA $.id AS id NUMERIC $.name AS name TEXT SORTABLE"
        );
    }

    #[tokio::test]
    async fn test_rebuild_creates_then_replaces() {
        let (conn, _store) = connected().await;
        let ks = Keyspace::new("account").unwrap();
        let index = IndexManager::new(&conn, &ks);

        assert!(!index.exists().await.unwrap());
        index.rebuild(&schema()).await.unwrap();
        assert!(index.exists().await.unwrap());

        index.rebuild(&schema()).await.unwrap();
        assert_eq!(index.list().await.unwrap(), vec!["idx:account".to_string()]);
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let (conn, _store) = connected().await;
        let ks = Keyspace::new("account").unwrap();
        let index = IndexManager::new(&conn, &ks);

        index.create(&schema()).await.unwrap();
        let err = index.create(&schema()).await.unwrap_err();
        assert!(matches!(err, DocStoreError::Transport(TransportError::Server(_))));
    }

    #[tokio::test]
    async fn test_drop_missing_index() {
        let (conn, _store) = connected().await;
        let ks = Keyspace::new("account").unwrap();
        assert!(!IndexManager::new(&conn, &ks).drop_index().await.unwrap());
    }

    #[tokio::test]
    async fn test_rebuild_not_connected() {
        let conn = Connection::new();
        let ks = Keyspace::new("account").unwrap();
        let err = IndexManager::new(&conn, &ks).rebuild(&schema()).await.unwrap_err();
        assert!(matches!(err, DocStoreError::NotConnected));
    }

    #[tokio::test]
    async fn test_rebuild_rejects_invalid_schema() {
        let (conn, _store) = connected().await;
        let ks = Keyspace::new("account").unwrap();
        let err = IndexManager::new(&conn, &ks)
            .rebuild(&SchemaDescriptor::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DocStoreError::Schema(_)));
    }
}
