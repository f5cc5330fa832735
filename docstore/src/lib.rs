pub mod client;
pub mod codec;
pub mod connection;
pub mod document;
pub mod error;
pub mod index;
pub mod keyspace;
pub mod query;
pub mod resp;
pub mod schema;

pub use client::Client;
pub use codec::{Codec, Converter, UnixTime};
pub use connection::{ConnectionConfig, ConnectionState, MemoryTransport, TcpTransport, Transport};
pub use document::{DocumentType, SearchHit, SearchResults};
pub use error::{CodecError, DocStoreError, Result, TransportError};
pub use keyspace::Keyspace;
pub use query::SearchQuery;
pub use schema::{FieldKind, FieldMapping, SchemaDescriptor};
