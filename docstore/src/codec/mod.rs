// Codec - typed documents to and from their JSON byte encoding

mod converters;

pub use converters::{json_pointer, UnixTime};

use crate::error::CodecError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A field-level rewrite applied to every document the codec encodes or decodes.
///
/// `write` runs on the JSON tree produced by serializing a document, before it is
/// sent to the store. `read` runs on the tree received from the store, before it
/// is deserialized. `read` must undo `write`.
pub trait Converter: Send + Sync {
    fn name(&self) -> &str;

    fn write(&self, doc: &mut Value) -> Result<(), CodecError>;

    fn read(&self, doc: &mut Value) -> Result<(), CodecError>;
}

/// Converts documents of type `T` to JSON bytes and back, honoring an ordered
/// set of converters. Converters are applied in insertion order on write and in
/// reverse order on read.
pub struct Codec<T> {
    converters: Vec<Arc<dyn Converter>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Codec<T> {
    pub fn new() -> Self {
        Codec {
            converters: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn add_converter<C: Converter + 'static>(&mut self, converter: C) -> &mut Self {
        self.converters.push(Arc::new(converter));
        self
    }

    /// Remove every converter with the given name. Returns how many were removed.
    pub fn remove_converter(&mut self, name: &str) -> usize {
        let before = self.converters.len();
        self.converters.retain(|c| c.name() != name);
        before - self.converters.len()
    }

    pub fn clear_converters(&mut self) {
        self.converters.clear();
    }

    pub fn converter_names(&self) -> Vec<&str> {
        self.converters.iter().map(|c| c.name()).collect()
    }
}

impl<T: Serialize + DeserializeOwned> Codec<T> {
    /// Encode a document to JSON bytes.
    pub fn encode(&self, doc: &T) -> Result<Vec<u8>, CodecError> {
        let value = self.encode_value(doc)?;
        Ok(serde_json::to_vec(&value)?)
    }

    pub fn encode_value(&self, doc: &T) -> Result<Value, CodecError> {
        let mut value = serde_json::to_value(doc)?;
        for converter in &self.converters {
            converter.write(&mut value)?;
        }
        Ok(value)
    }

    /// Decode JSON bytes. A JSON `null` decodes to `None`.
    pub fn decode(&self, bytes: &[u8]) -> Result<Option<T>, CodecError> {
        let value: Value = serde_json::from_slice(bytes)?;
        self.decode_value(value)
    }

    pub fn decode_value(&self, mut value: Value) -> Result<Option<T>, CodecError> {
        if value.is_null() {
            return Ok(None);
        }
        for converter in self.converters.iter().rev() {
            converter.read(&mut value)?;
        }
        Ok(Some(serde_json::from_value(value)?))
    }
}

impl<T> Default for Codec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Codec<T> {
    fn clone(&self) -> Self {
        Codec {
            converters: self.converters.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Codec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("converters", &self.converter_names())
            .finish()
    }
}
