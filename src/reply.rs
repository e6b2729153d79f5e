//! Reply values handed back by the mock connection.
//!
//! Replies mirror the shape of wire-level replies. Record-like replies are
//! flattened into an array alternating field name and field value, which is
//! what reply decoders expect when scanning a hash into a struct.

use bytes::Bytes;
use serde::ser::{Serialize, SerializeSeq, Serializer};

/// A single reply value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Null bulk reply
    Nil,
    /// Integer reply
    Int(i64),
    /// Bulk string reply
    Bulk(Bytes),
    /// Simple status reply, e.g. `OK`
    Status(String),
    /// Multi-bulk reply
    Array(Vec<Reply>),
}

impl Reply {
    /// Flatten ordered `(field, value)` pairs into `[field1, value1, field2, value2, ...]`.
    pub fn map<I, K, V>(pairs: I) -> Reply
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Bytes>,
        V: Into<Bytes>,
    {
        let mut items = Vec::new();
        for (field, value) in pairs {
            items.push(Reply::Bulk(field.into()));
            items.push(Reply::Bulk(value.into()));
        }
        Reply::Array(items)
    }

    /// Multi-bulk reply of bulk strings, in order.
    pub fn strings<I, S>(values: I) -> Reply
    where
        I: IntoIterator<Item = S>,
        S: Into<Bytes>,
    {
        Reply::Array(values.into_iter().map(|v| Reply::Bulk(v.into())).collect())
    }

    /// Status reply.
    pub fn status(value: impl Into<String>) -> Reply {
        Reply::Status(value.into())
    }

    /// Items of a multi-bulk reply, if this is one.
    pub fn as_array(&self) -> Option<&[Reply]> {
        match self {
            Reply::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Bytes of a bulk or status reply.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Reply::Bulk(data) => Some(data),
            Reply::Status(s) => Some(s.as_bytes()),
            _ => None,
        }
    }
}

impl From<&str> for Reply {
    fn from(s: &str) -> Self {
        Reply::Bulk(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Reply {
    fn from(s: String) -> Self {
        Reply::Bulk(Bytes::from(s))
    }
}

impl From<Bytes> for Reply {
    fn from(b: Bytes) -> Self {
        Reply::Bulk(b)
    }
}

impl From<Vec<u8>> for Reply {
    fn from(b: Vec<u8>) -> Self {
        Reply::Bulk(Bytes::from(b))
    }
}

impl From<i64> for Reply {
    fn from(n: i64) -> Self {
        Reply::Int(n)
    }
}

impl From<Vec<Reply>> for Reply {
    fn from(items: Vec<Reply>) -> Self {
        Reply::Array(items)
    }
}

impl<T: Into<Reply>> From<Option<T>> for Reply {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Reply::Nil)
    }
}

// JSON rendering: bulk strings are decoded lossily as UTF-8.
impl Serialize for Reply {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Reply::Nil => serializer.serialize_none(),
            Reply::Int(n) => serializer.serialize_i64(*n),
            Reply::Bulk(data) => serializer.serialize_str(&String::from_utf8_lossy(data)),
            Reply::Status(s) => serializer.serialize_str(s),
            Reply::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}
