//! Fixture configuration for the mock connection.
//!
//! Declares registered commands, their canned responses, and logging
//! settings in YAML.

use crate::command::{Cmd, Signature};
use crate::reply::Reply;
use crate::response::Response;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main fixture configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MockConnConfig {
    /// Global settings
    #[serde(default)]
    pub settings: Settings,

    /// Registered commands, in registration order
    #[serde(default)]
    pub commands: Vec<CommandFixture>,
}

impl MockConnConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (i, command) in self.commands.iter().enumerate() {
            command
                .validate()
                .map_err(|e| anyhow::anyhow!("Command {}: {}", i, e))?;
        }
        Ok(())
    }

    /// Total number of canned responses across all commands.
    pub fn response_count(&self) -> usize {
        self.commands.iter().map(|c| c.responses.len()).sum()
    }
}

/// A single registered command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandFixture {
    /// Command name (case-sensitive)
    pub name: String,

    /// Positional arguments for an exact registration
    #[serde(default)]
    pub args: Vec<String>,

    /// Match any argument list for this name
    #[serde(default)]
    pub generic: bool,

    /// Responses handed out in order
    #[serde(default)]
    pub responses: Vec<ResponseFixture>,
}

impl CommandFixture {
    /// Validate the command fixture.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.is_empty() {
            anyhow::bail!("Command name cannot be empty");
        }
        if self.generic && !self.args.is_empty() {
            anyhow::bail!("Generic command {} cannot declare args", self.name);
        }
        for (i, response) in self.responses.iter().enumerate() {
            response
                .to_response()
                .map_err(|e| anyhow::anyhow!("Response {}: {}", i, e))?;
        }
        Ok(())
    }

    /// Signature this fixture registers.
    pub fn signature(&self) -> Signature {
        if self.generic {
            Signature::Generic(self.name.clone())
        } else {
            Signature::Exact(Cmd::with_args(self.name.as_str(), &self.args))
        }
    }
}

/// Response fixture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFixture {
    /// Null bulk reply
    Nil,
    /// Status reply
    Status { value: String },
    /// Integer reply
    Int { value: i64 },
    /// Bulk string reply
    Bulk { value: String },
    /// Base64 encoded binary bulk reply
    Base64 { content: String },
    /// Array of bulk strings
    Strings { values: Vec<String> },
    /// Nested array
    Array { items: Vec<ResponseFixture> },
    /// Record-like reply, flattened to field/value pairs in declaration order
    Map { fields: serde_yaml::Mapping },
    /// Simulated error
    Error { message: String },
}

impl ResponseFixture {
    /// Build the canned response.
    pub fn to_response(&self) -> anyhow::Result<Response> {
        match self {
            ResponseFixture::Error { message } => Ok(Response::Error(message.clone())),
            _ => Ok(Response::Value(self.to_reply()?)),
        }
    }

    fn to_reply(&self) -> anyhow::Result<Reply> {
        match self {
            ResponseFixture::Nil => Ok(Reply::Nil),
            ResponseFixture::Status { value } => Ok(Reply::status(value.clone())),
            ResponseFixture::Int { value } => Ok(Reply::Int(*value)),
            ResponseFixture::Bulk { value } => Ok(Reply::from(value.clone())),
            ResponseFixture::Base64 { content } => {
                use base64::Engine;
                base64::engine::general_purpose::STANDARD
                    .decode(content)
                    .map(Reply::from)
                    .map_err(|e| anyhow::anyhow!("Invalid base64: {}", e))
            }
            ResponseFixture::Strings { values } => Ok(Reply::strings(values.clone())),
            ResponseFixture::Array { items } => {
                let replies: anyhow::Result<Vec<_>> = items
                    .iter()
                    .map(|item| match item {
                        ResponseFixture::Error { .. } => {
                            anyhow::bail!("Errors cannot be nested inside an array")
                        }
                        _ => item.to_reply(),
                    })
                    .collect();
                Ok(Reply::Array(replies?))
            }
            ResponseFixture::Map { fields } => {
                let mut pairs = Vec::with_capacity(fields.len());
                for (key, value) in fields {
                    pairs.push((scalar_bytes(key)?, scalar_bytes(value)?));
                }
                Ok(Reply::map(pairs))
            }
            ResponseFixture::Error { message } => {
                anyhow::bail!("Error response {:?} is not a value", message)
            }
        }
    }
}

/// Render a YAML scalar the way it would be stored in a hash field.
fn scalar_bytes(value: &serde_yaml::Value) -> anyhow::Result<Bytes> {
    let text = match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        other => anyhow::bail!("Map fields must be scalars, got {:?}", other),
    };
    Ok(Bytes::from(text))
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Log every matched command
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log commands that match no registration
    #[serde(default = "default_true")]
    pub log_unmatched: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_matches: true,
            log_unmatched: true,
        }
    }
}
