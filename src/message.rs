//! # Messages
//!
//! A [`Message`] is the envelope that flows through the pipeline, used for both
//! requests and responses. Pipeline stages never mutate the active message in
//! place: they hand back *new* messages as proposed overrides, and the
//! orchestrator swaps them in.
//!
//! ## The empty sentinel
//!
//! A message whose every field is at its zero value is "empty"
//! ([`Message::is_empty`]). Interceptors and handlers return an empty message to
//! say "no override produced".

use bytes::Bytes;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Ordered multi-map used for headers and query parameters.
pub type Headers = IndexMap<String, Vec<String>>;

/// Query parameters share the header shape.
pub type Parameters = IndexMap<String, Vec<String>>;

/// Untyped structured body.
pub type Body = Map<String, Value>;

/// The command (HTTP method) of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Get,
    Post,
    Put,
    Delete,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Get => "get",
            Command::Post => "post",
            Command::Put => "put",
            Command::Delete => "delete",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses case-insensitively: `"POST"`, `"post"` and `"Post"` are the same command.
impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Command::Get),
            "post" => Ok(Command::Post),
            "put" => Ok(Command::Put),
            "delete" => Ok(Command::Delete),
            other => Err(format!("unsupported command '{}'", other)),
        }
    }
}

/// One request or response.
///
/// `body` and `raw_body` are mutually exclusive: the builder methods clear one
/// when setting the other. `status` is only meaningful on responses, `0` means unset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    pub path: String,
    pub command: Option<Command>,
    pub headers: Headers,
    pub parameters: Parameters,
    pub body: Body,
    pub raw_body: Option<Bytes>,
    pub status: u16,
    pub client_ip: String,
}

impl Message {
    /// Creates a request for `path` with the given command.
    pub fn request(command: Command, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            command: Some(command),
            ..Self::default()
        }
    }

    /// Creates a response with a structured body.
    pub fn response(status: u16, body: Body) -> Self {
        Self {
            status,
            body,
            ..Self::default()
        }
    }

    /// True when every field is at its zero value.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self.raw_body = None;
        self
    }

    pub fn with_raw_body(mut self, raw: impl Into<Bytes>) -> Self {
        self.raw_body = Some(raw.into());
        self.body = Body::new();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// First value of a header, looked up case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }

    /// First value of a query parameter.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// The command as a lowercase string, empty when unset.
    pub fn command_str(&self) -> &'static str {
        self.command.map(|c| c.as_str()).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_message_is_empty() {
        assert!(Message::default().is_empty());
        assert!(!Message::default().with_status(200).is_empty());
        assert!(!Message::request(Command::Get, "/users").is_empty());
    }

    #[test]
    fn test_body_and_raw_body_are_exclusive() {
        let mut body = Body::new();
        body.insert("a".into(), json!(1));

        let msg = Message::default().with_body(body.clone()).with_raw_body("bytes");
        assert!(msg.body.is_empty());
        assert!(msg.raw_body.is_some());

        let msg = msg.with_body(body);
        assert!(msg.raw_body.is_none());
        assert_eq!(msg.body["a"], 1);
    }

    #[test]
    fn test_command_parses_case_insensitively() {
        assert_eq!("POST".parse::<Command>(), Ok(Command::Post));
        assert_eq!("Delete".parse::<Command>(), Ok(Command::Delete));
        assert!("patch".parse::<Command>().is_err());
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let msg = Message::default()
            .with_header("Master-Key", "k1")
            .with_header("Master-Key", "k2");
        assert_eq!(msg.header("master-key"), Some("k1"));
        assert_eq!(msg.header("missing"), None);
    }
}
