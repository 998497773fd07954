//! Command definitions
//!
//! Represents commands from clients. Every data-carrying command wraps a
//! JSON payload; the engine interprets the payload shape.

use serde_json::Value;

/// Command types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandType {
    Create = 0x01,
    Read = 0x02,
    Update = 0x03,
    Delete = 0x04,
    Search = 0x05,
    List = 0x06,
    Ping = 0x07,
    Export = 0x08,
}

impl CommandType {
    /// Parse a command type from its wire byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Create),
            0x02 => Some(Self::Read),
            0x03 => Some(Self::Update),
            0x04 => Some(Self::Delete),
            0x05 => Some(Self::Search),
            0x06 => Some(Self::List),
            0x07 => Some(Self::Ping),
            0x08 => Some(Self::Export),
            _ => None,
        }
    }

    /// Parse a command type from its textual name (`get` aliases `read`)
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "create" => Some(Self::Create),
            "read" | "get" => Some(Self::Read),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            "search" => Some(Self::Search),
            "list" => Some(Self::List),
            "ping" => Some(Self::Ping),
            "export" => Some(Self::Export),
            _ => None,
        }
    }

    /// Textual name used in responses and logs
    pub fn name(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Search => "search",
            Self::List => "list",
            Self::Ping => "ping",
            Self::Export => "export",
        }
    }
}

/// A parsed command: a type plus its JSON payload
#[derive(Debug, Clone)]
pub struct Command {
    pub command_type: CommandType,
    pub payload: Value,
}

impl Command {
    pub fn new(command_type: CommandType, payload: Value) -> Self {
        Self {
            command_type,
            payload,
        }
    }

    /// A ping carries no payload
    pub fn ping() -> Self {
        Self::new(CommandType::Ping, Value::Null)
    }
}
