//! Command definitions
//!
//! Represents requests from gateway clients.

/// Command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    Fetch = 0x01,
    Put = 0x02,
    Delete = 0x03,
    Ping = 0x04,
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch a document by namespace and id
    Fetch { namespace: String, id: String },

    /// Create or replace a document
    Put {
        namespace: String,
        id: String,
        body: Vec<u8>,
    },

    /// Delete a whole namespace
    Delete { namespace: String },

    /// Ping (health check)
    Ping,
}

impl Command {
    /// Get the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Fetch { .. } => CommandType::Fetch,
            Command::Put { .. } => CommandType::Put,
            Command::Delete { .. } => CommandType::Delete,
            Command::Ping => CommandType::Ping,
        }
    }
}
