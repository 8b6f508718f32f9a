use serde::{Deserialize, Serialize};

/// Control messages a client sends over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Inbound {
    #[serde(rename_all = "camelCase")]
    StartMonitoring { sheet_id: String },
    StopMonitoring,
}

/// Messages the core pushes to the owning client connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Outbound {
    /// A batch of newly appended rows, in source order, plus the new total
    /// row count.
    NewLeads {
        leads: Vec<Vec<String>>,
        total: usize,
    },
    Error {
        message: String,
    },
}
