//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser's QR scanner
//! panel and the API server.

use serde::{Deserialize, Serialize};

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a scanner panel can send.
#[derive(Deserialize, Serialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Text produced by the browser's QR decoder for one badge.
    Scan { decoded_text: String },

    /// Asks whether a sync is in progress so the panel can pause its camera.
    Status,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the scanner panel.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once the connection is bound to the operator's desk.
    Ready { syncing: bool },

    /// Positive feedback for an accepted scan; the UI shows the welcome modal.
    Welcome {
        kind: String,
        id: String,
        name: String,
        message: String,
    },

    /// A scan was refused. `error` is one of `invalid_format`, `duplicate`,
    /// `not_found`, `upload_failed`; nothing was recorded.
    ScanRejected { error: String, message: String },

    /// Reply to `Status`.
    SyncStatus { syncing: bool },

    /// The message could not be understood or the server failed.
    Error { message: String },
}
