use serde::{Deserialize, Serialize};

/// Probe outcome for a registered tool server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Available,
    Unavailable,
    Disabled,
    Error,
}

impl ServerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ServerStatus::Available => "available",
            ServerStatus::Unavailable => "unavailable",
            ServerStatus::Disabled => "disabled",
            ServerStatus::Error => "error",
        }
    }
}
