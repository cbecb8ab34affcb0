use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use warden_types::ServerStatus;

/// How a tool server is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Stdio,
    Http,
    Url,
}

impl Transport {
    pub fn as_str(self) -> &'static str {
        match self {
            Transport::Stdio => "stdio",
            Transport::Http => "http",
            Transport::Url => "url",
        }
    }

    pub fn is_url_based(self) -> bool {
        matches!(self, Transport::Http | Transport::Url)
    }
}

/// Visibility tier of a tool server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Public,
    Private,
    Project,
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Project
    }
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Public => "public",
            Tier::Private => "private",
            Tier::Project => "project",
        }
    }
}

/// One registered tool server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEntry {
    pub name: String,
    pub transport: Transport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub tier: Tier,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_status")]
    pub status: ServerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_status() -> ServerStatus {
    ServerStatus::Unavailable
}

impl ServerEntry {
    pub fn stdio(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: Transport::Stdio,
            command: Some(command.into()),
            args: Vec::new(),
            url: None,
            tier: Tier::default(),
            tags: Vec::new(),
            enabled: true,
            status: ServerStatus::Unavailable,
            last_checked: None,
            error: None,
        }
    }

    pub fn url(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: Transport::Url,
            command: None,
            args: Vec::new(),
            url: Some(url.into()),
            tier: Tier::default(),
            tags: Vec::new(),
            enabled: true,
            status: ServerStatus::Unavailable,
            last_checked: None,
            error: None,
        }
    }
}
