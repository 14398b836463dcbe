// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_max_download() -> u64 {
    5 * 1024 * 1024
}

fn default_max_download_time() -> u64 {
    30
}

fn default_max_upload() -> u64 {
    250 * 1024
}

/// Every configuration key read at startup (§6 External Interfaces), plus
/// the ambient transport settings (`bind_addr`, `tls`) the spec leaves to
/// the HTTP layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    /// Named logins the server accepts, beyond the implicit anonymous
    /// grant. Empty means anonymous-only (§4.C).
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            server: ServerConfig::default(),
            tls: TlsConfig::default(),
            users: Vec::new(),
        }
    }
}

/// One row of the server's login table. `capabilities` uses the same
/// `r`/`w`/`c` letters the `login` card's grant string does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub name: String,
    pub secret: String,
    #[serde(default)]
    pub capabilities: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// `max-download`: server-side outbound byte cap (`mx-send`).
    #[serde(default = "default_max_download")]
    pub max_download: u64,
    /// `max-download-time`: server wall-clock deadline, in seconds.
    #[serde(default = "default_max_download_time")]
    pub max_download_time: u64,
    /// `max-upload`: client-side outbound byte cap.
    #[serde(default = "default_max_upload")]
    pub max_upload: u64,
    /// `dont-push`: disable autopush from this client.
    #[serde(default)]
    pub dont_push: bool,
    /// `server-code`: opaque identifier for this repository instance.
    pub server_code: Option<String>,
    /// `project-code`: opaque identifier PROJCODE must match.
    pub project_code: Option<String>,
    /// `cookie`: opaque session memo echoed back on the next request.
    pub cookie: Option<String>,
    /// `parent-project-code` / `parent-project-name`: identify the
    /// upstream repository this one was cloned from, if any.
    pub parent_project_code: Option<String>,
    pub parent_project_name: Option<String>,
    /// `remote_user_ok`: accept a remote-supplied username on login.
    #[serde(default)]
    pub remote_user_ok: bool,
    /// `uv-sync`: negotiate the unversioned-file sub-protocol.
    #[serde(default)]
    pub uv_sync: bool,
    /// Whether this session also syncs private artifacts.
    #[serde(default)]
    pub sync_private: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_download: default_max_download(),
            max_download_time: default_max_download_time(),
            max_upload: default_max_upload(),
            dont_push: false,
            server_code: None,
            project_code: None,
            cookie: None,
            parent_project_code: None,
            parent_project_name: None,
            remote_user_ok: false,
            uv_sync: false,
            sync_private: false,
        }
    }
}

/// Ambient transport settings; outside the spec's scope but needed to
/// actually bind a listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_true")]
    pub compress: bool,
}

impl ServerConfig {
    fn default_bind_addr() -> String {
        "127.0.0.1:8080".to_string()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_addr: Self::default_bind_addr(), compress: true }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_max_upload_matches_client_default_from_the_session_policy() {
        assert_eq!(SyncConfig::default().max_upload, 250 * 1024);
    }

    #[test]
    fn default_max_download_matches_server_default_from_the_session_policy() {
        assert_eq!(SyncConfig::default().max_download, 5 * 1024 * 1024);
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let yaml = "sync:\n  project_code: abc123\n";
        let c: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(c.sync.project_code.as_deref(), Some("abc123"));
        assert_eq!(c.sync.max_download, default_max_download());
        assert_eq!(c.server.bind_addr, "127.0.0.1:8080");
    }

    #[test]
    fn config_round_trips_through_yaml() {
        let mut c = Config::default();
        c.sync.server_code = Some("srv".to_string());
        c.sync.sync_private = true;
        let yaml = serde_yaml::to_string(&c).unwrap();
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.sync.server_code.as_deref(), Some("srv"));
        assert!(back.sync.sync_private);
    }
}
