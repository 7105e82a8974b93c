//! Server configuration
//!
//! Loaded from YAML with every field defaulted, so an empty document is a
//! valid configuration. Immutable once the server is constructed, apart from
//! the lazily derived no-cache file set.

use anyhow::Context;
use serde::Deserialize;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// Environment variable naming the YAML configuration file.
pub const CONFIG_ENV: &str = "UR_WEB_CONFIG";
/// Environment override for the plain HTTP port.
pub const PORT_ENV: &str = "UR_WEB_PORT";
/// Environment override for the webroot.
pub const WEBROOT_ENV: &str = "UR_WEB_WEBROOT";

/// Policy for the `X-Frame-Options` response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XFrameOptions {
    /// Header is not sent
    #[default]
    NotSet,
    /// `X-Frame-Options: DENY`
    Deny,
    /// `X-Frame-Options: SAMEORIGIN`
    SameOrigin,
}

impl XFrameOptions {
    /// Header value, or `None` when the header must be omitted.
    pub fn header_value(&self) -> Option<&'static str> {
        match self {
            XFrameOptions::NotSet => None,
            XFrameOptions::Deny => Some("DENY"),
            XFrameOptions::SameOrigin => Some("SAMEORIGIN"),
        }
    }
}

/// TLS protocol versions a server may negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TlsProtocol {
    #[serde(rename = "1.2")]
    Tls12,
    #[serde(rename = "1.3")]
    Tls13,
}

/// Certificate material and allowed protocol versions.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// PEM file with the certificate chain
    pub cert_path: PathBuf,
    /// PEM file with the private key
    pub key_path: PathBuf,
    /// Protocol versions offered during the handshake
    pub protocols: Vec<TlsProtocol>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path: PathBuf::from("cert.pem"),
            key_path: PathBuf::from("key.pem"),
            protocols: vec![TlsProtocol::Tls12, TlsProtocol::Tls13],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address to bind; unspecified IPv4 means "all interfaces, dual-stack if possible"
    pub local_address: IpAddr,
    /// Public host name, used for redirects when the client sends no `Host`
    pub domain_name: Option<String>,
    /// Root directory of served files
    pub webroot: PathBuf,
    /// Read/write timeout applied to every connection, in seconds
    pub socket_timeout_secs: u64,
    pub port: u16,
    pub tls_port: u16,
    pub tls_enabled: bool,
    /// Plain port only redirects to the TLS port
    pub tls_redirect: bool,
    pub tls: TlsConfig,
    pub x_frame_options: XFrameOptions,
    /// Appcache manifest files, relative to the webroot
    pub appcache_manifests: Vec<String>,
    /// Upper bound of concurrently served connections
    pub max_connections: usize,
    /// Forward offset of the `Expires` header on html/css/js assets, in seconds
    pub static_expires_secs: u64,
    #[serde(skip)]
    no_cache_files: OnceLock<HashSet<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            domain_name: None,
            webroot: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            socket_timeout_secs: 80,
            port: 80,
            tls_port: 443,
            tls_enabled: false,
            tls_redirect: false,
            tls: TlsConfig::default(),
            x_frame_options: XFrameOptions::NotSet,
            appcache_manifests: Vec::new(),
            max_connections: 1000,
            static_expires_secs: 0,
            no_cache_files: OnceLock::new(),
        }
    }
}

impl Config {
    /// Loads the file named by `UR_WEB_CONFIG` (defaults when unset), then
    /// applies the port and webroot environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };

        if let Ok(port) = std::env::var(PORT_ENV) {
            cfg.port = port
                .parse()
                .with_context(|| format!("invalid {PORT_ENV} value {port:?}"))?;
        }
        if let Ok(webroot) = std::env::var(WEBROOT_ENV) {
            cfg.webroot = PathBuf::from(webroot);
        }

        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_secs(self.socket_timeout_secs)
    }

    /// Configured domain name, else the machine host name, else `localhost`.
    pub fn domain_name(&self) -> String {
        self.domain_name
            .clone()
            .filter(|name| !name.is_empty())
            .or_else(|| std::env::var("HOSTNAME").ok().filter(|name| !name.is_empty()))
            .unwrap_or_else(|| "localhost".to_string())
    }

    /// Lower-cased absolute paths listed in the `CACHE:` sections of the
    /// configured appcache manifests. Computed on first use.
    pub fn no_cache_files(&self) -> &HashSet<String> {
        self.no_cache_files
            .get_or_init(|| collect_no_cache_files(&self.webroot, &self.appcache_manifests))
    }

    /// Whether `path` is listed in an appcache manifest. Relative paths are
    /// resolved against the working directory, same as the webroot.
    pub fn is_no_cache(&self, path: &Path) -> bool {
        self.no_cache_files().contains(&path_key(&absolute(path)))
    }
}

/// Lookup key of a path inside the no-cache set.
pub(crate) fn path_key(path: &Path) -> String {
    normalize_path(path).to_string_lossy().to_lowercase()
}

/// Lexically resolves `.` and `..` components.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn collect_no_cache_files(webroot: &Path, manifests: &[String]) -> HashSet<String> {
    let webroot = absolute(webroot);
    let mut files = HashSet::new();

    for manifest in manifests {
        let manifest_path = webroot.join(manifest.trim_start_matches('/'));
        let text = match std::fs::read_to_string(&manifest_path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(manifest = %manifest_path.display(), error = %e, "Could not read appcache manifest");
                continue;
            }
        };
        let dir = manifest_path.parent().unwrap_or(&webroot).to_path_buf();

        for entry in parse_appcache(&text) {
            let path = match entry.strip_prefix('/') {
                Some(rooted) => webroot.join(rooted),
                None => dir.join(&entry),
            };
            files.insert(path_key(&path));
        }
    }

    tracing::debug!(count = files.len(), "No-cache file set initialized");
    files
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// Extracts the cache entries of an appcache manifest: the implicit leading
/// section and every explicit `CACHE:` section. Query and fragment are
/// stripped, cross-origin entries skipped.
pub fn parse_appcache(text: &str) -> Vec<String> {
    let mut lines = text.lines();
    match lines.next() {
        Some(first) if first.trim_start_matches('\u{feff}').starts_with("CACHE MANIFEST") => {}
        _ => return Vec::new(),
    }

    let mut in_cache = true;
    let mut entries = Vec::new();

    for line in lines {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.ends_with(':') && !line.contains(' ') {
            in_cache = line == "CACHE:";
            continue;
        }
        if !in_cache || line.contains("://") {
            continue;
        }

        let entry = line.split(['#', '?']).next().unwrap_or_default();
        if !entry.is_empty() {
            entries.push(entry.to_string());
        }
    }

    entries
}
