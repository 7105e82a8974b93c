//! Tests for configuration loading

use std::io::Write;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;
use ur_web::config::{
    CONFIG_ENV, Config, PORT_ENV, TlsProtocol, WEBROOT_ENV, XFrameOptions,
};

#[test]
fn test_config_defaults() {
    let cfg = Config::default();

    assert_eq!(cfg.local_address, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    assert_eq!(cfg.port, 80);
    assert_eq!(cfg.tls_port, 443);
    assert!(!cfg.tls_enabled);
    assert!(!cfg.tls_redirect);
    assert_eq!(cfg.socket_timeout(), Duration::from_secs(80));
    assert_eq!(cfg.x_frame_options, XFrameOptions::NotSet);
    assert_eq!(cfg.max_connections, 1000);
    assert!(cfg.appcache_manifests.is_empty());
}

#[test]
fn test_config_empty_yaml_is_default() {
    let cfg = Config::from_yaml("  \n").unwrap();
    assert_eq!(cfg.port, 80);
}

#[test]
fn test_config_from_yaml() {
    let yaml = r#"
local_address: 127.0.0.1
domain_name: example.org
webroot: /srv/www
socket_timeout_secs: 5
port: 8080
tls_port: 8443
tls_enabled: true
tls_redirect: true
tls:
  cert_path: /etc/ur/cert.pem
  key_path: /etc/ur/key.pem
  protocols: ["1.3"]
x_frame_options: same_origin
appcache_manifests:
  - /app.appcache
max_connections: 10
static_expires_secs: 3600
"#;
    let cfg = Config::from_yaml(yaml).unwrap();

    assert_eq!(cfg.local_address, IpAddr::V4(Ipv4Addr::LOCALHOST));
    assert_eq!(cfg.domain_name(), "example.org");
    assert_eq!(cfg.webroot, PathBuf::from("/srv/www"));
    assert_eq!(cfg.socket_timeout(), Duration::from_secs(5));
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.tls_port, 8443);
    assert!(cfg.tls_enabled && cfg.tls_redirect);
    assert_eq!(cfg.tls.cert_path, PathBuf::from("/etc/ur/cert.pem"));
    assert_eq!(cfg.tls.protocols, vec![TlsProtocol::Tls13]);
    assert_eq!(cfg.x_frame_options, XFrameOptions::SameOrigin);
    assert_eq!(cfg.appcache_manifests, vec!["/app.appcache".to_string()]);
    assert_eq!(cfg.max_connections, 10);
    assert_eq!(cfg.static_expires_secs, 3600);
}

#[test]
fn test_config_partial_yaml_keeps_defaults() {
    let cfg = Config::from_yaml("port: 9000\n").unwrap();

    assert_eq!(cfg.port, 9000);
    assert_eq!(cfg.tls_port, 443);
    assert_eq!(
        cfg.tls.protocols,
        vec![TlsProtocol::Tls12, TlsProtocol::Tls13]
    );
}

#[test]
fn test_config_rejects_unknown_protocol() {
    assert!(Config::from_yaml("tls:\n  protocols: [\"1.1\"]\n").is_err());
}

#[test]
fn test_config_clone() {
    let cfg1 = Config::from_yaml("port: 8000\n").unwrap();
    let cfg2 = cfg1.clone();
    assert_eq!(cfg1.port, cfg2.port);
    assert_eq!(cfg1.webroot, cfg2.webroot);
}

#[test]
fn test_no_cache_files_from_manifest() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("app")).unwrap();
    std::fs::write(
        dir.path().join("app").join("app.appcache"),
        "CACHE MANIFEST\nCACHE:\nmain.js\n/Shared/Style.css\nNETWORK:\napi.json\n",
    )
    .unwrap();

    let mut cfg = Config::default();
    cfg.webroot = dir.path().to_path_buf();
    cfg.appcache_manifests = vec!["/app/app.appcache".to_string()];

    assert_eq!(cfg.no_cache_files().len(), 2);
    assert!(cfg.is_no_cache(&dir.path().join("app").join("main.js")));
    assert!(cfg.is_no_cache(&dir.path().join("shared").join("style.css")));
    assert!(!cfg.is_no_cache(&dir.path().join("app").join("api.json")));
}

#[test]
fn test_missing_manifest_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = Config::default();
    cfg.webroot = dir.path().to_path_buf();
    cfg.appcache_manifests = vec!["/missing.appcache".to_string()];

    assert!(cfg.no_cache_files().is_empty());
}

// Environment variables are process-wide, so every override is checked in
// this one test.
#[test]
fn test_config_load_from_env() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "port: 8081\nx_frame_options: deny").unwrap();

    unsafe {
        std::env::set_var(CONFIG_ENV, file.path());
        std::env::remove_var(PORT_ENV);
        std::env::remove_var(WEBROOT_ENV);
    }
    let cfg = Config::load().unwrap();
    assert_eq!(cfg.port, 8081);
    assert_eq!(cfg.x_frame_options, XFrameOptions::Deny);

    unsafe {
        std::env::set_var(PORT_ENV, "9090");
        std::env::set_var(WEBROOT_ENV, "/var/www");
    }
    let cfg = Config::load().unwrap();
    assert_eq!(cfg.port, 9090);
    assert_eq!(cfg.webroot, PathBuf::from("/var/www"));

    unsafe {
        std::env::set_var(PORT_ENV, "not-a-port");
    }
    assert!(Config::load().is_err());

    unsafe {
        std::env::set_var(CONFIG_ENV, "/nonexistent/ur-web.yaml");
        std::env::remove_var(PORT_ENV);
    }
    assert!(Config::load().is_err());

    unsafe {
        std::env::remove_var(CONFIG_ENV);
        std::env::remove_var(WEBROOT_ENV);
    }
    assert_eq!(Config::load().unwrap().port, 80);
}
