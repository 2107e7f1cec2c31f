use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::Value;

use crate::tree::Document;

// ---------------------------------------------------------------------------
// Document sources — where the configuration comes from
// ---------------------------------------------------------------------------

/// Operational command returning the running configuration.
pub const SHOW_RUNNING_CONFIG: &str = "<show><config><running></running></config></show>";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    ApiKey(String),
    Login { username: String, password: String },
}

/// A firewall or management server reached through its XML API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Device {
    pub host: String,
    pub credentials: Credentials,
    pub verify_tls: bool,
    pub timeout: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    Inline(String),
    File(PathBuf),
    Device(Device),
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str()).filter(|s| !s.trim().is_empty())
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Tool argument first, then the `XML_SEARCH_*` environment variable.
fn setting(args: &Value, key: &str, env: &str) -> Option<String> {
    str_arg(args, key).map(str::to_string).or_else(|| env_value(env))
}

impl Source {
    /// Picks the source from tool arguments: `xml_data`, then `xml_file`,
    /// then a device given by `host` (or `XML_SEARCH_HOST`).
    pub fn from_args(args: &Value) -> Result<Self, String> {
        if let Some(xml) = args.get("xml_data").and_then(|v| v.as_str()) {
            return Ok(Source::Inline(xml.to_string()));
        }
        if let Some(path) = str_arg(args, "xml_file") {
            return Ok(Source::File(PathBuf::from(path)));
        }
        if let Some(host) = setting(args, "host", "XML_SEARCH_HOST") {
            return Device::from_args(host, args).map(Source::Device);
        }
        Err("Provide 'xml_data' (inline string), 'xml_file' (absolute file path), or 'host' with 'api_key' or 'username'/'password'.".into())
    }

    /// Short description for notifications. Never includes secrets.
    pub fn describe(&self) -> String {
        match self {
            Source::Inline(_) => "inline XML".into(),
            Source::File(path) => path.display().to_string(),
            Source::Device(device) => device.host.clone(),
        }
    }

    /// Raw document text. Every call reads or fetches anew.
    pub fn fetch(&self) -> Result<String, String> {
        match self {
            Source::Inline(xml) => Ok(xml.clone()),
            Source::File(path) => std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read file {}: {e}", path.display())),
            Source::Device(device) => device.fetch_running_config(),
        }
    }

    /// Fetches and parses a fresh document.
    pub fn load(&self) -> Result<Document, String> {
        let doc = Document::parse(&self.fetch()?)?;
        if doc.status() == Some("error") {
            let detail = doc.root().deep_text();
            return Err(format!("{} refused the request: {}", self.describe(), detail.trim()));
        }
        Ok(doc)
    }
}

// ---------------------------------------------------------------------------
// Device API
// ---------------------------------------------------------------------------

impl Device {
    pub fn from_args(host: String, args: &Value) -> Result<Self, String> {
        validate_host(&host)?;

        let credentials = if let Some(key) = setting(args, "api_key", "XML_SEARCH_API_KEY") {
            Credentials::ApiKey(key)
        } else {
            let username = setting(args, "username", "XML_SEARCH_USERNAME")
                .ok_or("Provide 'api_key', or 'username' and 'password', for the device.")?;
            validate_username(&username)?;
            let password = args.get("password").and_then(|v| v.as_str()).map(str::to_string)
                .or_else(|| env_value("XML_SEARCH_PASSWORD"))
                .ok_or("Provide 'password' together with 'username'.")?;
            Credentials::Login { username, password }
        };

        let verify_tls = match args.get("verify_tls").and_then(|v| v.as_bool()) {
            Some(v) => v,
            None => env_value("XML_SEARCH_VERIFY_TLS").is_some_and(|v| matches!(v.trim(), "1" | "true" | "yes")),
        };
        let timeout = args.get("timeout_secs")
            .and_then(|v| v.as_u64())
            .filter(|s| *s > 0)
            .map_or(DEFAULT_TIMEOUT, Duration::from_secs);

        Ok(Device { host, credentials, verify_tls, timeout })
    }

    fn client(&self) -> Result<Client, String> {
        Client::builder()
            .danger_accept_invalid_certs(!self.verify_tls)
            .timeout(self.timeout)
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {e}"))
    }

    fn api_get(&self, client: &Client, params: &[(&str, &str)]) -> Result<String, String> {
        let host = &self.host;
        // Request URLs carry the password or key, so errors are reported without them.
        let response = client
            .get(format!("https://{host}/api/"))
            .query(params)
            .send()
            .map_err(|e| {
                let e = e.without_url();
                if e.is_connect() || e.is_timeout() {
                    format!("There was a problem connecting to {host}. Check the address and try again: {e}")
                } else {
                    format!("Request to {host} failed: {e}")
                }
            })?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| format!("Failed to read response from {host}: {}", e.without_url()))?;
        api_body(host, status, body)
    }

    /// Exchanges a username and password for an API key.
    pub fn generate_api_key(&self, client: &Client) -> Result<String, String> {
        match &self.credentials {
            Credentials::ApiKey(key) => Ok(key.clone()),
            Credentials::Login { username, password } => {
                let body = self.api_get(
                    client,
                    &[("type", "keygen"), ("user", username.as_str()), ("password", password.as_str())],
                )?;
                parse_keygen_response(&body)
            }
        }
    }

    /// Same as [`Device::generate_api_key`] with a client built from this device's settings.
    pub fn api_key(&self) -> Result<String, String> {
        let client = self.client()?;
        self.generate_api_key(&client)
    }

    pub fn fetch_running_config(&self) -> Result<String, String> {
        let client = self.client()?;
        let key = self.generate_api_key(&client)?;
        self.api_get(&client, &[("type", "op"), ("cmd", SHOW_RUNNING_CONFIG), ("key", key.as_str())])
    }
}

/// Keeps a refusal's `<response status="error">` body so its message reaches
/// the caller; other non-success replies are reported by HTTP status.
fn api_body(host: &str, status: StatusCode, body: String) -> Result<String, String> {
    if status.is_success() {
        return Ok(body);
    }
    match Document::parse(&body) {
        Ok(doc) if doc.status() == Some("error") => Ok(body),
        _ => Err(format!("{host} answered with HTTP {status}")),
    }
}

/// Pulls `result/key` out of a key generation response.
pub fn parse_keygen_response(xml: &str) -> Result<String, String> {
    let doc = Document::parse(xml)?;
    if doc.status() != Some("success") {
        return Err("Key generation failed: incorrect username or password.".into());
    }
    doc.root()
        .find_child("result")
        .and_then(|result| result.find_child("key"))
        .map(|key| key.deep_text().trim().to_string())
        .filter(|key| !key.is_empty())
        .ok_or_else(|| "Key generation response did not contain a key.".to_string())
}

// ---------------------------------------------------------------------------
// Input validation
// ---------------------------------------------------------------------------

fn fqdn_pattern() -> &'static Regex {
    static FQDN: OnceLock<Regex> = OnceLock::new();
    FQDN.get_or_init(|| {
        Regex::new(r"^(?:[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,63}$")
            .expect("FQDN pattern is valid")
    })
}

fn username_pattern() -> &'static Regex {
    static USERNAME: OnceLock<Regex> = OnceLock::new();
    USERNAME.get_or_init(|| Regex::new(r"^[\w-]{3,24}$").expect("username pattern is valid"))
}

/// Accepts a dotted IPv4 address or a fully qualified domain name.
pub fn validate_host(host: &str) -> Result<(), String> {
    let is_ipv4 = host.parse::<std::net::Ipv4Addr>().is_ok();
    let is_fqdn = (4..=253).contains(&host.len()) && fqdn_pattern().is_match(host);
    if is_ipv4 || is_fqdn {
        Ok(())
    } else {
        Err(format!("'{host}' is not an IPv4 address or FQDN."))
    }
}

pub fn validate_username(username: &str) -> Result<(), String> {
    if username_pattern().is_match(username) {
        Ok(())
    } else {
        Err("User name must be 3-24 letters, digits, '_' or '-'.".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inline_xml_wins_over_other_sources() {
        let source = Source::from_args(&json!({ "xml_data": "<a/>", "xml_file": "/tmp/x.xml" })).unwrap();
        assert_eq!(source, Source::Inline("<a/>".into()));
        assert_eq!(source.fetch().unwrap(), "<a/>");
    }

    #[test]
    fn reads_file_source() {
        let path = std::env::temp_dir().join(format!("xml-search-mcp-{}.xml", std::process::id()));
        std::fs::write(&path, "<result><config/></result>").unwrap();
        let source = Source::from_args(&json!({ "xml_file": path.to_str().unwrap() })).unwrap();
        let doc = source.load().unwrap();
        assert_eq!(doc.scope().len(), 1);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_is_an_error() {
        let source = Source::File(PathBuf::from("/nonexistent/xml-search-mcp.xml"));
        assert!(source.fetch().unwrap_err().contains("Failed to read file"));
    }

    #[test]
    fn error_status_is_reported() {
        let source = Source::Inline(r#"<response status="error"><msg><line>Invalid credentials</line></msg></response>"#.into());
        let err = source.load().unwrap_err();
        assert!(err.contains("Invalid credentials"), "{err}");
    }

    #[test]
    fn device_with_api_key() {
        let source = Source::from_args(&json!({ "host": "fw1.example.com", "api_key": "KEY", "timeout_secs": 5 })).unwrap();
        let Source::Device(device) = source else { panic!("expected device source") };
        assert_eq!(device.credentials, Credentials::ApiKey("KEY".into()));
        assert_eq!(device.timeout, Duration::from_secs(5));
        assert!(!device.verify_tls);
    }

    #[test]
    fn device_with_login() {
        let args = json!({ "host": "10.1.1.1", "username": "admin", "password": "secret", "verify_tls": true });
        let Source::Device(device) = Source::from_args(&args).unwrap() else { panic!("expected device source") };
        assert_eq!(
            device.credentials,
            Credentials::Login { username: "admin".into(), password: "secret".into() }
        );
        assert!(device.verify_tls);
        assert_eq!(device.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn device_rejects_bad_input() {
        assert!(Source::from_args(&json!({ "host": "not a host", "api_key": "k" })).is_err());
        assert!(Source::from_args(&json!({ "host": "10.1.1.1", "username": "a!", "password": "p" })).is_err());
    }

    #[test]
    fn validates_hosts() {
        assert!(validate_host("192.168.1.1").is_ok());
        assert!(validate_host("panorama.corp.example").is_ok());
        assert!(validate_host("256.1.1.1").is_err());
        assert!(validate_host("-bad.example.com").is_err());
        assert!(validate_host("localhost").is_err());
        assert!(validate_host("a.b").is_err());
    }

    #[test]
    fn validates_usernames() {
        assert!(validate_username("admin").is_ok());
        assert!(validate_username("svc-api_01").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("a".repeat(25).as_str()).is_err());
        assert!(validate_username("bad user").is_err());
    }

    #[test]
    fn unreachable_device_errors_hide_credentials() {
        let with_key = Device {
            host: "127.0.0.1:1".into(),
            credentials: Credentials::ApiKey("SECRETKEY123".into()),
            verify_tls: false,
            timeout: Duration::from_secs(5),
        };
        let err = with_key.fetch_running_config().unwrap_err();
        assert!(err.contains("127.0.0.1"), "{err}");
        assert!(!err.contains("SECRETKEY123"), "{err}");

        let with_login = Device {
            credentials: Credentials::Login { username: "admin".into(), password: "hunter2pw".into() },
            ..with_key
        };
        let err = with_login.api_key().unwrap_err();
        assert!(!err.contains("hunter2pw"), "{err}");
        assert!(!err.contains("password="), "{err}");
    }

    #[test]
    fn refusal_body_survives_error_status() {
        let refused = r#"<response status="error"><result><msg>Invalid credentials.</msg></result></response>"#;
        let body = api_body("fw1", StatusCode::FORBIDDEN, refused.to_string()).unwrap();
        assert!(parse_keygen_response(&body).unwrap_err().contains("incorrect"));
        let err = Source::Inline(body).load().unwrap_err();
        assert!(err.contains("Invalid credentials."), "{err}");

        let err = api_body("fw1", StatusCode::BAD_GATEWAY, "<html>bad gateway".to_string()).unwrap_err();
        assert!(err.contains("502"), "{err}");
        assert_eq!(api_body("fw1", StatusCode::OK, "<a/>".to_string()).unwrap(), "<a/>");
    }

    #[test]
    fn parses_keygen_responses() {
        let ok = r#"<response status="success"><result><key>LUFRPT1abc==</key></result></response>"#;
        assert_eq!(parse_keygen_response(ok).unwrap(), "LUFRPT1abc==");

        let refused = r#"<response status="error"><result><msg>Invalid credentials.</msg></result></response>"#;
        assert!(parse_keygen_response(refused).unwrap_err().contains("incorrect"));

        let empty = r#"<response status="success"><result/></response>"#;
        assert!(parse_keygen_response(empty).is_err());
    }
}
