use std::io::{self, BufRead, Write as IoWrite};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use xml_search_mcp::search::{search, Category, SearchResults};
use xml_search_mcp::source::{validate_host, validate_username, Credentials, Device, Source, DEFAULT_TIMEOUT};
use xml_search_mcp::{children_for_ordinal, list_children};

// ---------------------------------------------------------------------------
// JSON-RPC 2.0 types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

#[derive(Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Serialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

impl JsonRpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0".into(), id: Some(id), result: Some(result), error: None }
    }
    fn err(id: Value, code: i64, message: String) -> Self {
        Self { jsonrpc: "2.0".into(), id: Some(id), result: None, error: Some(JsonRpcError { code, message }) }
    }
}

// ---------------------------------------------------------------------------
// MCP notifications
// ---------------------------------------------------------------------------

fn send_notification(level: &str, message: &str) {
    let notification = json!({
        "jsonrpc": "2.0",
        "method": "notifications/message",
        "params": { "level": level, "logger": "xml-search-mcp", "data": message }
    });
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let _ = serde_json::to_writer(&mut out, &notification);
    let _ = out.write_all(b"\n");
    let _ = out.flush();
}

fn tool_notification(name: &str, args: &Value) -> String {
    let keyword = args.get("keyword").and_then(|v| v.as_str());
    let source = Source::from_args(args).map(|s| s.describe()).ok();

    match name {
        "keyword_search" => {
            let mut msg = "Searching for keyword".to_string();
            if let Some(k) = keyword { msg.push_str(&format!(" '{k}'")); }
            if let Some(s) = source { msg.push_str(&format!(" in {s}")); }
            msg
        }
        "xpath_children" => {
            let mut msg = "Listing children".to_string();
            if let Some(x) = args.get("xpath").and_then(|v| v.as_str()) {
                msg.push_str(&format!(" of {x}"));
            } else if let Some(n) = args.get("ordinal").and_then(|v| v.as_u64()) {
                msg.push_str(&format!(" of result {n}"));
            }
            if let Some(s) = source { msg.push_str(&format!(" in {s}")); }
            msg
        }
        "api_keygen" => {
            let host = args.get("host").and_then(|v| v.as_str()).unwrap_or("?");
            format!("Generating API key on {host}")
        }
        _ => format!("Running {name}"),
    }
}

// ---------------------------------------------------------------------------
// Output formatting
// ---------------------------------------------------------------------------

const NO_MATCHES: &str = "No xpaths match the keyword";
const NO_CHILDREN: &str = "No children for the chosen xpath";

/// Three headed sections, ordinals running across all of them.
fn format_search_results(results: &SearchResults) -> String {
    let mut out = String::new();
    let mut numbered = results.numbered().peekable();
    for category in Category::ALL {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(category.heading());
        out.push('\n');
        if results.list(category).is_empty() {
            out.push_str(NO_MATCHES);
            out.push('\n');
            continue;
        }
        while let Some((ordinal, _, path)) = numbered.next_if(|(_, c, _)| *c == category) {
            out.push_str(&format!("{ordinal}) {path}\n"));
        }
    }
    out.trim_end().to_string()
}

fn format_children(children: &[String]) -> String {
    if children.is_empty() {
        NO_CHILDREN.to_string()
    } else {
        children.join("\n")
    }
}

// ---------------------------------------------------------------------------
// Tool definitions
// ---------------------------------------------------------------------------

static TOOL_DEFS: OnceLock<Value> = OnceLock::new();

fn source_properties() -> Value {
    json!({
        "xml_data": { "type": "string", "description": "Inline XML string" },
        "xml_file": { "type": "string", "description": "Absolute path to XML file" },
        "host": { "type": "string", "description": "Firewall or Panorama IP/FQDN (falls back to XML_SEARCH_HOST)" },
        "api_key": { "type": "string", "description": "API key for the device (falls back to XML_SEARCH_API_KEY)" },
        "username": { "type": "string", "description": "Login used to generate a key when no api_key is given" },
        "password": { "type": "string", "description": "Password for username" },
        "verify_tls": { "type": "boolean", "description": "Verify the device certificate (default false)" },
        "timeout_secs": { "type": "integer", "description": "Request timeout in seconds (default 30)" }
    })
}

fn tool_definitions() -> &'static Value {
    TOOL_DEFS.get_or_init(|| {
        let mut search_props = source_properties();
        search_props["keyword"] = json!({
            "type": "string",
            "description": "Case-sensitive regular expression, matched anywhere in tag names, name attributes and text"
        });

        let mut children_props = source_properties();
        children_props["xpath"] = json!({ "type": "string", "description": "An xpath reported by keyword_search" });
        children_props["keyword"] = json!({ "type": "string", "description": "Keyword of the earlier search (with ordinal)" });
        children_props["ordinal"] = json!({ "type": "integer", "description": "Number shown next to the xpath in keyword_search output" });

        json!({
            "tools": [
                {
                    "name": "keyword_search",
                    "description": concat!(
                        "Find a keyword in an XML configuration and report every location as an xpath.\n\n",
                        "INPUT: XML (inline, file, or fetched from a device) + keyword\n",
                        "OUTPUT: Numbered xpaths in three sections: tags, attributes, text\n\n",
                        "Repeated entries are named: entry[@name='rule1']. Leaf hits carry their text: member[text()='any'].\n",
                        "Numbers run across all sections; pass one to xpath_children to look one level deeper."
                    ),
                    "inputSchema": {
                        "type": "object",
                        "properties": search_props,
                        "required": ["keyword"]
                    }
                },
                {
                    "name": "xpath_children",
                    "description": concat!(
                        "List the immediate children of an xpath, formatted like keyword_search output.\n\n",
                        "INPUT: XML source + either 'xpath', or 'keyword' and 'ordinal' from a keyword_search\n",
                        "OUTPUT: One child xpath per line, or a no-children line\n\n",
                        "The document is fetched again, so a path that no longer exists simply has no children."
                    ),
                    "inputSchema": {
                        "type": "object",
                        "properties": children_props
                    }
                },
                {
                    "name": "api_keygen",
                    "description": "Generate an API key on a firewall or Panorama from a username and password.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "host": { "type": "string", "description": "Firewall or Panorama IP/FQDN" },
                            "username": { "type": "string" },
                            "password": { "type": "string" },
                            "verify_tls": { "type": "boolean", "description": "Verify the device certificate (default false)" }
                        },
                        "required": ["host", "username", "password"]
                    }
                }
            ]
        })
    })
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn text_result(text: &str) -> Value {
    json!({ "content": [{ "type": "text", "text": text }] })
}

fn load_source(args: &Value) -> Result<xml_search_mcp::Document, String> {
    let source = Source::from_args(args)?;
    if let Source::Device(device) = &source {
        send_notification("info", &format!("Retrieving running configuration from {}", device.host));
    }
    source.load()
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args.get(key).and_then(|v| v.as_str()).ok_or_else(|| format!("Missing '{key}'"))
}

// ---------------------------------------------------------------------------
// MCP tool dispatch
// ---------------------------------------------------------------------------

fn handle_tool_call(params: &Value) -> Result<Value, String> {
    let name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
    let args = params.get("arguments").cloned().unwrap_or(json!({}));

    send_notification("info", &tool_notification(name, &args));

    match name {
        "keyword_search" => {
            let keyword = required_str(&args, "keyword")?;
            let doc = load_source(&args)?;
            let results = search(&doc.scope(), keyword)
                .map_err(|e| format!("{e}. Please try again with another keyword."))?;
            Ok(text_result(&format_search_results(&results)))
        }
        "xpath_children" => {
            let doc = load_source(&args)?;
            let scope = doc.scope();
            let children = if let Some(xpath) = args.get("xpath").and_then(|v| v.as_str()) {
                list_children(&scope, xpath)
            } else {
                let keyword = args.get("keyword").and_then(|v| v.as_str());
                let ordinal = args.get("ordinal").and_then(|v| v.as_u64());
                let (Some(keyword), Some(ordinal)) = (keyword, ordinal) else {
                    return Err("Provide 'xpath', or 'keyword' and 'ordinal'.".into());
                };
                let results = search(&scope, keyword).map_err(|e| e.to_string())?;
                children_for_ordinal(&scope, &results, ordinal as usize).map_err(|e| e.to_string())?
            };
            Ok(text_result(&format_children(&children)))
        }
        "api_keygen" => {
            let host = required_str(&args, "host")?;
            let username = required_str(&args, "username")?;
            let password = required_str(&args, "password")?;
            validate_host(host)?;
            validate_username(username)?;
            let device = Device {
                host: host.to_string(),
                credentials: Credentials::Login { username: username.to_string(), password: password.to_string() },
                verify_tls: args.get("verify_tls").and_then(|v| v.as_bool()).unwrap_or(false),
                timeout: DEFAULT_TIMEOUT,
            };
            Ok(text_result(&device.api_key()?))
        }
        _ => Err(format!(
            "Unknown tool: {name}. Available tools: keyword_search, xpath_children, api_keygen"
        )),
    }
}

// ---------------------------------------------------------------------------
// MCP protocol handler
// ---------------------------------------------------------------------------

fn handle_request(req: &JsonRpcRequest) -> Option<JsonRpcResponse> {
    let id = req.id.as_ref()?.clone();

    let resp = match req.method.as_str() {
        "initialize" => JsonRpcResponse::ok(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": { "tools": {}, "logging": {} },
                "serverInfo": { "name": "xml-search-mcp", "version": env!("CARGO_PKG_VERSION") },
                "instructions": concat!(
                    "# xml-search-mcp: Keyword search in XML configurations\n\n",
                    "1. `keyword_search` with a keyword and a source (xml_data, xml_file, or host + api_key)\n",
                    "2. `xpath_children` with the same source and keyword plus the number of a result\n",
                    "3. `api_keygen` turns a username/password into an API key for later calls\n\n",
                    "Keywords are case-sensitive regular expressions. The document is fetched on every call."
                )
            }),
        ),
        "tools/list" => JsonRpcResponse::ok(id, tool_definitions().clone()),
        "tools/call" => {
            let params = req.params.clone().unwrap_or(json!({}));
            match handle_tool_call(&params) {
                Ok(content) => JsonRpcResponse::ok(id, content),
                Err(e) => {
                    send_notification("warning", &e);
                    JsonRpcResponse::ok(
                        id,
                        json!({ "content": [{ "type": "text", "text": e }], "isError": true }),
                    )
                }
            }
        }
        "ping" => JsonRpcResponse::ok(id, json!({})),
        _ => JsonRpcResponse::err(id, -32601, format!("Method not found: {}", req.method)),
    };

    Some(resp)
}

// ---------------------------------------------------------------------------
// Main — stdio transport
// ---------------------------------------------------------------------------

fn main() {
    let stdin = io::stdin();
    let stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("xml-search-mcp: failed to parse request: {e}");
                continue;
            }
        };

        if let Some(response) = handle_request(&request) {
            let mut out = stdout.lock();
            let _ = serde_json::to_writer(&mut out, &response);
            let _ = out.write_all(b"\n");
            let _ = out.flush();
        }
    }
}
