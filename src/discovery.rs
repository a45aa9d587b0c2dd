//! Target discovery via the runtime's HTTP introspection endpoint.
//!
//! The Electron runtime exposes its attachable targets as a JSON array on
//! `http://localhost:{port}/json/list` (newer runtimes) with `/json` as the
//! legacy fallback. Discovery fails soft: any transport error or empty
//! result yields "no targets", never an error the caller must handle.
//!
//! # Selection
//!
//! 1. Page-type targets whose URL contains the product domain
//!    (case-insensitive); of those, the shortest URL wins. Embedded frames
//!    and popup windows carry longer URLs than the main window.
//! 2. If no target matches the domain, any page-type target.
//! 3. No page-type target at all: discovery fails.

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use tracing::{debug, warn};

// ============================================================================
// Constants
// ============================================================================

/// Introspection paths, probed in order until one yields targets.
const DISCOVERY_ENDPOINTS: [&str; 2] = ["/json/list", "/json"];

// ============================================================================
// Target
// ============================================================================

/// A discovered attach candidate.
///
/// Transient: re-fetched on every (re)connect attempt, never persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct Target {
    /// Target identifier assigned by the runtime.
    #[serde(default)]
    pub id: String,

    /// Declared target type (`page`, `iframe`, `service_worker`, ...).
    #[serde(rename = "type", default)]
    pub target_type: String,

    /// Page title.
    #[serde(default)]
    pub title: String,

    /// Current document URL.
    #[serde(default)]
    pub url: String,

    /// Duplex-channel attach address.
    #[serde(rename = "webSocketDebuggerUrl", default)]
    pub web_socket_debugger_url: Option<String>,
}

impl Target {
    /// Returns `true` if this is a page-type target.
    #[inline]
    #[must_use]
    pub fn is_page(&self) -> bool {
        self.target_type == "page"
    }
}

// ============================================================================
// Discovery
// ============================================================================

/// Fetches the target list from the introspection endpoint.
///
/// Probes `/json/list` first, then the legacy `/json`, until a non-empty
/// list is obtained. Returns an empty list if every variant fails or is
/// empty.
pub async fn fetch_targets(client: &reqwest::Client, port: u16) -> Vec<Target> {
    for endpoint in DISCOVERY_ENDPOINTS {
        let url = format!("http://localhost:{port}{endpoint}");

        let targets = match client.get(&url).send().await {
            Ok(response) => match response.json::<Vec<Target>>().await {
                Ok(targets) => targets,
                Err(e) => {
                    warn!(%url, error = %e, "Malformed target list");
                    continue;
                }
            },
            Err(e) => {
                debug!(%url, error = %e, "Discovery endpoint unreachable");
                continue;
            }
        };

        if !targets.is_empty() {
            debug!(%url, count = targets.len(), "Discovered targets");
            return targets;
        }
    }

    Vec::new()
}

/// Selects the best attach candidate from a target list.
///
/// Returns `None` if the list contains no page-type target.
#[must_use]
pub fn select_target<'a>(targets: &'a [Target], product_domain: &str) -> Option<&'a Target> {
    let domain = product_domain.to_ascii_lowercase();

    let preferred = targets
        .iter()
        .filter(|t| t.is_page() && t.url.to_ascii_lowercase().contains(&domain))
        .min_by_key(|t| t.url.len());

    if preferred.is_some() {
        return preferred;
    }

    // Fallback: any page target, domain filter notwithstanding.
    targets.iter().find(|t| t.is_page())
}

/// Discovers and selects an attach target in one step.
pub async fn discover(
    client: &reqwest::Client,
    port: u16,
    product_domain: &str,
) -> Option<Target> {
    let targets = fetch_targets(client, port).await;
    if targets.is_empty() {
        warn!(port, "No CDP targets found");
        return None;
    }

    let selected = select_target(&targets, product_domain).cloned();
    if selected.is_none() {
        warn!(port, "No suitable CDP target found");
    }
    selected
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn page(url: &str) -> Target {
        Target {
            id: String::new(),
            target_type: "page".to_string(),
            title: String::new(),
            url: url.to_string(),
            web_socket_debugger_url: Some("ws://localhost:9222/devtools/page/x".to_string()),
        }
    }

    fn worker(url: &str) -> Target {
        Target {
            target_type: "service_worker".to_string(),
            ..page(url)
        }
    }

    #[test]
    fn test_select_prefers_shortest_domain_url() {
        let targets = vec![
            page("https://app.clickup.com/t/abc123/print"),
            page("https://app.clickup.com/"),
        ];

        let selected = select_target(&targets, "clickup.com").expect("target");
        assert_eq!(selected.url, "https://app.clickup.com/");
    }

    #[test]
    fn test_select_domain_match_is_case_insensitive() {
        let targets = vec![page("https://APP.CLICKUP.COM/")];
        assert!(select_target(&targets, "clickup.com").is_some());
    }

    #[test]
    fn test_select_falls_back_to_any_page() {
        let targets = vec![
            worker("https://app.clickup.com/worker"),
            page("https://unrelated.example.org/"),
        ];

        let selected = select_target(&targets, "clickup.com").expect("target");
        assert_eq!(selected.url, "https://unrelated.example.org/");
    }

    #[test]
    fn test_select_fails_without_page_target() {
        let targets = vec![worker("https://app.clickup.com/worker")];
        assert!(select_target(&targets, "clickup.com").is_none());
    }

    #[test]
    fn test_select_empty_list() {
        assert!(select_target(&[], "clickup.com").is_none());
    }

    // ------------------------------------------------------------------
    // Endpoint fallback against a canned HTTP server
    // ------------------------------------------------------------------

    /// Serves fixed JSON bodies per path until dropped.
    async fn spawn_http_server(routes: HashMap<&'static str, String>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let routes = routes.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 1024];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();
                    let path = request
                        .split_whitespace()
                        .nth(1)
                        .unwrap_or("/")
                        .to_string();

                    let body = routes.get(path.as_str()).cloned().unwrap_or_default();
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                         content-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });

        port
    }

    #[tokio::test]
    async fn test_fetch_falls_back_to_legacy_endpoint() {
        let mut routes = HashMap::new();
        routes.insert("/json/list", "[]".to_string());
        routes.insert(
            "/json",
            r#"[{"type": "page", "url": "https://app.clickup.com/",
                 "webSocketDebuggerUrl": "ws://localhost:1/devtools/page/1"}]"#
                .to_string(),
        );
        let port = spawn_http_server(routes).await;

        let client = reqwest::Client::new();
        let targets = fetch_targets(&client, port).await;

        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].url, "https://app.clickup.com/");
    }

    #[tokio::test]
    async fn test_fetch_unreachable_port_is_empty() {
        let client = reqwest::Client::new();
        // Bind-then-drop to get a port nothing listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            listener.local_addr().expect("addr").port()
        };

        let targets = fetch_targets(&client, port).await;
        assert!(targets.is_empty());
    }

    #[tokio::test]
    async fn test_discover_selects_from_fetched_list() {
        let mut routes = HashMap::new();
        routes.insert(
            "/json/list",
            r#"[{"type": "page", "url": "https://app.clickup.com/t/abc123/print",
                 "webSocketDebuggerUrl": "ws://localhost:1/devtools/page/1"},
                {"type": "page", "url": "https://app.clickup.com/",
                 "webSocketDebuggerUrl": "ws://localhost:1/devtools/page/2"}]"#
                .to_string(),
        );
        let port = spawn_http_server(routes).await;

        let client = reqwest::Client::new();
        let target = discover(&client, port, "clickup.com").await.expect("target");
        assert_eq!(target.url, "https://app.clickup.com/");
    }
}
