use ipnet::IpNet;
use lazy_static::lazy_static;
use reqwest::{Url, redirect};
use serde_json::{Value, json};
use std::net::IpAddr;
use std::time::Duration;
use tracing::warn;

use crate::error::{ConfigError, ToolError};
use crate::prompt::trim_text;

const HTTP_TIMEOUT_SECS: u64 = 15;
const MAX_PAGE_CHARS: usize = 6_000;
const MAX_REDIRECTS: usize = 5;

lazy_static! {
    // Loopback, private, link-local (cloud metadata), CGNAT and other non-routable ranges
    static ref DENIED_NETS: Vec<IpNet> = [
        "0.0.0.0/8",
        "10.0.0.0/8",
        "100.64.0.0/10",
        "127.0.0.0/8",
        "169.254.0.0/16",
        "172.16.0.0/12",
        "192.0.0.0/24",
        "192.168.0.0/16",
        "198.18.0.0/15",
        "224.0.0.0/4",
        "240.0.0.0/4",
        "::/128",
        "::1/128",
        "fc00::/7",
        "fe80::/10",
        "ff00::/8",
    ]
    .iter()
    .map(|net| net.parse().unwrap())
    .collect();
}

pub fn is_public(ip: IpAddr) -> bool {
    let ip = ip.to_canonical();
    !DENIED_NETS.iter().any(|net| net.contains(&ip))
}

pub struct WebFetcher {
    client: reqwest::Client,
}

impl WebFetcher {
    pub fn new() -> Result<Self, ConfigError> {
        // redirects may not leave the host that passed the address check
        let policy = redirect::Policy::custom(|attempt| {
            let same_host = attempt
                .previous()
                .first()
                .is_some_and(|first| first.host_str() == attempt.url().host_str());
            if attempt.previous().len() > MAX_REDIRECTS || !same_host {
                attempt.stop()
            } else {
                attempt.follow()
            }
        });
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .redirect(policy)
            .build()?;
        Ok(Self { client })
    }

    pub async fn fetch_text(&self, url: &str) -> Result<Value, ToolError> {
        let parsed = Url::parse(url).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ToolError::InvalidArguments(format!(
                "only http(s) URLs can be fetched, got {:?}",
                url
            )));
        }
        ensure_public(&parsed).await?;

        let html = self
            .client
            .get(parsed)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Ok(json!({
            "url": url,
            "content": trim_text(&visible_text(&html), MAX_PAGE_CHARS),
        }))
    }
}

// Every address the host resolves to must be public
async fn ensure_public(url: &Url) -> Result<(), ToolError> {
    let host = url
        .host_str()
        .ok_or_else(|| ToolError::InvalidArguments("URL has no host".to_string()))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port = url.port_or_known_default().unwrap_or(80);

    let addrs: Vec<IpAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| ToolError::InvalidArguments(format!("could not resolve {}: {}", host, e)))?
        .map(|addr| addr.ip())
        .collect();

    if addrs.is_empty() || !addrs.iter().all(|ip| is_public(*ip)) {
        warn!(target: "security", host, "blocked fetch of non-public address");
        return Err(ToolError::Forbidden(host.to_string()));
    }
    Ok(())
}

/// Text a reader would see: tags, scripts and styles removed, whitespace collapsed.
pub fn visible_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 2);
    let mut rest = html;

    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        out.push(' ');
        let tag = &rest[start..];
        let lower = tag.get(..7).unwrap_or(tag).to_ascii_lowercase();

        // skip whole script/style blocks, not just their tags
        let closing = if lower.starts_with("<script") {
            Some("</script>")
        } else if lower.starts_with("<style") {
            Some("</style>")
        } else {
            None
        };

        rest = match closing {
            Some(end_tag) => match find_ascii_ci(tag, end_tag) {
                Some(end) => &tag[end + end_tag.len()..],
                None => "",
            },
            None => match tag.find('>') {
                Some(end) => &tag[end + 1..],
                None => "",
            },
        };
    }
    out.push_str(rest);

    decode_entities(&out)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().find(needle)
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
