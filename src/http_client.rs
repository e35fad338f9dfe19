use reqwest::ClientBuilder;

use crate::config::UpstreamConfig;

fn has_proxy_env() -> bool {
    [
        "HTTPS_PROXY",
        "https_proxy",
        "HTTP_PROXY",
        "http_proxy",
        "ALL_PROXY",
        "all_proxy",
    ]
    .iter()
    .any(|k| std::env::var(k).is_ok_and(|v| !v.trim().is_empty()))
}

fn host_matches(host: &str, pattern: &str) -> bool {
    let pattern = pattern.trim();
    if let Some(suffix) = pattern.strip_prefix('.') {
        host == suffix || host.ends_with(&format!(".{}", suffix))
    } else {
        host.eq_ignore_ascii_case(pattern)
    }
}

fn should_bypass_proxy_impl(url: &str, no_proxy_hosts: &[String], proxy_env_present: bool) -> bool {
    if !proxy_env_present {
        return false;
    }

    let Ok(u) = reqwest::Url::parse(url) else {
        return false;
    };
    let Some(host) = u.host_str() else {
        return false;
    };

    // 本地上游（测试桩、自建推理服务）永远直连
    if host == "localhost" || host == "127.0.0.1" || host == "[::1]" {
        return true;
    }

    no_proxy_hosts.iter().any(|p| host_matches(host, p))
}

pub fn maybe_disable_proxy(builder: ClientBuilder, cfg: &UpstreamConfig) -> ClientBuilder {
    if should_bypass_proxy_impl(&cfg.base_url, &cfg.no_proxy_hosts, has_proxy_env()) {
        tracing::debug!(base_url = %cfg.base_url, "bypassing environment proxy for upstream");
        builder.no_proxy()
    } else {
        builder
    }
}

/// Client for single-document calls: bounded by the configured request timeout.
pub fn client_for_upstream(cfg: &UpstreamConfig) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = cfg.request_timeout() {
        builder = builder.timeout(timeout);
    }
    maybe_disable_proxy(builder, cfg).build()
}

/// Client for event streams: no whole-request timeout, the relay bounds idle time per chunk.
pub fn streaming_client_for_upstream(
    cfg: &UpstreamConfig,
) -> Result<reqwest::Client, reqwest::Error> {
    maybe_disable_proxy(reqwest::Client::builder(), cfg).build()
}
