use crate::{config::ClientConfig, session::SessionStore};
use anyhow::{Context, Result};
use flate2::read::{GzDecoder, ZlibDecoder};
use prometheus::{HistogramVec, IntCounterVec, IntGaugeVec, Registry};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING},
    Client, ClientBuilder,
};
use serde_json::Value;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;
use url::Url;

#[derive(Clone)]
pub struct HttpPool {
    client: Client,
    base: Url,
    session: SessionStore,
    metrics: Arc<HttpMetrics>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub json: Option<Value>,
    pub text: Option<String>,
    pub bytes: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl HttpPool {
    pub fn new(cfg: &ClientConfig, registry: &Registry, session: SessionStore) -> Result<Self> {
        let http = &cfg.http;
        let client = ClientBuilder::new()
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .pool_idle_timeout(None)
            .pool_max_idle_per_host(http.max_connections)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .connect_timeout(Duration::from_millis(http.timeout_ms))
            .timeout(Duration::from_millis(http.timeout_ms))
            .build()
            .context("build reqwest client")?;
        let base = Url::parse(&http.base_url).context("parse base url")?;
        let metrics = Arc::new(HttpMetrics::new(registry));
        Ok(Self {
            client,
            base,
            session,
            metrics,
        })
    }

    fn build_url(&self, path: &str) -> Result<Url> {
        if path.starts_with('h') {
            return Url::parse(path).context("parse absolute url");
        }
        // base paths carry the /api prefix; joining with a leading slash
        // would drop it
        let relative = path.trim_start_matches('/');
        let mut base = self.base.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        base.join(relative).context("join url")
    }

    /// Default headers plus the bearer token when a session is present.
    fn default_headers(&self) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        h.insert(
            ACCEPT_ENCODING,
            HeaderValue::from_static("gzip, deflate, br"),
        );
        h.extend(self.session.bearer_headers());
        h
    }

    pub async fn get(&self, path: &str, headers: Option<HeaderMap>) -> Result<HttpResponse> {
        let url = self.build_url(path)?;
        let mut h = self.default_headers();
        if let Some(extra) = headers {
            h.extend(extra);
        }
        self.do_req("GET", path, self.client.get(url).headers(h), None)
            .await
    }

    pub async fn delete(
        &self,
        path: &str,
        headers: Option<HeaderMap>,
        body: Option<&Value>,
    ) -> Result<HttpResponse> {
        let url = self.build_url(path)?;
        let mut h = self.default_headers();
        if let Some(extra) = headers {
            h.extend(extra);
        }
        self.do_req("DELETE", path, self.client.delete(url).headers(h), body)
            .await
    }

    pub async fn post(
        &self,
        path: &str,
        headers: Option<HeaderMap>,
        body: Option<&Value>,
    ) -> Result<HttpResponse> {
        let url = self.build_url(path)?;
        let mut h = self.default_headers();
        if let Some(extra) = headers {
            h.extend(extra);
        }
        self.do_req("POST", path, self.client.post(url).headers(h), body)
            .await
    }

    pub async fn put(
        &self,
        path: &str,
        headers: Option<HeaderMap>,
        body: Option<&Value>,
    ) -> Result<HttpResponse> {
        let url = self.build_url(path)?;
        let mut h = self.default_headers();
        if let Some(extra) = headers {
            h.extend(extra);
        }
        self.do_req("PUT", path, self.client.put(url).headers(h), body)
            .await
    }

    pub async fn patch(
        &self,
        path: &str,
        headers: Option<HeaderMap>,
        body: Option<&Value>,
    ) -> Result<HttpResponse> {
        let url = self.build_url(path)?;
        let mut h = self.default_headers();
        if let Some(extra) = headers {
            h.extend(extra);
        }
        self.do_req("PATCH", path, self.client.patch(url).headers(h), body)
            .await
    }

    async fn do_req(
        &self,
        method: &str,
        path: &str,
        builder: reqwest::RequestBuilder,
        body: Option<&Value>,
    ) -> Result<HttpResponse> {
        let start = Instant::now();
        self.metrics.inflight.with_label_values(&[method]).inc();
        self.metrics
            .req_total
            .with_label_values(&[method, path])
            .inc();
        let resp = match body {
            Some(v) => builder.json(v).send().await,
            None => builder.send().await,
        };
        let resp = match resp {
            Ok(r) => r,
            Err(e) => {
                self.metrics.inflight.with_label_values(&[method]).dec();
                self.metrics
                    .fail_total
                    .with_label_values(&[method, path])
                    .inc();
                return Err(e).context("http send");
            }
        };
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let body_bytes = resp.bytes().await.context("read body bytes")?;
        let dur = start.elapsed().as_secs_f64();
        self.metrics
            .latency
            .with_label_values(&[method, path])
            .observe(dur);
        self.metrics.inflight.with_label_values(&[method]).dec();
        if status >= 400 {
            self.metrics
                .fail_total
                .with_label_values(&[method, path])
                .inc();
        }
        // Global session teardown from any call site; the caller still
        // receives the 401 response and treats it as a normal failure.
        if status == 401 {
            self.session.on_unauthorized();
        }
        let dur_ms = (dur * 1000.0) as u64;
        tracing::debug!(target: "http", method=%method, path=%path, status=%status, latency_ms=%dur_ms, bytes=%body_bytes.len(), "HTTP request completed");
        Ok(Self::parse_body(status, &headers, &body_bytes))
    }

    fn parse_body(status: u16, headers: &HeaderMap, bytes: &bytes::Bytes) -> HttpResponse {
        let raw = bytes.to_vec();
        let mut json = serde_json::from_slice::<Value>(&raw).ok();
        let mut text = None;

        // reqwest normally decompresses; keep a manual fallback for
        // servers that mislabel content-encoding
        if json.is_none() {
            if let Some(enc) = headers
                .get("content-encoding")
                .and_then(|v| v.to_str().ok())
            {
                let decoded = if enc.contains("gzip") {
                    let mut d = GzDecoder::new(raw.as_slice());
                    let mut out = Vec::new();
                    d.read_to_end(&mut out).ok().map(|_| out)
                } else if enc.contains("deflate") {
                    let mut d = ZlibDecoder::new(raw.as_slice());
                    let mut out = Vec::new();
                    d.read_to_end(&mut out).ok().map(|_| out)
                } else {
                    None
                };
                if let Some(out) = decoded {
                    if let Ok(v) = serde_json::from_slice::<Value>(&out) {
                        json = Some(v);
                    } else {
                        text = Some(String::from_utf8_lossy(&out).to_string());
                    }
                    return HttpResponse {
                        status,
                        json,
                        text,
                        bytes: out,
                    };
                }
            }
        }
        if json.is_none() && text.is_none() && !raw.is_empty() {
            text = Some(String::from_utf8_lossy(&raw).to_string());
        }
        HttpResponse {
            status,
            json,
            text,
            bytes: raw,
        }
    }
}

#[derive(Clone)]
struct HttpMetrics {
    req_total: IntCounterVec,
    fail_total: IntCounterVec,
    inflight: IntGaugeVec,
    latency: HistogramVec,
}

impl HttpMetrics {
    fn new(registry: &Registry) -> Self {
        let req_total = IntCounterVec::new(
            prometheus::Opts::new("http_requests_total", "HTTP requests total"),
            &["method", "path"],
        )
        .unwrap();
        let fail_total = IntCounterVec::new(
            prometheus::Opts::new("http_failures_total", "HTTP failures total"),
            &["method", "path"],
        )
        .unwrap();
        let inflight = IntGaugeVec::new(
            prometheus::Opts::new("http_inflight", "HTTP inflight requests"),
            &["method"],
        )
        .unwrap();
        let latency = HistogramVec::new(
            prometheus::HistogramOpts::new("http_latency_seconds", "HTTP request latency seconds")
                .buckets(vec![
                    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ]),
            &["method", "path"],
        )
        .unwrap();
        registry.register(Box::new(req_total.clone())).ok();
        registry.register(Box::new(fail_total.clone())).ok();
        registry.register(Box::new(inflight.clone())).ok();
        registry.register(Box::new(latency.clone())).ok();
        Self {
            req_total,
            fail_total,
            inflight,
            latency,
        }
    }
}
