use std::{env, path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use app::{config::load_config, MonitorView};
use market::{ClientConfig, HttpMarketplace, HttpPool, RoomWs, Runner, SessionStore};
use market_core::{
    metrics::Metrics,
    model::{Session, UserProfile, UserRole},
    ports::AuthApi,
    view::ViewConfig,
};
use prometheus::Registry;
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn json_str<'a>(obj: &'a serde_json::Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(|v| v.as_str())
}

fn json_u64(obj: &serde_json::Map<String, Value>, key: &str) -> Option<u64> {
    obj.get(key).and_then(|v| v.as_u64())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config_arg = env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());
    let config_path = PathBuf::from(config_arg);

    let cfg: Value = load_config(&config_path).await?;

    let mut client_cfg = ClientConfig::default();
    if let Some(http_cfg) = cfg.get("client_config").and_then(|v| v.as_object()) {
        if let Some(base_url) = json_str(http_cfg, "base_url") {
            client_cfg.http.base_url = base_url.to_string();
        }
        if let Some(ws_url) = json_str(http_cfg, "ws_url") {
            client_cfg.realtime.ws_url = ws_url.to_string();
        }
        if let Some(max_conn) = json_u64(http_cfg, "max_connections") {
            client_cfg.http.max_connections = max_conn as usize;
        }
        if let Some(timeout_ms) = json_u64(http_cfg, "timeout_ms") {
            client_cfg.http.timeout_ms = timeout_ms;
        }
        if let Some(interval) = json_u64(http_cfg, "balance_interval_ms") {
            client_cfg.poll.balance_interval_ms = interval;
        }
    }

    let registry = Arc::new(Registry::new());

    let metrics_registry = Arc::clone(&registry);
    tokio::spawn(async move {
        use prometheus::{Encoder, TextEncoder};
        use warp::Filter;

        let metrics_route = warp::path!("metrics").map(move || {
            let encoder = TextEncoder::new();
            let metric_families = metrics_registry.gather();
            let mut buffer = vec![];
            encoder.encode(&metric_families, &mut buffer).unwrap();
            warp::reply::with_header(
                String::from_utf8(buffer).unwrap(),
                "content-type",
                "text/plain; version=0.0.4",
            )
        });

        info!("Prometheus metrics server listening on http://0.0.0.0:9090/metrics");
        warp::serve(metrics_route).run(([0, 0, 0, 0], 9090)).await;
    });

    let metrics = Metrics::new(registry.as_ref());
    let session = SessionStore::new();
    let pool = Arc::new(
        HttpPool::new(&client_cfg, registry.as_ref(), session.clone())
            .context("create http pool")?,
    );
    let api = Arc::new(HttpMarketplace::new(pool, session.clone()));

    // prefer a stored session token; fall back to credential sign-in
    if let Some(stored) = cfg.get("client_session").and_then(|v| v.as_object()) {
        let token = json_str(stored, "token")
            .ok_or_else(|| anyhow!("missing client_session.token"))?
            .to_string();
        let user: UserProfile = stored
            .get("profile")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .context("parse client_session.profile")?
            .unwrap_or(UserProfile {
                id: json_str(stored, "user_id").unwrap_or_default().to_string(),
                username: json_str(stored, "username").unwrap_or_default().to_string(),
                role: UserRole::User,
                is_active: true,
            });
        session.install(Session { token, user });
        info!("using stored session token");
    } else if let Some(creds) = cfg.get("credentials").and_then(|v| v.as_object()) {
        let username =
            json_str(creds, "username").ok_or_else(|| anyhow!("missing credentials.username"))?;
        let password =
            json_str(creds, "password").ok_or_else(|| anyhow!("missing credentials.password"))?;
        let signed_in = api.login(username, password).await.context("sign in")?;
        info!(user = %signed_in.user.username, "signed in");
    } else {
        return Err(anyhow!(
            "config needs either client_session.token or credentials"
        ));
    }

    let stream = Arc::new(RoomWs::new(&client_cfg.realtime).context("create room stream")?);
    let runner = Runner::new(
        client_cfg,
        api.clone(),
        stream.clone(),
        session.clone(),
        metrics,
    );

    let monitor_cfg = cfg
        .get("monitor")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));
    let result = runner.run::<MonitorView>(ViewConfig::new(monitor_cfg)).await;

    stream.close().await.ok();
    result
}
