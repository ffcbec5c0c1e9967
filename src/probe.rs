//! One complete probe run.

use tracing::info;

use crate::config::ProbeConfig;
use crate::dispatch::dispatch;
use crate::error::Result;
use crate::response::ProbeReport;
use crate::transport::session;

/// Connect, handshake, send one request, and collect the report.
///
/// Every failure ends the run; nothing is retried.
pub async fn run(config: &ProbeConfig) -> Result<ProbeReport> {
    let target = &config.target;
    let cfg = &config.handshake;

    info!(ip = %target.ip(), host = target.server_name(), port = target.port(), "probing");

    let conn = session::connect(target).await?;
    info!(peer = %conn.peer_addr(), "connection created");

    info!(mode = %cfg.hello_mode, "building handshake");
    let mut state = conn.build_handshake(cfg)?;
    if let Some(random) = cfg.client_random {
        state.override_client_random(random);
    }
    state.set_post_hello_delay(cfg.post_hello_delay);

    let channel = state.handshake().await?;
    let protocol = channel.protocol().clone();
    let handshake = channel.info().clone();

    info!(alpn = %protocol, path = target.path(), "sending http request");
    let response = dispatch(channel, target, &config.request).await?;

    Ok(ProbeReport {
        target: target.clone(),
        protocol,
        handshake,
        response,
    })
}
