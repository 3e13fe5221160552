//! LAN printer discovery by /24 port sweep
//!
//! Probes every host on the local /24 for an open printer port. Fan-out is
//! bounded so file-descriptor pressure stays predictable on small POS boxes.

use crate::error::{PrintError, PrintResult};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info, instrument};

/// Per-probe connect timeout
const PROBE_TIMEOUT: Duration = Duration::from_millis(180);

/// Concurrent probes per batch
const PROBE_BATCH: usize = 32;

/// Result of a subnet sweep
#[derive(Debug, Clone)]
pub struct ScanResult {
    /// The `/24` prefix that was scanned, trailing dot included ("192.168.1.")
    pub prefix: String,
    /// Addresses that accepted a TCP connect, in ascending order
    pub hits: Vec<String>,
}

/// Scan the local /24 subnet for hosts accepting TCP on `port`
#[instrument]
pub async fn scan_port(port: u16) -> PrintResult<ScanResult> {
    let local = pick_scan_address(&local_ipv4_addresses())?;
    let octets = local.octets();
    let prefix = format!("{}.{}.{}.", octets[0], octets[1], octets[2]);

    debug!(%local, prefix, port, "Starting subnet sweep");

    let mut hits = Vec::new();
    let targets: Vec<u8> = (1..=254).collect();

    for batch in targets.chunks(PROBE_BATCH) {
        let probes = batch.iter().map(|&host| {
            let ip = format!("{prefix}{host}");
            async move {
                let addr: SocketAddr = match format!("{ip}:{port}").parse() {
                    Ok(a) => a,
                    Err(_) => return None,
                };
                match tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(addr)).await {
                    Ok(Ok(stream)) => {
                        drop(stream);
                        Some(ip)
                    }
                    _ => None,
                }
            }
        });

        // Every probe in the batch resolves before the next batch starts
        for hit in futures::future::join_all(probes).await.into_iter().flatten() {
            hits.push(hit);
        }
    }

    info!(prefix, port, hits = hits.len(), "Subnet sweep finished");
    Ok(ScanResult { prefix, hits })
}

/// Non-loopback IPv4 addresses of this host
fn local_ipv4_addresses() -> Vec<Ipv4Addr> {
    let interfaces = match local_ip_address::list_afinet_netifas() {
        Ok(list) => list,
        Err(_) => return Vec::new(),
    };

    interfaces
        .into_iter()
        .filter_map(|(_, addr)| match addr {
            IpAddr::V4(v4) if !v4.is_loopback() => Some(v4),
            _ => None,
        })
        .collect()
}

/// Prefer the first RFC 1918 address; fall back to the first IPv4
fn pick_scan_address(candidates: &[Ipv4Addr]) -> PrintResult<Ipv4Addr> {
    candidates
        .iter()
        .find(|ip| ip.is_private())
        .or_else(|| candidates.first())
        .copied()
        .ok_or(PrintError::NoLocalIpv4)
}
