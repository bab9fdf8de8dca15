use crate::{IdSpace, Settings};
use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 5000;

/// Run one node of a Chord ring
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Config {
    /// Port to listen on
    pub port: Option<u16>,

    /// Address to listen on. Peers dial it and the node identifier is derived
    /// from it, so it must be a concrete address they can reach (not 0.0.0.0)
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST), value_parser = reachable_host)]
    pub host: IpAddr,

    /// Existing node to join through, as ip:port
    #[arg(short, long)]
    pub join: Option<SocketAddr>,

    /// Bits per identifier (m)
    #[arg(short, long, default_value_t = crate::id::DEFAULT_BITS,
          value_parser = clap::value_parser!(u32).range(1..=64))]
    pub bits: u32,

    /// Milliseconds between stabilization rounds
    #[arg(long, default_value = "5000")]
    pub stabilize_interval_ms: u64,

    /// How long to wait for a peer before presuming it dead
    #[arg(long, default_value = "3000")]
    pub rpc_timeout_ms: u64,

    /// Give up on lookups that take more hops than this
    #[arg(long, default_value = "64")]
    pub max_lookup_hops: usize,
}

impl Config {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port.unwrap_or(DEFAULT_PORT))
    }

    pub fn settings(&self) -> Settings {
        Settings {
            space: IdSpace::new(self.bits),
            stabilize_interval: Duration::from_millis(self.stabilize_interval_ms),
            rpc_timeout: Duration::from_millis(self.rpc_timeout_ms),
            max_lookup_hops: self.max_lookup_hops,
        }
    }
}

fn reachable_host(s: &str) -> Result<IpAddr, String> {
    let host: IpAddr = s.parse().map_err(|e| format!("{e}"))?;
    if host.is_unspecified() {
        return Err(format!("{host} is not an address peers can dial"));
    }
    Ok(host)
}
