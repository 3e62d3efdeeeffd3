use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use clap::Parser;
use clap_derive::Parser;
use subserver::link::connector::MasterConnector;
use subserver::link::master_link::{MasterLinkHandle, MasterLinkState};
use subserver::messaging::codes::MasterEventCode;
use subserver::messaging::session::TransportSession;
use subserver::node::node_config::SubServerConfig;
use subserver::node::node_identity::SubServerType;
use subserver::node::worker_node::WorkerNode;
use tokio::time::sleep;
use tracing::{info, Level};

#[derive(Parser)]
struct Args {
    master_address: String,
    public_ip_address: String,

    #[clap(long)]
    tcp_port: Option<u16>,

    #[clap(long)]
    udp_port: Option<u16>,

    /// number of connection attempts the simulated master refuses before accepting one
    #[clap(long, default_value_t = 2)]
    refusals: usize,

    #[clap(long, default_value_t = 1)]
    retry_seconds: u64,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    #[clap(long, default_value_t = false)]
    very_verbose: bool,
}

/// Stands in for the peer transport, simulating a master that is not up yet
struct SimulatedConnector {
    remaining_refusals: AtomicUsize,
}

impl MasterConnector for SimulatedConnector {
    fn connect_to_server(&self, endpoint: SocketAddr, link: MasterLinkHandle) -> bool {
        let refuse = self.remaining_refusals
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();

        tokio::spawn(async move {
            sleep(Duration::from_millis(200)).await;
            if refuse {
                link.on_connection_failed(10, "connection refused");
            }
            else {
                link.on_connection_established(Arc::new(LoggingSession { remote_addr: endpoint }));
            }
        });
        true
    }
}

#[derive(Debug)]
struct LoggingSession {
    remote_addr: SocketAddr,
}

impl TransportSession for LoggingSession {
    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    fn send_request(&self, code: u8, parameters: Bytes) -> anyhow::Result<()> {
        info!("-> request {} to {}: {} bytes", code, self.remote_addr, parameters.len());
        Ok(())
    }

    fn send_event(&self, code: u8, parameters: Bytes) -> anyhow::Result<()> {
        info!("-> event {} to {}: {} bytes", code, self.remote_addr, parameters.len());
        Ok(())
    }

    fn send_response(&self, code: u8, return_code: i16, _debug_message: Option<&str>, parameters: Bytes) -> anyhow::Result<()> {
        info!("-> response {} ({}) to {}: {} bytes", code, return_code, self.remote_addr, parameters.len());
        Ok(())
    }

    fn disconnect(&self) {
        info!("disconnecting from {}", self.remote_addr);
    }
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match (args.verbose, args.very_verbose) {
        (_, true) => Level::TRACE,
        (true, _) => Level::DEBUG,
        (false, false) => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let mut config = SubServerConfig::new(args.master_address.parse()?);
    config.application_name = "ChatLogin".to_string();
    config.public_ip_address = args.public_ip_address.parse()?;
    config.gaming_tcp_port = args.tcp_port;
    config.gaming_udp_port = args.udp_port;
    config.connect_retry_interval = Duration::from_secs(args.retry_seconds);

    let connector = Arc::new(SimulatedConnector {
        remaining_refusals: AtomicUsize::new(args.refusals),
    });

    let node = WorkerNode::new(config, SubServerType::CHAT | SubServerType::LOGIN, connector)?;
    node.start().await?;

    let mut status = node.master_link().subscribe();
    status.wait_for(|s| s.state == MasterLinkState::Connected).await?;
    info!("connected after {} attempts", node.master_link().status().num_attempts);

    node.send_event_to_master(MasterEventCode(1), Bytes::from_static(b"hello"))?;

    tokio::signal::ctrl_c().await?;
    node.stop().await;
    Ok(())
}
