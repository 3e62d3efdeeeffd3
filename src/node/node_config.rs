use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::bail;

#[derive(Debug, Clone)]
pub struct SubServerConfig {
    pub application_name: String,

    /// the master node's endpoint for sub-server connections
    pub master_addr: SocketAddr,

    /// the address under which game clients reach this sub-server, announced to the master
    pub public_ip_address: IpAddr,
    pub gaming_tcp_port: Option<u16>,
    pub gaming_udp_port: Option<u16>,

    /// Fixed delay between a failed or lost master connection and the next connection attempt.
    ///  There is no backoff: retries continue at this interval for as long as the master is
    ///  unreachable.
    pub connect_retry_interval: Duration,

    /// Whether other sub-servers may connect to this node at all. Which of them are actually
    ///  accepted is decided per node type.
    pub accepts_sub_server_connections: bool,
}

impl SubServerConfig {
    pub fn new(master_addr: SocketAddr) -> SubServerConfig {
        SubServerConfig {
            application_name: "SubServer".to_string(),
            master_addr,
            public_ip_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            gaming_tcp_port: None,
            gaming_udp_port: None,
            connect_retry_interval: Duration::from_secs(5),
            accepts_sub_server_connections: false,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.connect_retry_interval.is_zero() {
            bail!("connect retry interval must be greater than zero");
        }
        if self.public_ip_address.is_unspecified() {
            bail!("public ip address {} can not be announced to clients", self.public_ip_address);
        }
        if self.master_addr.port() == 0 {
            bail!("master address {} has no port", self.master_addr);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn config() -> SubServerConfig {
        SubServerConfig::new("127.0.0.1:4520".parse().unwrap())
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(config().validate().is_ok());
    }

    #[rstest]
    #[case::zero_retry(|c: &mut SubServerConfig| c.connect_retry_interval = Duration::ZERO)]
    #[case::unspecified_v4(|c: &mut SubServerConfig| c.public_ip_address = "0.0.0.0".parse().unwrap())]
    #[case::unspecified_v6(|c: &mut SubServerConfig| c.public_ip_address = "::".parse().unwrap())]
    #[case::master_without_port(|c: &mut SubServerConfig| c.master_addr = "10.0.0.1:0".parse().unwrap())]
    fn test_invalid(#[case] modify: fn(&mut SubServerConfig)) {
        let mut config = config();
        modify(&mut config);
        assert!(config.validate().is_err());
    }
}
