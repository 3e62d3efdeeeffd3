use std::fmt::{Debug, Display, Formatter};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use anyhow::anyhow;
use bitflags::bitflags;
use bytes::{Buf, BufMut};
use uuid::Uuid;

bitflags! {
    /// The services a sub-server provides. A single process may provide several of them.
    #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
    pub struct SubServerType: u32 {
        const LOGIN  = 0b0000_0001;
        const CHAT   = 0b0000_0010;
        const REGION = 0b0000_0100;
        const WORLD  = 0b0000_1000;
    }
}

/// Identifies a sub-server process. It is generated once at startup, so a restarted process
///  registers with the master as a different sub-server even if it runs on the same address.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn random() -> NodeId {
        NodeId(Uuid::new_v4())
    }
}

impl Debug for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything the fleet needs to know about a sub-server: who it is, what it does, and where
///  game clients can reach it. Immutable once the node is constructed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeIdentity {
    pub id: NodeId,
    pub server_type: SubServerType,
    pub public_ip_address: IpAddr,
    pub gaming_tcp_port: Option<u16>,
    pub gaming_udp_port: Option<u16>,
}

const FLAG_HAS_TCP_PORT: u8 = 0b01;
const FLAG_HAS_UDP_PORT: u8 = 0b10;

impl NodeIdentity {
    /// Binary representation sent to the master when registering. All numbers are big endian:
    ///
    /// ```ascii
    /// 0:  node id (u128)
    /// 16: server type bits (u32)
    /// 20: ip version discriminator (u8, 4 or 6), followed by 4 or 16 bytes of address
    /// *:  port flags (u8): bit 0 TCP port present, bit 1 UDP port present
    /// *:  TCP port (u16) if present, then UDP port (u16) if present
    /// ```
    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u128(self.id.0.as_u128());
        buf.put_u32(self.server_type.bits());
        match self.public_ip_address {
            IpAddr::V4(ip) => {
                buf.put_u8(4);
                buf.put_u32(ip.to_bits());
            }
            IpAddr::V6(ip) => {
                buf.put_u8(6);
                buf.put_u128(ip.to_bits());
            }
        }

        let mut flags = 0;
        if self.gaming_tcp_port.is_some() {
            flags |= FLAG_HAS_TCP_PORT;
        }
        if self.gaming_udp_port.is_some() {
            flags |= FLAG_HAS_UDP_PORT;
        }
        buf.put_u8(flags);
        if let Some(port) = self.gaming_tcp_port {
            buf.put_u16(port);
        }
        if let Some(port) = self.gaming_udp_port {
            buf.put_u16(port);
        }
    }

    pub fn try_deser(buf: &mut impl Buf) -> anyhow::Result<NodeIdentity> {
        let id = NodeId(Uuid::from_u128(buf.try_get_u128()?));

        let raw_type = buf.try_get_u32()?;
        let server_type = SubServerType::from_bits(raw_type)
            .ok_or_else(|| anyhow!("invalid sub-server type bits: {:#x}", raw_type))?;

        let public_ip_address = match buf.try_get_u8()? {
            4 => IpAddr::V4(Ipv4Addr::from_bits(buf.try_get_u32()?)),
            6 => IpAddr::V6(Ipv6Addr::from_bits(buf.try_get_u128()?)),
            n => return Err(anyhow!("invalid ip address discriminator: {}", n)),
        };

        let flags = buf.try_get_u8()?;
        let gaming_tcp_port = if flags & FLAG_HAS_TCP_PORT != 0 {
            Some(buf.try_get_u16()?)
        }
        else {
            None
        };
        let gaming_udp_port = if flags & FLAG_HAS_UDP_PORT != 0 {
            Some(buf.try_get_u16()?)
        }
        else {
            None
        };

        Ok(NodeIdentity {
            id,
            server_type,
            public_ip_address,
            gaming_tcp_port,
            gaming_udp_port,
        })
    }
}
