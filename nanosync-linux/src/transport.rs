//! The tagged transport over the concrete socket backends: UDP/IPv4,
//! UDP/IPv6 and raw Ethernet. The engine never sees which one is active; it
//! only handles opaque [`TransportAddress`]es.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};

use nanosync::{config::TransportAddress, time::Time};
use timestamped_socket::{
    interface::InterfaceName,
    networkaddress::EthernetAddress,
    socket::{InterfaceTimestampMode, Open, Socket, Timestamp},
};

use crate::socket::{
    ipv4_primary_group, open_ethernet_socket, open_ipv4_event_socket, open_ipv4_general_socket,
    open_ipv6_event_socket, open_ipv6_general_socket, rejoin_ipv4_groups, EVENT_PORT,
    GENERAL_PORT, IPV6_PRIMARY_MULTICAST,
};

/// Which address family the port runs over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// PTP over UDP over IPv4
    #[default]
    Ipv4,
    /// PTP over UDP over IPv6
    Ipv6,
    /// PTP directly over IEEE 802.3 frames
    Ethernet,
}

/// A packet delivered by one of the sockets
#[derive(Debug)]
pub struct RecvData {
    /// Number of payload bytes
    pub bytes_read: usize,
    /// The sender in engine representation
    pub source: TransportAddress,
    /// The sender's IP, when the backend has one, for the ACL
    pub source_ip: Option<IpAddr>,
    /// The capture timestamp, present on timestamped (event) sockets
    pub timestamp: Option<Time>,
}

fn timestamp_to_time(ts: Timestamp) -> Time {
    Time::from_fixed_nanos(ts.seconds as i128 * 1_000_000_000i128 + ts.nanos as i128)
}

/// One socket of the port, tagged by backend
pub enum PtpSocket {
    Udp4(Socket<SocketAddrV4, Open>),
    Udp6(Socket<SocketAddrV6, Open>),
    Ethernet(Socket<EthernetAddress, Open>),
}

impl PtpSocket {
    /// Wait for a packet
    pub async fn recv(&mut self, buffer: &mut [u8]) -> std::io::Result<RecvData> {
        match self {
            PtpSocket::Udp4(socket) => {
                let result = socket.recv(buffer).await?;
                Ok(RecvData {
                    bytes_read: result.bytes_read,
                    source: TransportAddress::from_ipv4(result.remote_addr.ip().octets()),
                    source_ip: Some(IpAddr::V4(*result.remote_addr.ip())),
                    timestamp: result.timestamp.map(timestamp_to_time),
                })
            }
            PtpSocket::Udp6(socket) => {
                let result = socket.recv(buffer).await?;
                Ok(RecvData {
                    bytes_read: result.bytes_read,
                    source: TransportAddress::from_ipv6(result.remote_addr.ip().octets()),
                    source_ip: Some(IpAddr::V6(*result.remote_addr.ip())),
                    timestamp: result.timestamp.map(timestamp_to_time),
                })
            }
            PtpSocket::Ethernet(socket) => {
                // Raw Ethernet operation is multicast only; peers are told
                // apart by their port identities, not their MACs
                let result = socket.recv(buffer).await?;
                Ok(RecvData {
                    bytes_read: result.bytes_read,
                    source: TransportAddress::default(),
                    source_ip: None,
                    timestamp: result.timestamp.map(timestamp_to_time),
                })
            }
        }
    }

    /// Send a packet. `to` of `None` targets the domain's multicast group;
    /// `event` selects the UDP destination port. Returns the transmit
    /// timestamp when the socket captures one.
    pub async fn send_to(
        &mut self,
        data: &[u8],
        to: Option<TransportAddress>,
        event: bool,
        domain: u8,
    ) -> std::io::Result<Option<Time>> {
        let port = if event { EVENT_PORT } else { GENERAL_PORT };

        match self {
            PtpSocket::Udp4(socket) => {
                let ip = match to {
                    Some(address) => {
                        let octets: [u8; 4] = address
                            .as_bytes()
                            .try_into()
                            .map_err(|_| std::io::ErrorKind::InvalidInput)?;
                        Ipv4Addr::from(octets)
                    }
                    None => ipv4_primary_group(domain),
                };
                let timestamp = socket.send_to(data, SocketAddrV4::new(ip, port)).await?;
                Ok(timestamp.map(timestamp_to_time))
            }
            PtpSocket::Udp6(socket) => {
                let ip = match to {
                    Some(address) => {
                        let octets: [u8; 16] = address
                            .as_bytes()
                            .try_into()
                            .map_err(|_| std::io::ErrorKind::InvalidInput)?;
                        Ipv6Addr::from(octets)
                    }
                    None => IPV6_PRIMARY_MULTICAST,
                };
                let timestamp = socket
                    .send_to(data, SocketAddrV6::new(ip, port, 0, 0))
                    .await?;
                Ok(timestamp.map(timestamp_to_time))
            }
            PtpSocket::Ethernet(socket) => {
                // Multicast only, see above
                use crate::socket::PtpTargetAddress;
                let timestamp = socket
                    .send_to(data, EthernetAddress::PRIMARY_EVENT)
                    .await?;
                Ok(timestamp.map(timestamp_to_time))
            }
        }
    }
}

/// The event and general channels of one port
pub struct PtpTransport {
    /// The timestamped event channel (UDP port 319 or the event frames)
    pub event: PtpSocket,
    /// The general channel (UDP port 320)
    pub general: PtpSocket,
    interface: InterfaceName,
    mode: NetworkMode,
    domain: u8,
}

impl PtpTransport {
    /// Open both channels on the interface. Requesting hardware
    /// timestamping on hardware that cannot do it fails here, at
    /// initialization.
    pub fn open(
        mode: NetworkMode,
        interface: InterfaceName,
        timestamping: InterfaceTimestampMode,
        bind_phc: Option<u32>,
        domain: u8,
    ) -> std::io::Result<Self> {
        let (event, general) = match mode {
            NetworkMode::Ipv4 => (
                PtpSocket::Udp4(open_ipv4_event_socket(
                    interface,
                    timestamping,
                    bind_phc,
                    domain,
                )?),
                PtpSocket::Udp4(open_ipv4_general_socket(interface, domain)?),
            ),
            NetworkMode::Ipv6 => (
                PtpSocket::Udp6(open_ipv6_event_socket(interface, timestamping, bind_phc)?),
                PtpSocket::Udp6(open_ipv6_general_socket(interface)?),
            ),
            NetworkMode::Ethernet => {
                // A single socket pair is opened; the general channel shares
                // the EtherType but needs its own socket for reception
                (
                    PtpSocket::Ethernet(open_ethernet_socket(
                        interface,
                        timestamping,
                        bind_phc,
                    )?),
                    PtpSocket::Ethernet(open_ethernet_socket(
                        interface,
                        InterfaceTimestampMode::None,
                        None,
                    )?),
                )
            }
        };

        Ok(Self {
            event,
            general,
            interface,
            mode,
            domain,
        })
    }

    /// The domain this transport serves
    pub fn domain(&self) -> u8 {
        self.domain
    }

    /// Rejoin multicast groups after a link change or on the master's
    /// periodic refresh.
    pub fn refresh(&self) -> std::io::Result<()> {
        match (&self.mode, &self.event, &self.general) {
            (NetworkMode::Ipv4, PtpSocket::Udp4(event), PtpSocket::Udp4(general)) => {
                rejoin_ipv4_groups(event, self.interface, self.domain)?;
                rejoin_ipv4_groups(general, self.interface, self.domain)?;
            }
            (NetworkMode::Ipv6, PtpSocket::Udp6(event), PtpSocket::Udp6(general)) => {
                let primary = SocketAddrV6::new(IPV6_PRIMARY_MULTICAST, 0, 0, 0);
                let pdelay =
                    SocketAddrV6::new(crate::socket::IPV6_PDELAY_MULTICAST, 0, 0, 0);
                event.join_multicast(primary, self.interface)?;
                event.join_multicast(pdelay, self.interface)?;
                general.join_multicast(primary, self.interface)?;
                general.join_multicast(pdelay, self.interface)?;
            }
            (NetworkMode::Ethernet, PtpSocket::Ethernet(event), _) => {
                use crate::socket::PtpTargetAddress;
                event.join_multicast(EthernetAddress::PRIMARY_EVENT, self.interface)?;
                event.join_multicast(EthernetAddress::PDELAY_EVENT, self.interface)?;
            }
            _ => {}
        }
        Ok(())
    }
}
