/// An opaque transport-layer address of a remote node.
///
/// The engine never interprets these bytes; they come from the transport on
/// receive and are handed back verbatim on unicast sends, so the same engine
/// serves UDP/IPv4, UDP/IPv6 and raw Ethernet backends. They double as the
/// secondary key of the unicast grant table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransportAddress {
    len: u8,
    bytes: [u8; 16],
}

impl TransportAddress {
    /// An address from raw octets. Anything longer than 16 octets is
    /// truncated; backends do not produce such addresses.
    pub fn from_bytes(src: &[u8]) -> Self {
        let len = src.len().min(16);
        let mut bytes = [0; 16];
        bytes[..len].copy_from_slice(&src[..len]);
        Self {
            len: len as u8,
            bytes,
        }
    }

    /// An IPv4 address
    pub fn from_ipv4(octets: [u8; 4]) -> Self {
        Self::from_bytes(&octets)
    }

    /// An IPv6 address
    pub fn from_ipv6(octets: [u8; 16]) -> Self {
        Self::from_bytes(&octets)
    }

    /// A MAC address
    pub fn from_mac(octets: [u8; 6]) -> Self {
        Self::from_bytes(&octets)
    }

    /// The address octets
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Whether any address has been recorded
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_bytes() {
        let addr = TransportAddress::from_ipv4([192, 0, 2, 1]);
        assert_eq!(addr.as_bytes(), &[192, 0, 2, 1]);
        assert!(!addr.is_empty());
        assert!(TransportAddress::default().is_empty());
    }
}
