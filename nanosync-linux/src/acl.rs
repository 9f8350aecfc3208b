//! A small prefix based access control list for inbound datagrams.
//!
//! Deny verdicts count and drop the packet before the engine ever sees it.

use std::net::IpAddr;
use std::str::FromStr;

use serde::Deserialize;

/// Whether permit rules run before deny rules or the other way around
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AclOrder {
    /// Deny wins on overlap
    #[default]
    PermitDeny,
    /// Permit wins on overlap
    DenyPermit,
}

/// An address prefix like `192.0.2.0/24` or `2001:db8::/32`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prefix {
    address: IpAddr,
    length: u8,
}

impl Prefix {
    fn matches(&self, candidate: IpAddr) -> bool {
        match (self.address, candidate) {
            (IpAddr::V4(prefix), IpAddr::V4(candidate)) => {
                let bits = 32 - self.length.min(32) as u32;
                let mask = u32::MAX.checked_shl(bits).unwrap_or(0);
                (u32::from(prefix) & mask) == (u32::from(candidate) & mask)
            }
            (IpAddr::V6(prefix), IpAddr::V6(candidate)) => {
                let bits = 128 - self.length.min(128) as u32;
                let mask = u128::MAX.checked_shl(bits).unwrap_or(0);
                (u128::from(prefix) & mask) == (u128::from(candidate) & mask)
            }
            _ => false,
        }
    }
}

impl FromStr for Prefix {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (address, length) = match input.split_once('/') {
            Some((address, length)) => {
                let length = length
                    .parse::<u8>()
                    .map_err(|e| format!("invalid prefix length in {input:?}: {e}"))?;
                (address, Some(length))
            }
            None => (input, None),
        };

        let address = address
            .parse::<IpAddr>()
            .map_err(|e| format!("invalid address in {input:?}: {e}"))?;
        let full = match address {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        let length = length.unwrap_or(full);
        if length > full {
            return Err(format!("prefix length {length} too long in {input:?}"));
        }

        Ok(Prefix { address, length })
    }
}

/// The compiled access control list
#[derive(Debug, Clone, Default)]
pub struct Acl {
    permit: Vec<Prefix>,
    deny: Vec<Prefix>,
    order: AclOrder,
}

impl Acl {
    /// Compile an ACL from prefix strings
    pub fn new(
        permit: &[String],
        deny: &[String],
        order: AclOrder,
    ) -> Result<Self, String> {
        Ok(Self {
            permit: permit
                .iter()
                .map(|p| p.parse())
                .collect::<Result<_, _>>()?,
            deny: deny.iter().map(|p| p.parse()).collect::<Result<_, _>>()?,
            order,
        })
    }

    /// Whether any rules are configured at all
    pub fn is_empty(&self) -> bool {
        self.permit.is_empty() && self.deny.is_empty()
    }

    /// Evaluate a source address
    pub fn permits(&self, source: IpAddr) -> bool {
        if self.is_empty() {
            return true;
        }

        let permitted = self.permit.iter().any(|p| p.matches(source));
        let denied = self.deny.iter().any(|p| p.matches(source));

        match self.order {
            AclOrder::PermitDeny => {
                if denied {
                    false
                } else if self.permit.is_empty() {
                    true
                } else {
                    permitted
                }
            }
            AclOrder::DenyPermit => {
                if permitted {
                    true
                } else if denied {
                    false
                } else {
                    self.permit.is_empty()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acl(permit: &[&str], deny: &[&str], order: AclOrder) -> Acl {
        Acl::new(
            &permit.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            &deny.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            order,
        )
        .unwrap()
    }

    #[test]
    fn empty_acl_permits_everything() {
        let acl = Acl::default();
        assert!(acl.permits("192.0.2.1".parse().unwrap()));
    }

    #[test]
    fn deny_wins_in_permit_deny_order() {
        let acl = acl(&["192.0.2.0/24"], &["192.0.2.7/32"], AclOrder::PermitDeny);

        assert!(acl.permits("192.0.2.1".parse().unwrap()));
        assert!(!acl.permits("192.0.2.7".parse().unwrap()));
        assert!(!acl.permits("198.51.100.1".parse().unwrap()));
    }

    #[test]
    fn permit_wins_in_deny_permit_order() {
        let acl = acl(&["192.0.2.7/32"], &["192.0.2.0/24"], AclOrder::DenyPermit);

        assert!(acl.permits("192.0.2.7".parse().unwrap()));
        assert!(!acl.permits("192.0.2.1".parse().unwrap()));
    }

    #[test]
    fn ipv6_prefixes_match() {
        let acl = acl(&["2001:db8::/32"], &[], AclOrder::PermitDeny);

        assert!(acl.permits("2001:db8::1".parse().unwrap()));
        assert!(!acl.permits("2001:db9::1".parse().unwrap()));
    }

    #[test]
    fn zero_length_prefix_matches_all() {
        let acl = acl(&[], &["0.0.0.0/0"], AclOrder::PermitDeny);
        assert!(!acl.permits("203.0.113.5".parse().unwrap()));
    }
}
