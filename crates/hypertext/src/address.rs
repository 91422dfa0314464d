//! Textual rendering of raw peer addresses.
//!
//! [`MessageComplete`](crate::protocol::MessageComplete) carries the peer address as raw octets
//! so the event stays cheap; consumers that want the text form call [`format_address`].

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::protocol::AddressError;

/// Renders `raw` as the canonical textual form of an IPv4 (`ipv6 == false`) or IPv6 address.
///
/// # Errors
///
/// Returns [`AddressError::InvalidLength`] unless `raw` is exactly 4 bytes for IPv4 or exactly
/// 16 bytes for IPv6.
///
/// # Example
///
/// ```
/// use micro_hypertext::address::format_address;
///
/// assert_eq!(format_address(&[127, 0, 0, 1], false).unwrap(), "127.0.0.1");
/// assert!(format_address(&[127, 0, 0, 1], true).is_err());
/// ```
pub fn format_address(raw: &[u8], ipv6: bool) -> Result<String, AddressError> {
    Ok(parse_octets(raw, ipv6)?.to_string())
}

fn parse_octets(raw: &[u8], ipv6: bool) -> Result<IpAddr, AddressError> {
    if ipv6 {
        let octets: [u8; 16] = raw
            .try_into()
            .map_err(|_e| AddressError::InvalidLength { family: "IPv6", expected: 16, actual: raw.len() })?;
        Ok(IpAddr::V6(Ipv6Addr::from(octets)))
    } else {
        let octets: [u8; 4] = raw
            .try_into()
            .map_err(|_e| AddressError::InvalidLength { family: "IPv4", expected: 4, actual: raw.len() })?;
        Ok(IpAddr::V4(Ipv4Addr::from(octets)))
    }
}

/// Returns the raw octets of `addr` in the family of the listener that accepted it.
///
/// IPv4 peers of an IPv6 listener are reported in their IPv4-mapped IPv6 form.
pub(crate) fn peer_octets(addr: IpAddr, ipv6: bool) -> Vec<u8> {
    match (addr, ipv6) {
        (IpAddr::V4(v4), false) => v4.octets().to_vec(),
        (IpAddr::V4(v4), true) => v4.to_ipv6_mapped().octets().to_vec(),
        (IpAddr::V6(v6), false) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.octets().to_vec(),
            None => v6.octets().to_vec(),
        },
        (IpAddr::V6(v6), true) => v6.octets().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_re_parses_to_same_octets() {
        for raw in [[0, 0, 0, 0], [127, 0, 0, 1], [192, 168, 1, 254], [255, 255, 255, 255], [10, 0, 20, 3]] {
            let text = format_address(&raw, false).unwrap();
            let parsed: Ipv4Addr = text.parse().unwrap();
            assert_eq!(parsed.octets(), raw);
        }
    }

    #[test]
    fn ipv6_re_parses_to_same_octets() {
        let samples: [[u8; 16]; 4] = [
            [0; 16],
            [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1],
            [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x42],
            [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff, 192, 0, 2, 1],
        ];
        for raw in samples {
            let text = format_address(&raw, true).unwrap();
            let parsed: Ipv6Addr = text.parse().unwrap();
            assert_eq!(parsed.octets(), raw);
        }
    }

    #[test]
    fn canonical_text() {
        assert_eq!(format_address(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1], true).unwrap(), "::1");
        assert_eq!(format_address(&[192, 168, 0, 1], false).unwrap(), "192.168.0.1");
    }

    #[test]
    fn wrong_length_is_rejected() {
        for len in [0usize, 1, 3, 5, 15, 16, 17] {
            let raw = vec![1u8; len];
            let result = format_address(&raw, false);
            assert_eq!(
                result,
                Err(AddressError::InvalidLength { family: "IPv4", expected: 4, actual: len }),
            );
        }

        for len in [0usize, 4, 15, 17, 32] {
            let raw = vec![1u8; len];
            assert!(matches!(format_address(&raw, true), Err(AddressError::InvalidLength { family: "IPv6", .. })));
        }
    }

    #[test]
    fn peer_octets_follow_listener_family() {
        let v4: IpAddr = "10.1.2.3".parse().unwrap();
        assert_eq!(peer_octets(v4, false), vec![10, 1, 2, 3]);
        assert_eq!(peer_octets(v4, true).len(), 16);

        let mapped: IpAddr = "::ffff:10.1.2.3".parse().unwrap();
        assert_eq!(peer_octets(mapped, false), vec![10, 1, 2, 3]);
        assert_eq!(peer_octets(mapped, true).len(), 16);
    }
}
