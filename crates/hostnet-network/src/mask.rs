//! CIDR prefix arithmetic.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use hostnet_common::{HostnetError, HostnetResult};

/// Convert an IPv4 prefix length to its dotted-quad netmask.
///
/// ```
/// use hostnet_network::mask::prefix_to_mask;
///
/// assert_eq!(prefix_to_mask(22).unwrap().to_string(), "255.255.252.0");
/// ```
///
/// # Errors
///
/// Returns [`HostnetError::InvalidPrefix`] for prefixes above 32.
pub fn prefix_to_mask(prefix: u8) -> HostnetResult<Ipv4Addr> {
    if prefix > 32 {
        return Err(HostnetError::InvalidPrefix { prefix, max: 32 });
    }
    // Widened so that prefix 0 does not overflow the shift.
    let host_bits = (1u64 << (32 - u32::from(prefix))) - 1;
    let bits = 0xffff_ffff_u64 ^ host_bits;
    Ok(Ipv4Addr::from(u32::try_from(bits).unwrap_or(u32::MAX)))
}

/// Network address of `addr` under a prefix of length `prefix`.
///
/// # Errors
///
/// Returns [`HostnetError::InvalidPrefix`] when `prefix` exceeds the width of
/// the address family.
pub fn network_address(addr: IpAddr, prefix: u8) -> HostnetResult<IpAddr> {
    match addr {
        IpAddr::V4(v4) => {
            let mask = u32::from(prefix_to_mask(prefix)?);
            Ok(IpAddr::V4(Ipv4Addr::from(u32::from(v4) & mask)))
        }
        IpAddr::V6(v6) => {
            if prefix > 128 {
                return Err(HostnetError::InvalidPrefix { prefix, max: 128 });
            }
            let mask = if prefix == 0 {
                0
            } else {
                u128::MAX << (128 - u32::from(prefix))
            };
            Ok(IpAddr::V6(Ipv6Addr::from(u128::from(v6) & mask)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn canonical_masks() {
        let table = [
            (0, "0.0.0.0"),
            (1, "128.0.0.0"),
            (8, "255.0.0.0"),
            (16, "255.255.0.0"),
            (22, "255.255.252.0"),
            (24, "255.255.255.0"),
            (25, "255.255.255.128"),
            (30, "255.255.255.252"),
            (31, "255.255.255.254"),
            (32, "255.255.255.255"),
        ];
        for (prefix, mask) in table {
            assert_eq!(prefix_to_mask(prefix).unwrap().to_string(), mask, "/{prefix}");
        }
    }

    #[test]
    fn rejects_long_prefix() {
        assert!(matches!(
            prefix_to_mask(33),
            Err(HostnetError::InvalidPrefix { prefix: 33, max: 32 })
        ));
    }

    #[test]
    fn ipv4_network() {
        let addr: IpAddr = "10.0.3.17".parse().unwrap();
        assert_eq!(
            network_address(addr, 22).unwrap(),
            "10.0.0.0".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn ipv6_network() {
        let addr: IpAddr = "fe80::17ff:fe00:1234".parse().unwrap();
        assert_eq!(
            network_address(addr, 64).unwrap(),
            "fe80::".parse::<IpAddr>().unwrap()
        );
        assert!(network_address(addr, 129).is_err());
    }

    proptest! {
        #[test]
        fn mask_has_prefix_leading_ones(prefix in 0u8..=32) {
            let mask = u32::from(prefix_to_mask(prefix).unwrap());
            prop_assert_eq!(mask.leading_ones(), u32::from(prefix));
            prop_assert_eq!(mask.count_ones(), u32::from(prefix));
        }

        #[test]
        fn network_address_is_idempotent(raw in any::<u32>(), prefix in 0u8..=32) {
            let addr = IpAddr::V4(Ipv4Addr::from(raw));
            let net = network_address(addr, prefix).unwrap();
            prop_assert_eq!(network_address(net, prefix).unwrap(), net);
        }
    }
}
