//! Parsers for `ip` command output.
//!
//! Everything that depends on the textual or JSON layout printed by
//! iproute2 lives here, so a format change only touches this module.

use std::net::IpAddr;

use hostnet_common::{HostnetError, HostnetResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

/// Link-level fields reported by `ip -json link show`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkDetails {
    /// Hardware address, uppercased.
    pub mac: Option<String>,
    /// Raw `operstate` value.
    pub operstate: Option<String>,
    /// Link type (`ether`, `loopback`, ...).
    pub link_type: Option<String>,
}

/// Address-level fields reported by `ip --details -json address show`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressDetails {
    /// First configured address.
    pub address: IpAddr,
    /// Prefix length of that address.
    pub prefix_len: Option<u8>,
    /// Broadcast address, if any.
    pub broadcast: Option<IpAddr>,
    /// VLAN id when the link is a VLAN sub-interface.
    pub vlan_id: Option<u16>,
}

/// One line of `ip rule` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleLine {
    /// Rule priority (the number before the colon).
    pub priority: u32,
    /// Selector and action tokens, without the `[detached]` marker.
    pub body: Vec<String>,
}

#[derive(Deserialize)]
struct LinkJson {
    address: Option<String>,
    operstate: Option<String>,
    link_type: Option<String>,
}

#[derive(Deserialize)]
struct AddressJson {
    #[serde(default)]
    addr_info: Vec<AddrInfoJson>,
    linkinfo: Option<LinkInfoJson>,
}

#[derive(Deserialize)]
struct AddrInfoJson {
    local: Option<String>,
    prefixlen: Option<u8>,
    broadcast: Option<String>,
}

#[derive(Deserialize)]
struct LinkInfoJson {
    info_kind: Option<String>,
    info_data: Option<serde_json::Value>,
}

static RULE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+):\s*(.*)$").expect("rule line regex is valid"));

/// Parse `ip netns list`: the first word of every line is a namespace name.
#[must_use]
pub fn netns_names(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Parse `ip -oneline link list` into `(index, name)` pairs.
///
/// Lines look like `2: ens3: <BROADCAST,MULTICAST,UP> mtu 9000 ...`. A
/// `@peer` suffix (`veth0@if5`) is dropped so the name can be queried back.
/// Lines that do not match the layout are skipped.
#[must_use]
pub fn link_list(text: &str) -> Vec<(u32, String)> {
    text.lines()
        .filter_map(|line| {
            let mut words = line.split_whitespace();
            let index = words.next()?.strip_suffix(':')?.parse().ok()?;
            let name = words.next()?.strip_suffix(':')?;
            let name = name.split('@').next().unwrap_or(name);
            (!name.is_empty()).then(|| (index, name.to_string()))
        })
        .collect()
}

/// Strip anything `ip` prints before the JSON array.
fn json_payload(text: &str) -> Option<&str> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(text.find('[').map_or(text, |start| &text[start..]))
}

/// Parse `ip -json link show dev X`; `None` when nothing was reported.
///
/// # Errors
///
/// Returns [`HostnetError::Serialization`] when the output is not the
/// expected JSON.
pub fn link_details(text: &str) -> HostnetResult<Option<LinkDetails>> {
    let Some(payload) = json_payload(text) else {
        return Ok(None);
    };
    let links: Vec<LinkJson> = serde_json::from_str(payload)?;

    Ok(links.into_iter().next().map(|link| LinkDetails {
        mac: link.address.map(|mac| mac.to_uppercase()),
        operstate: link.operstate,
        link_type: link.link_type,
    }))
}

/// Parse `ip --details -json address show dev X`.
///
/// Returns the first link object carrying a local address; objects with an
/// empty `addr_info` are skipped.
///
/// # Errors
///
/// Returns [`HostnetError::Serialization`] when the output is not the
/// expected JSON, or [`HostnetError::Parse`] when an address is not a valid
/// IP literal.
pub fn address_details(text: &str) -> HostnetResult<Option<AddressDetails>> {
    let Some(payload) = json_payload(text) else {
        return Ok(None);
    };
    let objects: Vec<AddressJson> = serde_json::from_str(payload)?;

    for obj in objects {
        let Some((info, local)) = obj
            .addr_info
            .into_iter()
            .find_map(|info| info.local.clone().map(|local| (info, local)))
        else {
            continue;
        };

        let address = parse_ip(&local)?;
        let broadcast = info.broadcast.as_deref().map(parse_ip).transpose()?;
        let vlan_id = obj.linkinfo.and_then(|link| {
            if link.info_kind.as_deref() != Some("vlan") {
                return None;
            }
            link.info_data?
                .get("id")?
                .as_u64()
                .and_then(|id| u16::try_from(id).ok())
        });

        return Ok(Some(AddressDetails {
            address,
            prefix_len: info.prefixlen,
            broadcast,
            vlan_id,
        }));
    }
    Ok(None)
}

fn parse_ip(text: &str) -> HostnetResult<IpAddr> {
    text.parse()
        .map_err(|_| HostnetError::parse("IP address", format!("{text:?} is not an address")))
}

/// Extract `(vf index, mac)` pairs from `ip link show DEV` text output.
///
/// Both the older `vf 0 MAC aa:bb:..., vlan 0` and the newer
/// `vf 0     link/ether aa:bb:... brd ...` layouts are understood.
#[must_use]
pub fn vf_macs(text: &str) -> Vec<(u32, String)> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            if !line.starts_with("vf ") {
                return None;
            }
            let words: Vec<&str> = line.split_whitespace().collect();
            let index = words.get(1)?.trim_end_matches(',').parse().ok()?;
            let mac = words
                .windows(2)
                .find(|pair| pair[0] == "MAC" || pair[0] == "link/ether")
                .map(|pair| pair[1].trim_end_matches(','))?;
            Some((index, mac.to_string()))
        })
        .collect()
}

/// Arguments for `ip route del` that remove the route printed on `line`.
#[must_use]
pub fn route_delete_args(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

/// Parse one line of `ip rule` output (`32765:\tfrom 10.0.0.2 lookup t1`).
#[must_use]
pub fn rule_line(line: &str) -> Option<RuleLine> {
    let caps = RULE_LINE.captures(line.trim())?;
    let priority = caps.get(1)?.as_str().parse().ok()?;
    let body = caps
        .get(2)?
        .as_str()
        .split_whitespace()
        .filter(|word| *word != "[detached]")
        .map(str::to_string)
        .collect();
    Some(RuleLine { priority, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaces_with_ids() {
        let text = "blue (id: 1)\nred (id: 0)\n\n";
        assert_eq!(netns_names(text), vec!["blue", "red"]);
    }

    #[test]
    fn link_list_oneline() {
        let text = "1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536 qdisc noqueue state UNKNOWN\n\
                    2: ens3: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 9000 qdisc mq state UP\n\
                    7: veth0@if6: <BROADCAST,MULTICAST> mtu 1500 qdisc noop state DOWN\n\
                    garbage line\n";
        assert_eq!(
            link_list(text),
            vec![
                (1, "lo".to_string()),
                (2, "ens3".to_string()),
                (7, "veth0".to_string())
            ]
        );
    }

    #[test]
    fn link_details_uppercases_mac() {
        let text = r#"[{"ifindex":2,"ifname":"ens3","operstate":"UP","link_type":"ether","address":"02:00:17:0a:bc:de","broadcast":"ff:ff:ff:ff:ff:ff"}]"#;
        let details = link_details(text).unwrap().unwrap();
        assert_eq!(details.mac.as_deref(), Some("02:00:17:0A:BC:DE"));
        assert_eq!(details.operstate.as_deref(), Some("UP"));
        assert_eq!(details.link_type.as_deref(), Some("ether"));
    }

    #[test]
    fn link_details_empty_output() {
        assert_eq!(link_details("  \n").unwrap(), None);
        assert_eq!(link_details("[]").unwrap(), None);
    }

    #[test]
    fn link_details_rejects_garbage() {
        assert!(matches!(
            link_details("[{not json"),
            Err(HostnetError::Serialization(_))
        ));
    }

    #[test]
    fn address_details_rejects_wrong_shape() {
        assert!(matches!(
            address_details(r#"{"ifname":"ens3"}"#),
            Err(HostnetError::Serialization(_))
        ));
        assert!(matches!(
            address_details(r#"[{"addr_info":[{"local":"10.0.0.300"}]}]"#),
            Err(HostnetError::Parse { .. })
        ));
    }

    #[test]
    fn address_details_vlan() {
        let text = r#"[{"ifindex":5,"ifname":"ens3.100","link":"ens3",
            "linkinfo":{"info_kind":"vlan","info_data":{"protocol":"802.1Q","id":100,"flags":["REORDER_HDR"]}},
            "addr_info":[{"family":"inet","local":"10.0.3.17","prefixlen":22,"broadcast":"10.0.3.255","scope":"global"}]}]"#;
        let details = address_details(text).unwrap().unwrap();
        assert_eq!(details.address, "10.0.3.17".parse::<IpAddr>().unwrap());
        assert_eq!(details.prefix_len, Some(22));
        assert_eq!(
            details.broadcast,
            Some("10.0.3.255".parse::<IpAddr>().unwrap())
        );
        assert_eq!(details.vlan_id, Some(100));
    }

    #[test]
    fn address_details_non_vlan_kind() {
        let text = r#"[{"ifname":"br0","linkinfo":{"info_kind":"bridge","info_data":{"id":7}},
            "addr_info":[{"local":"172.17.0.1","prefixlen":16}]}]"#;
        let details = address_details(text).unwrap().unwrap();
        assert_eq!(details.vlan_id, None);
        assert_eq!(details.broadcast, None);
    }

    #[test]
    fn address_details_skips_empty_addr_info() {
        let text = r#"[{"ifname":"ens4","addr_info":[{}]},{"ifname":"ens4","addr_info":[]}]"#;
        assert_eq!(address_details(text).unwrap(), None);
    }

    #[test]
    fn address_details_tolerates_leading_noise() {
        let text = "Warning: something\n[{\"addr_info\":[{\"local\":\"fe80::1\",\"prefixlen\":64}]}]";
        let details = address_details(text).unwrap().unwrap();
        assert_eq!(details.address, "fe80::1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn vf_macs_both_layouts() {
        let text = "2: ens3: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 9000\n\
                    \x20   link/ether 00:10:e0:8d:5a:10 brd ff:ff:ff:ff:ff:ff\n\
                    \x20   vf 0 MAC 02:00:17:00:00:01, vlan 0, spoof checking on, link-state auto\n\
                    \x20   vf 1     link/ether 02:00:17:00:00:02 brd ff:ff:ff:ff:ff:ff, spoof checking on\n";
        assert_eq!(
            vf_macs(text),
            vec![
                (0, "02:00:17:00:00:01".to_string()),
                (1, "02:00:17:00:00:02".to_string())
            ]
        );
    }

    #[test]
    fn rule_line_strips_detached() {
        let rule = rule_line("32765:\tfrom 10.0.0.2 lookup ens3 [detached] ").unwrap();
        assert_eq!(rule.priority, 32765);
        assert_eq!(rule.body, vec!["from", "10.0.0.2", "lookup", "ens3"]);
    }

    #[test]
    fn rule_line_rejects_other_text() {
        assert!(rule_line("not a rule").is_none());
    }

    #[test]
    fn route_args_split() {
        assert_eq!(
            route_delete_args("default via 10.0.0.1 dev ens3 proto dhcp metric 100 "),
            vec!["default", "via", "10.0.0.1", "dev", "ens3", "proto", "dhcp", "metric", "100"]
        );
    }
}
