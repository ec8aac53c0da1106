use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Largest value a 24-bit VXLAN network identifier can hold.
pub const VXLAN_ID_MAX: u32 = (1 << 24) - 1;

/// The wire contract between a consumer and a provider domain: a bit-exact
/// ASCII payload of four `k=v` fields separated by `;`.
///
/// `vxlan_id`, `vxlan_port`, and `federation_net` may be the literal `None`
/// on provider-side announcements, where the provider has not yet adopted
/// the consumer's VXLAN parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub ip_address: Ipv4Addr,
    pub vxlan_id: Option<u32>,
    pub vxlan_port: Option<u16>,
    pub federation_net: Option<(Ipv4Addr, u8)>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("malformed endpoint string: {0:?}")]
    Malformed(String),
    #[error("invalid ip_address field: {0:?}")]
    InvalidIp(String),
    #[error("vxlan_id {0} out of range [1, {VXLAN_ID_MAX}]")]
    VxlanIdOutOfRange(u32),
    #[error("vxlan_port {0} out of range [1, 65535]")]
    VxlanPortOutOfRange(u32),
    #[error("invalid federation_net CIDR: {0:?}")]
    InvalidCidr(String),
}

impl Endpoint {
    /// Parse the `ip_address=..;vxlan_id=..;vxlan_port=..;federation_net=..`
    /// wire format. Field order is significant; this is not a general
    /// key-value parser.
    pub fn parse(s: &str) -> Result<Self, EndpointError> {
        let mut fields = s.split(';');
        let ip_field = fields.next().ok_or_else(|| EndpointError::Malformed(s.to_string()))?;
        let vxlan_id_field = fields.next().ok_or_else(|| EndpointError::Malformed(s.to_string()))?;
        let vxlan_port_field = fields.next().ok_or_else(|| EndpointError::Malformed(s.to_string()))?;
        let net_field = fields.next().ok_or_else(|| EndpointError::Malformed(s.to_string()))?;
        if fields.next().is_some() {
            return Err(EndpointError::Malformed(s.to_string()));
        }

        let ip_value = strip_prefix(ip_field, "ip_address=", s)?;
        let ip_address = Ipv4Addr::from_str(ip_value)
            .map_err(|_| EndpointError::InvalidIp(ip_value.to_string()))?;

        let vxlan_id = parse_optional_u32(strip_prefix(vxlan_id_field, "vxlan_id=", s)?)?;
        if let Some(id) = vxlan_id {
            if id == 0 || id > VXLAN_ID_MAX {
                return Err(EndpointError::VxlanIdOutOfRange(id));
            }
        }

        let vxlan_port = parse_optional_u32(strip_prefix(vxlan_port_field, "vxlan_port=", s)?)?;
        let vxlan_port = match vxlan_port {
            None => None,
            Some(0) => return Err(EndpointError::VxlanPortOutOfRange(0)),
            Some(p) if p > u16::MAX as u32 => return Err(EndpointError::VxlanPortOutOfRange(p)),
            Some(p) => Some(p as u16),
        };

        let net_value = strip_prefix(net_field, "federation_net=", s)?;
        let federation_net = if net_value == "None" {
            None
        } else {
            Some(parse_cidr(net_value)?)
        };

        Ok(Self {
            ip_address,
            vxlan_id,
            vxlan_port,
            federation_net,
        })
    }

    /// Render back to the canonical wire format.
    pub fn format(&self) -> String {
        let vxlan_id = self
            .vxlan_id
            .map(|v| v.to_string())
            .unwrap_or_else(|| "None".to_string());
        let vxlan_port = self
            .vxlan_port
            .map(|v| v.to_string())
            .unwrap_or_else(|| "None".to_string());
        let federation_net = self
            .federation_net
            .map(|(ip, prefix)| format!("{ip}/{prefix}"))
            .unwrap_or_else(|| "None".to_string());
        format!(
            "ip_address={};vxlan_id={};vxlan_port={};federation_net={}",
            self.ip_address, vxlan_id, vxlan_port, federation_net
        )
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

fn strip_prefix<'a>(field: &'a str, prefix: &str, original: &str) -> Result<&'a str, EndpointError> {
    field
        .strip_prefix(prefix)
        .ok_or_else(|| EndpointError::Malformed(original.to_string()))
}

fn parse_optional_u32(value: &str) -> Result<Option<u32>, EndpointError> {
    if value == "None" {
        return Ok(None);
    }
    value
        .parse::<u32>()
        .map(Some)
        .map_err(|_| EndpointError::Malformed(value.to_string()))
}

fn parse_cidr(value: &str) -> Result<(Ipv4Addr, u8), EndpointError> {
    let (ip_part, prefix_part) = value
        .split_once('/')
        .ok_or_else(|| EndpointError::InvalidCidr(value.to_string()))?;
    let ip = Ipv4Addr::from_str(ip_part).map_err(|_| EndpointError::InvalidCidr(value.to_string()))?;
    let prefix: u8 = prefix_part
        .parse()
        .map_err(|_| EndpointError::InvalidCidr(value.to_string()))?;
    if prefix > 32 {
        return Err(EndpointError::InvalidCidr(value.to_string()));
    }
    Ok((ip, prefix))
}

/// Derive the consumer's or provider's `/24` within its `/16` federation
/// subnet by placing `node_id` in the third octet, per spec §6.
pub fn subnet_for_node(net: (Ipv4Addr, u8), node_id: u8) -> (Ipv4Addr, u8) {
    let octets = net.0.octets();
    (Ipv4Addr::new(octets[0], octets[1], node_id, octets[3]), 24)
}

/// `200 + node_id`, per spec §6.
pub fn vxlan_id_for_node(node_id: u8) -> u32 {
    200 + node_id as u32
}

/// `6000 + node_id`, per spec §6.
pub fn vxlan_port_for_node(node_id: u8) -> u16 {
    6000 + node_id as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_endpoint() -> Endpoint {
        Endpoint {
            ip_address: Ipv4Addr::new(10, 5, 99, 1),
            vxlan_id: Some(201),
            vxlan_port: Some(6001),
            federation_net: Some((Ipv4Addr::new(192, 1, 0, 0), 16)),
        }
    }

    #[test]
    fn round_trips_full_endpoint() {
        let e = full_endpoint();
        let s = e.format();
        assert_eq!(Endpoint::parse(&s).unwrap(), e);
    }

    #[test]
    fn round_trips_provider_side_none_fields() {
        let s = "ip_address=10.5.99.2;vxlan_id=None;vxlan_port=None;federation_net=None";
        let e = Endpoint::parse(s).unwrap();
        assert_eq!(e.vxlan_id, None);
        assert_eq!(e.format(), s);
    }

    #[test]
    fn format_then_parse_is_identity_for_canonical_string() {
        let s = "ip_address=192.1.2.1;vxlan_id=202;vxlan_port=6002;federation_net=192.1.0.0/16";
        let e = Endpoint::parse(s).unwrap();
        assert_eq!(e.format(), s);
    }

    #[test]
    fn rejects_vxlan_id_out_of_range() {
        let s = "ip_address=10.0.0.1;vxlan_id=16777216;vxlan_port=6000;federation_net=None";
        assert!(matches!(
            Endpoint::parse(s),
            Err(EndpointError::VxlanIdOutOfRange(_))
        ));
    }

    #[test]
    fn rejects_malformed_field_order() {
        let s = "vxlan_id=1;ip_address=10.0.0.1;vxlan_port=6000;federation_net=None";
        assert!(Endpoint::parse(s).is_err());
    }

    #[test]
    fn subnet_for_node_places_node_id_in_third_octet() {
        let net = (Ipv4Addr::new(192, 1, 0, 0), 16);
        assert_eq!(subnet_for_node(net, 2), (Ipv4Addr::new(192, 1, 2, 0), 24));
    }

    #[test]
    fn vxlan_id_and_port_derivations() {
        assert_eq!(vxlan_id_for_node(2), 202);
        assert_eq!(vxlan_port_for_node(2), 6002);
    }
}
