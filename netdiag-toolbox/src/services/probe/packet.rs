//! ICMP echo message encoding and decoding.

use std::net::IpAddr;

const ECHO_REPLY_V4: u8 = 0;
const DEST_UNREACHABLE_V4: u8 = 3;
const ECHO_REQUEST_V4: u8 = 8;

const DEST_UNREACHABLE_V6: u8 = 1;
const ECHO_REQUEST_V6: u8 = 128;
const ECHO_REPLY_V6: u8 = 129;

/// ICMP header: type, code, checksum, identifier, sequence.
const ICMP_HEADER_LEN: usize = 8;
const IPV6_HEADER_LEN: usize = 40;

/// ICMP flavour, picked from the target address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpFamily {
    V4,
    V6,
}

impl IcmpFamily {
    pub const fn of(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }

    const fn echo_request(self) -> u8 {
        match self {
            Self::V4 => ECHO_REQUEST_V4,
            Self::V6 => ECHO_REQUEST_V6,
        }
    }

    const fn echo_reply(self) -> u8 {
        match self {
            Self::V4 => ECHO_REPLY_V4,
            Self::V6 => ECHO_REPLY_V6,
        }
    }

    const fn unreachable(self) -> u8 {
        match self {
            Self::V4 => DEST_UNREACHABLE_V4,
            Self::V6 => DEST_UNREACHABLE_V6,
        }
    }
}

/// An outgoing echo request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoRequest {
    pub identifier: u16,
    pub sequence: u16,
    pub payload: Vec<u8>,
}

impl EchoRequest {
    /// Build a request with the classic `ping` filler payload.
    pub fn new(identifier: u16, sequence: u16, payload_size: usize) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let payload = (0..payload_size).map(|i| (i % 256) as u8).collect();
        Self {
            identifier,
            sequence,
            payload,
        }
    }

    /// Serialize to wire format.
    ///
    /// The ICMPv6 checksum covers a pseudo-header the kernel fills in, so it is left zero.
    pub fn encode(&self, family: IcmpFamily) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ICMP_HEADER_LEN + self.payload.len());
        buf.push(family.echo_request());
        buf.push(0);
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(&self.identifier.to_be_bytes());
        buf.extend_from_slice(&self.sequence.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        if family == IcmpFamily::V4 {
            let sum = checksum(&buf);
            buf[2..4].copy_from_slice(&sum.to_be_bytes());
        }
        buf
    }
}

/// What an incoming message says about one of our requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    EchoReply,
    Unreachable,
}

/// A decoded message that refers to an echo request by identifier and sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoReply {
    pub identifier: u16,
    pub sequence: u16,
    pub kind: ReplyKind,
}

/// Decode a received datagram.
///
/// Raw IPv4 sockets deliver the IP header in front of the ICMP message; set
/// `with_ip_header` for those. Anything that is neither an echo reply nor an
/// unreachable quoting an echo request yields `None`.
pub fn decode(buf: &[u8], family: IcmpFamily, with_ip_header: bool) -> Option<EchoReply> {
    let icmp = if with_ip_header {
        skip_ipv4_header(buf)?
    } else {
        buf
    };
    if icmp.len() < ICMP_HEADER_LEN {
        return None;
    }

    let kind = icmp[0];
    if kind == family.echo_reply() {
        let (identifier, sequence) = read_ids(icmp);
        return Some(EchoReply {
            identifier,
            sequence,
            kind: ReplyKind::EchoReply,
        });
    }

    if kind == family.unreachable() {
        // Body quotes the offending datagram: IP header + first 8 bytes of our request.
        let quoted = &icmp[ICMP_HEADER_LEN..];
        let inner = match family {
            IcmpFamily::V4 => skip_ipv4_header(quoted)?,
            IcmpFamily::V6 => quoted.get(IPV6_HEADER_LEN..)?,
        };
        if inner.len() < ICMP_HEADER_LEN || inner[0] != family.echo_request() {
            return None;
        }
        let (identifier, sequence) = read_ids(inner);
        return Some(EchoReply {
            identifier,
            sequence,
            kind: ReplyKind::Unreachable,
        });
    }

    None
}

fn skip_ipv4_header(buf: &[u8]) -> Option<&[u8]> {
    let first = *buf.first()?;
    if first >> 4 != 4 {
        return None;
    }
    let ihl = usize::from(first & 0x0f) * 4;
    if ihl < 20 {
        return None;
    }
    buf.get(ihl..)
}

fn read_ids(icmp: &[u8]) -> (u16, u16) {
    (
        u16::from_be_bytes([icmp[4], icmp[5]]),
        u16::from_be_bytes([icmp[6], icmp[7]]),
    )
}

/// RFC 1071 internet checksum.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = data
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u32::from(u16::from_be_bytes([*hi, *lo])),
            [hi] => u32::from(u16::from_be_bytes([*hi, 0])),
            _ => 0,
        })
        .sum();
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    #[allow(clippy::cast_possible_truncation)]
    let folded = sum as u16;
    !folded
}
