//! ICMP conversation seam and its socket-backed implementation.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use super::packet::{self, EchoReply, EchoRequest, IcmpFamily, ReplyKind};

/// Largest datagram we expect back (IP header + ICMP + quoted payload).
const RECV_BUFFER_LEN: usize = 2048;

/// One open ICMP conversation with a single target.
#[async_trait]
pub trait EchoSocket: Send + Sync {
    /// Send one echo request to the target.
    async fn send(&self, request: &EchoRequest) -> io::Result<()>;

    /// Wait for the next message that refers to an echo request.
    ///
    /// Unrelated traffic is skipped internally.
    async fn recv(&self) -> io::Result<EchoReply>;
}

/// Opens ICMP conversations.
#[async_trait]
pub trait IcmpNetwork: Send + Sync {
    /// Open a conversation with `target` for the session tagged `identifier`.
    ///
    /// Returns [`io::ErrorKind::PermissionDenied`] when the process lacks the
    /// privilege to open the socket.
    async fn open(&self, target: IpAddr, identifier: u16) -> io::Result<Arc<dyn EchoSocket>>;
}

/// [`IcmpNetwork`] over operating system sockets.
///
/// Privileged mode uses `SOCK_RAW` (needs root or `CAP_NET_RAW`); unprivileged
/// mode uses `SOCK_DGRAM` ICMP sockets, which Linux allows for groups listed in
/// `net.ipv4.ping_group_range`.
#[derive(Debug, Clone, Copy)]
pub struct SystemIcmpNetwork {
    privileged: bool,
}

impl SystemIcmpNetwork {
    pub const fn new(privileged: bool) -> Self {
        Self { privileged }
    }
}

impl Default for SystemIcmpNetwork {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl IcmpNetwork for SystemIcmpNetwork {
    async fn open(&self, target: IpAddr, identifier: u16) -> io::Result<Arc<dyn EchoSocket>> {
        let family = IcmpFamily::of(target);
        let (domain, protocol) = match family {
            IcmpFamily::V4 => (Domain::IPV4, Protocol::ICMPV4),
            IcmpFamily::V6 => (Domain::IPV6, Protocol::ICMPV6),
        };
        let ty = if self.privileged {
            Type::RAW
        } else {
            Type::DGRAM
        };

        let socket = Socket::new(domain, ty, Some(protocol))?;
        socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(std::net::UdpSocket::from(socket))?;
        log::debug!(
            "Opened {} ICMP socket for {target} (identifier {identifier:#06x})",
            if self.privileged { "raw" } else { "datagram" }
        );

        Ok(Arc::new(SystemEchoSocket {
            socket,
            target,
            family,
            // Only raw IPv4 sockets hand us the IP header.
            with_ip_header: self.privileged && family == IcmpFamily::V4,
            // Datagram sockets get their identifier rewritten by the kernel,
            // which in turn only delivers replies addressed to this socket.
            kernel_identifier: (!self.privileged).then_some(identifier),
        }))
    }
}

struct SystemEchoSocket {
    socket: UdpSocket,
    target: IpAddr,
    family: IcmpFamily,
    with_ip_header: bool,
    kernel_identifier: Option<u16>,
}

#[async_trait]
impl EchoSocket for SystemEchoSocket {
    async fn send(&self, request: &EchoRequest) -> io::Result<()> {
        let wire = request.encode(self.family);
        self.socket
            .send_to(&wire, SocketAddr::new(self.target, 0))
            .await?;
        Ok(())
    }

    async fn recv(&self) -> io::Result<EchoReply> {
        let mut buf = [0u8; RECV_BUFFER_LEN];
        loop {
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            let Some(mut reply) = packet::decode(&buf[..len], self.family, self.with_ip_header)
            else {
                continue;
            };
            // Echo replies must come from the target; unreachables come from routers.
            if reply.kind == ReplyKind::EchoReply && from.ip() != self.target {
                continue;
            }
            if let Some(identifier) = self.kernel_identifier {
                reply.identifier = identifier;
            }
            return Ok(reply);
        }
    }
}
