//! Packet handling for a single virtual router.
//!
//! The router is sans-IO: each call takes the current time, consumes one
//! frame (or a clock tick) and returns the frames to transmit.

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::arpcache::{ArpCache, ArpRequest};
use crate::hex::hex_dump;
use crate::iface::{Interface, Interfaces};
use crate::rtable::RoutingTable;
use crate::wire::{
    ARP_HRD_ETHERNET, ARP_OP_REPLY, ARP_OP_REQUEST, ArpHeader, ETHER_HDR_LEN, ETHERTYPE_ARP,
    ETHERTYPE_IP, EthernetHeader, ICMP_CODE_HOST_UNREACHABLE, ICMP_CODE_NET_UNREACHABLE,
    ICMP_CODE_PORT_UNREACHABLE, ICMP_DEST_UNREACHABLE, ICMP_ECHO_REPLY, ICMP_ECHO_REQUEST,
    ICMP_TIME_EXCEEDED, INIT_TTL, IP_HDR_LEN, IP_PROTOCOL_ICMP, IcmpErrorAddr, IcmpHeader,
    Ipv4Header, MacAddr, arp_frame, cksum, describe, fill_icmp_checksum, fill_ip_checksum,
    icmp_error_frame,
};

/// ARP requests are retransmitted at most this often.
pub const ARP_RESEND_INTERVAL: Duration = Duration::from_secs(1);
/// After this many unanswered requests the queued packets are dropped.
pub const ARP_MAX_SENDS: u32 = 5;

/// A frame to transmit on `iface`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub iface: String,
    pub frame: Vec<u8>,
}

pub struct Router {
    ifaces: Interfaces,
    rtable: RoutingTable,
    cache: ArpCache,
}

impl Router {
    pub fn new(ifaces: Interfaces, rtable: RoutingTable) -> Self {
        Self::with_cache(ifaces, rtable, ArpCache::default())
    }

    pub fn with_cache(ifaces: Interfaces, rtable: RoutingTable, cache: ArpCache) -> Self {
        Self {
            ifaces,
            rtable,
            cache,
        }
    }

    pub fn interfaces(&self) -> &Interfaces {
        &self.ifaces
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.rtable
    }

    pub fn arp_cache(&self) -> &ArpCache {
        &self.cache
    }

    /// Process one Ethernet frame received on `iface`.
    pub fn handle_packet(&mut self, frame: &[u8], iface: &str, now: Instant) -> Vec<Outbound> {
        let mut out = Vec::new();
        debug!("received {} bytes on {iface}\n{}", frame.len(), describe(frame));
        trace!("\n{}", hex_dump(frame));

        let Some(eth) = EthernetHeader::parse(frame) else {
            warn!("dropping runt frame of {} bytes on {iface}", frame.len());
            return out;
        };
        let Some(in_if) = self.ifaces.by_name(iface).cloned() else {
            warn!("dropping frame received on unknown interface {iface}");
            return out;
        };

        match eth.ethertype {
            ETHERTYPE_ARP => self.handle_arp(frame, &eth, &in_if, now, &mut out),
            ETHERTYPE_IP => self.handle_ip(frame, &eth, &in_if, now, &mut out),
            other => debug!("ignoring ethertype {other:#06x}"),
        }
        out
    }

    /// Advance the clock: expire cache entries and service pending requests.
    pub fn tick(&mut self, now: Instant) -> Vec<Outbound> {
        let mut out = Vec::new();
        self.cache.sweep(now);
        for ip in self.cache.pending() {
            self.handle_arpreq(ip, now, &mut out);
        }
        out
    }

    fn handle_arp(
        &mut self,
        frame: &[u8],
        eth: &EthernetHeader,
        in_if: &Interface,
        now: Instant,
        out: &mut Vec<Outbound>,
    ) {
        let Some(arp) = ArpHeader::parse(&frame[ETHER_HDR_LEN..]) else {
            warn!("dropping truncated ARP packet on {}", in_if.name);
            return;
        };
        if arp.hrd != ARP_HRD_ETHERNET || arp.pro != ETHERTYPE_IP {
            warn!(
                "dropping ARP packet with hrd {} pro {:#06x}",
                arp.hrd, arp.pro
            );
            return;
        }

        match arp.op {
            ARP_OP_REQUEST => {
                let Some(target) = self.ifaces.by_ip(arp.tip) else {
                    debug!("ARP request for {} is not for us", arp.tip);
                    return;
                };
                debug!("answering ARP request for {} from {}", arp.tip, arp.sip);
                let reply =
                    ArpHeader::ethernet_ipv4(ARP_OP_REPLY, target.mac, target.ip, arp.sha, arp.sip);
                out.push(Outbound {
                    iface: in_if.name.clone(),
                    frame: arp_frame(eth.src, target.mac, &reply),
                });
            }
            ARP_OP_REPLY => {
                if self.ifaces.by_ip(arp.tip).is_none() {
                    debug!("ARP reply for {} is not for us", arp.tip);
                    return;
                }
                debug!("learned {} is at {}", arp.sip, arp.sha);
                if let Some(req) = self.cache.insert(arp.sha, arp.sip, now) {
                    self.flush_request(req, arp.sha, out);
                }
            }
            op => warn!("dropping ARP packet with unknown opcode {op}"),
        }
    }

    /// Send every packet parked on `req` now that its next hop is `mac`.
    fn flush_request(&self, req: ArpRequest, mac: MacAddr, out: &mut Vec<Outbound>) {
        info!(
            "sending {} queued packet(s) to {}",
            req.packets.len(),
            req.ip
        );
        for pkt in req.packets {
            let Some(out_if) = self.ifaces.by_name(&pkt.out_iface) else {
                warn!("queued packet references unknown interface {}", pkt.out_iface);
                continue;
            };
            let mut frame = pkt.frame;
            EthernetHeader {
                dst: mac,
                src: out_if.mac,
                ethertype: ETHERTYPE_IP,
            }
            .write(&mut frame);
            out.push(Outbound {
                iface: out_if.name.clone(),
                frame,
            });
        }
    }

    fn handle_ip(
        &mut self,
        frame: &[u8],
        eth: &EthernetHeader,
        in_if: &Interface,
        now: Instant,
        out: &mut Vec<Outbound>,
    ) {
        let ip_buf = &frame[ETHER_HDR_LEN..];
        let Some(ip) = Ipv4Header::parse(ip_buf) else {
            warn!("dropping IP packet shorter than a header on {}", in_if.name);
            return;
        };
        let hlen = ip.header_len();
        let total = usize::from(ip.total_len);
        if ip.version != 4 || hlen < IP_HDR_LEN || hlen > total || total > ip_buf.len() {
            warn!(
                "dropping malformed IP packet (v{} hl {} len {}) on {}",
                ip.version, hlen, total, in_if.name
            );
            return;
        }
        if cksum(&ip_buf[..hlen]) != 0 {
            warn!("dropping IP packet with invalid checksum from {}", ip.src);
            return;
        }
        // Ethernet padding is not part of the datagram.
        let datagram = &ip_buf[..total];

        if let Some(dest_if) = self.ifaces.by_ip(ip.dst).cloned() {
            self.handle_local(datagram, &ip, eth, in_if, &dest_if, out);
        } else {
            self.forward(frame, datagram, &ip, eth, in_if, now, out);
        }
    }

    /// A datagram addressed to one of the router's own interfaces.
    fn handle_local(
        &self,
        datagram: &[u8],
        ip: &Ipv4Header,
        eth: &EthernetHeader,
        in_if: &Interface,
        dest_if: &Interface,
        out: &mut Vec<Outbound>,
    ) {
        if ip.protocol != IP_PROTOCOL_ICMP {
            debug!(
                "protocol {} to {} is unreachable, sending port unreachable",
                ip.protocol, ip.dst
            );
            out.push(icmp_error(
                ICMP_DEST_UNREACHABLE,
                ICMP_CODE_PORT_UNREACHABLE,
                in_if,
                dest_if.ip,
                eth.src,
                datagram,
            ));
            return;
        }

        let icmp = &datagram[ip.header_len()..];
        let Some(hdr) = IcmpHeader::parse(icmp) else {
            warn!("dropping truncated ICMP message from {}", ip.src);
            return;
        };
        if hdr.icmp_type != ICMP_ECHO_REQUEST {
            debug!("ignoring ICMP type {} addressed to router", hdr.icmp_type);
            return;
        }
        if cksum(icmp) != 0 {
            warn!("dropping echo request with invalid ICMP checksum from {}", ip.src);
            return;
        }

        debug!("echo request from {} to {}, replying", ip.src, ip.dst);
        let hlen = ip.header_len();
        let mut frame = vec![0u8; ETHER_HDR_LEN + datagram.len()];
        EthernetHeader {
            dst: eth.src,
            src: in_if.mac,
            ethertype: ETHERTYPE_IP,
        }
        .write(&mut frame);
        let reply_ip = Ipv4Header {
            version: 4,
            ihl: ip.ihl,
            tos: ip.tos,
            total_len: datagram.len() as u16,
            id: ip.id,
            frag_off: 0,
            ttl: INIT_TTL,
            protocol: IP_PROTOCOL_ICMP,
            checksum: 0,
            src: dest_if.ip,
            dst: ip.src,
        };
        // Options are echoed back unchanged.
        let (ip_buf, icmp_buf) = frame[ETHER_HDR_LEN..].split_at_mut(hlen);
        reply_ip.write(ip_buf);
        ip_buf[IP_HDR_LEN..].copy_from_slice(&datagram[IP_HDR_LEN..hlen]);
        fill_ip_checksum(ip_buf);
        icmp_buf.copy_from_slice(icmp);
        icmp_buf[0] = ICMP_ECHO_REPLY;
        icmp_buf[1] = 0;
        fill_icmp_checksum(icmp_buf);

        out.push(Outbound {
            iface: in_if.name.clone(),
            frame,
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn forward(
        &mut self,
        frame: &[u8],
        datagram: &[u8],
        ip: &Ipv4Header,
        eth: &EthernetHeader,
        in_if: &Interface,
        now: Instant,
        out: &mut Vec<Outbound>,
    ) {
        let reportable = !is_icmp_error(datagram, ip);

        if ip.ttl <= 1 {
            debug!("TTL expired for {} -> {}", ip.src, ip.dst);
            if reportable {
                out.push(icmp_error(
                    ICMP_TIME_EXCEEDED,
                    0,
                    in_if,
                    in_if.ip,
                    eth.src,
                    datagram,
                ));
            }
            return;
        }

        let Some(route) = self.rtable.lookup(ip.dst) else {
            debug!("no route to {}", ip.dst);
            if reportable {
                out.push(icmp_error(
                    ICMP_DEST_UNREACHABLE,
                    ICMP_CODE_NET_UNREACHABLE,
                    in_if,
                    in_if.ip,
                    eth.src,
                    datagram,
                ));
            }
            return;
        };
        let next_hop = route.next_hop(ip.dst);
        let Some(out_if) = self.ifaces.by_name(&route.iface).cloned() else {
            warn!("route to {} uses unknown interface {}", ip.dst, route.iface);
            return;
        };

        let mut fwd = frame[..ETHER_HDR_LEN + datagram.len()].to_vec();
        let hdr = &mut fwd[ETHER_HDR_LEN..ETHER_HDR_LEN + ip.header_len()];
        hdr[8] = ip.ttl - 1;
        fill_ip_checksum(hdr);

        match self.cache.lookup(next_hop, now) {
            Some(mac) => {
                debug!("forwarding {} -> {} via {next_hop} on {}", ip.src, ip.dst, out_if.name);
                EthernetHeader {
                    dst: mac,
                    src: out_if.mac,
                    ethertype: ETHERTYPE_IP,
                }
                .write(&mut fwd);
                out.push(Outbound {
                    iface: out_if.name,
                    frame: fwd,
                });
            }
            None => {
                debug!("no ARP entry for {next_hop}, queueing packet");
                self.cache.queue(next_hop, fwd, &out_if.name, &in_if.name);
                self.handle_arpreq(next_hop, now, out);
            }
        }
    }

    /// Retransmit the ARP request for `ip`, or give up on it.
    fn handle_arpreq(&mut self, ip: Ipv4Addr, now: Instant, out: &mut Vec<Outbound>) {
        let Some(req) = self.cache.request_mut(ip) else {
            return;
        };
        if let Some(sent) = req.sent {
            if now.saturating_duration_since(sent) < ARP_RESEND_INTERVAL {
                return;
            }
        }

        if req.times_sent >= ARP_MAX_SENDS {
            let Some(req) = self.cache.remove_request(ip) else {
                return;
            };
            info!(
                "{} did not answer {} ARP requests, dropping {} packet(s)",
                ip,
                ARP_MAX_SENDS,
                req.packets.len()
            );
            self.fail_request(req, out);
            return;
        }

        let Some(iface) = self.ifaces.by_name(&req.iface) else {
            warn!("ARP request for {ip} references unknown interface {}", req.iface);
            return;
        };
        let arp = ArpHeader::ethernet_ipv4(
            ARP_OP_REQUEST,
            iface.mac,
            iface.ip,
            MacAddr::BROADCAST,
            ip,
        );
        out.push(Outbound {
            iface: iface.name.clone(),
            frame: arp_frame(MacAddr::BROADCAST, iface.mac, &arp),
        });
        req.sent = Some(now);
        req.times_sent += 1;
        debug!("sent ARP request #{} for {ip} on {}", req.times_sent, iface.name);
    }

    /// Report host unreachable for every packet of an abandoned request.
    fn fail_request(&self, req: ArpRequest, out: &mut Vec<Outbound>) {
        for pkt in req.packets {
            let Some(in_if) = self.ifaces.by_name(&pkt.in_iface) else {
                continue;
            };
            let Some(eth) = EthernetHeader::parse(&pkt.frame) else {
                continue;
            };
            let Some(ip) = Ipv4Header::parse(&pkt.frame[ETHER_HDR_LEN..]) else {
                continue;
            };
            // Quote the datagram as it arrived, before the TTL decrement.
            let mut quoted = pkt.frame[ETHER_HDR_LEN..].to_vec();
            if is_icmp_error(&quoted, &ip) {
                continue;
            }
            let hdr = &mut quoted[..ip.header_len()];
            hdr[8] = ip.ttl.saturating_add(1);
            fill_ip_checksum(hdr);
            out.push(icmp_error(
                ICMP_DEST_UNREACHABLE,
                ICMP_CODE_HOST_UNREACHABLE,
                in_if,
                in_if.ip,
                eth.src,
                &quoted,
            ));
        }
    }
}

fn icmp_error(
    icmp_type: u8,
    code: u8,
    via: &Interface,
    ip_src: Ipv4Addr,
    eth_dst: MacAddr,
    datagram: &[u8],
) -> Outbound {
    let addr = IcmpErrorAddr {
        eth_src: via.mac,
        eth_dst,
        ip_src,
    };
    Outbound {
        iface: via.name.clone(),
        frame: icmp_error_frame(icmp_type, code, addr, datagram),
    }
}

/// ICMP errors are never answered with further errors.
fn is_icmp_error(datagram: &[u8], ip: &Ipv4Header) -> bool {
    if ip.protocol != IP_PROTOCOL_ICMP {
        return false;
    }
    matches!(
        datagram.get(ip.header_len()).copied(),
        Some(ICMP_DEST_UNREACHABLE | ICMP_TIME_EXCEEDED | 4 | 5 | 12)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{ICMP_DATA_SIZE, ICMP_HDR_LEN, IP_DF};

    const CLIENT_MAC: MacAddr = MacAddr([0xc0, 0, 0, 0, 0, 1]);
    const SERVER_MAC: MacAddr = MacAddr([0x5e, 0, 0, 0, 0, 2]);

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    fn iface(name: &str, last: u8, addr: &str) -> Interface {
        Interface {
            name: name.into(),
            mac: MacAddr([0x02, 0, 0, 0, 0, last]),
            ip: ip(addr),
            mask: ip("255.255.255.0"),
        }
    }

    fn router() -> Router {
        let ifaces = Interfaces::new(vec![
            iface("eth1", 1, "10.0.1.1"),
            iface("eth2", 2, "192.168.2.1"),
            iface("eth3", 3, "172.64.3.1"),
        ])
        .unwrap();
        let rtable = RoutingTable::parse(
            "10.0.1.100 10.0.1.100 255.255.255.255 eth1\n\
             192.168.2.2 192.168.2.2 255.255.255.255 eth2\n\
             172.64.3.0 0.0.0.0 255.255.255.0 eth3\n",
        )
        .unwrap();
        Router::new(ifaces, rtable)
    }

    fn ip_frame(
        eth_dst: MacAddr,
        src: &str,
        dst: &str,
        ttl: u8,
        protocol: u8,
        payload: &[u8],
    ) -> Vec<u8> {
        let mut frame = vec![0u8; ETHER_HDR_LEN + IP_HDR_LEN + payload.len()];
        EthernetHeader {
            dst: eth_dst,
            src: CLIENT_MAC,
            ethertype: ETHERTYPE_IP,
        }
        .write(&mut frame);
        let hdr = Ipv4Header {
            version: 4,
            ihl: 5,
            tos: 0,
            total_len: (IP_HDR_LEN + payload.len()) as u16,
            id: 0x4242,
            frag_off: 0,
            ttl,
            protocol,
            checksum: 0,
            src: ip(src),
            dst: ip(dst),
        };
        let ip_buf = &mut frame[ETHER_HDR_LEN..];
        hdr.write(ip_buf);
        fill_ip_checksum(&mut ip_buf[..IP_HDR_LEN]);
        ip_buf[IP_HDR_LEN..].copy_from_slice(payload);
        frame
    }

    fn echo_request(dst: &str, ttl: u8) -> Vec<u8> {
        let mut icmp = vec![ICMP_ECHO_REQUEST, 0, 0, 0, 0x12, 0x34, 0, 1];
        icmp.extend_from_slice(b"ping payload");
        fill_icmp_checksum(&mut icmp);
        ip_frame(MacAddr([0x02, 0, 0, 0, 0, 1]), "10.0.1.100", dst, ttl, IP_PROTOCOL_ICMP, &icmp)
    }

    fn ip_of(frame: &[u8]) -> Ipv4Header {
        Ipv4Header::parse(&frame[ETHER_HDR_LEN..]).unwrap()
    }

    fn icmp_of(frame: &[u8]) -> &[u8] {
        &frame[ETHER_HDR_LEN + IP_HDR_LEN..]
    }

    fn arp_of(frame: &[u8]) -> ArpHeader {
        ArpHeader::parse(&frame[ETHER_HDR_LEN..]).unwrap()
    }

    fn arp_reply_from_server(now: Instant, r: &mut Router) -> Vec<Outbound> {
        let reply = ArpHeader::ethernet_ipv4(
            ARP_OP_REPLY,
            SERVER_MAC,
            ip("192.168.2.2"),
            MacAddr([0x02, 0, 0, 0, 0, 2]),
            ip("192.168.2.1"),
        );
        let frame = arp_frame(MacAddr([0x02, 0, 0, 0, 0, 2]), SERVER_MAC, &reply);
        r.handle_packet(&frame, "eth2", now)
    }

    #[test]
    fn answers_arp_request_for_own_address() {
        let mut r = router();
        let req = ArpHeader::ethernet_ipv4(
            ARP_OP_REQUEST,
            CLIENT_MAC,
            ip("10.0.1.100"),
            MacAddr::ZERO,
            ip("10.0.1.1"),
        );
        let out = r.handle_packet(&arp_frame(MacAddr::BROADCAST, CLIENT_MAC, &req), "eth1", Instant::now());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].iface, "eth1");
        let eth = EthernetHeader::parse(&out[0].frame).unwrap();
        assert_eq!(eth.dst, CLIENT_MAC);
        assert_eq!(eth.src, MacAddr([0x02, 0, 0, 0, 0, 1]));
        let arp = arp_of(&out[0].frame);
        assert_eq!(arp.op, ARP_OP_REPLY);
        assert_eq!(arp.sha, MacAddr([0x02, 0, 0, 0, 0, 1]));
        assert_eq!(arp.sip, ip("10.0.1.1"));
        assert_eq!(arp.tha, CLIENT_MAC);
        assert_eq!(arp.tip, ip("10.0.1.100"));
    }

    #[test]
    fn ignores_arp_request_for_other_hosts() {
        let mut r = router();
        let req = ArpHeader::ethernet_ipv4(
            ARP_OP_REQUEST,
            CLIENT_MAC,
            ip("10.0.1.100"),
            MacAddr::ZERO,
            ip("10.0.1.77"),
        );
        let out = r.handle_packet(&arp_frame(MacAddr::BROADCAST, CLIENT_MAC, &req), "eth1", Instant::now());
        assert!(out.is_empty());
    }

    #[test]
    fn drops_runts_and_unknown_interfaces() {
        let mut r = router();
        let now = Instant::now();
        assert!(r.handle_packet(&[0u8; 10], "eth1", now).is_empty());
        assert!(r.handle_packet(&echo_request("10.0.1.1", 64), "eth9", now).is_empty());
        let req = ArpHeader::ethernet_ipv4(
            ARP_OP_REQUEST,
            CLIENT_MAC,
            ip("10.0.1.100"),
            MacAddr::ZERO,
            ip("10.0.1.1"),
        );
        let arp = arp_frame(MacAddr::BROADCAST, CLIENT_MAC, &req);
        assert!(r.handle_packet(&arp[..30], "eth1", now).is_empty());
    }

    #[test]
    fn echo_reply_from_router() {
        let mut r = router();
        let req = echo_request("192.168.2.1", 64);
        let out = r.handle_packet(&req, "eth1", Instant::now());
        assert_eq!(out.len(), 1);
        let reply = &out[0].frame;
        assert_eq!(out[0].iface, "eth1");
        assert_eq!(reply.len(), req.len());
        assert_eq!(EthernetHeader::parse(reply).unwrap().dst, CLIENT_MAC);

        let hdr = ip_of(reply);
        assert_eq!(hdr.src, ip("192.168.2.1"));
        assert_eq!(hdr.dst, ip("10.0.1.100"));
        assert_eq!(hdr.ttl, INIT_TTL);
        assert_eq!(hdr.id, 0x4242);
        assert_eq!(hdr.frag_off, 0);
        assert_eq!(cksum(&reply[ETHER_HDR_LEN..ETHER_HDR_LEN + IP_HDR_LEN]), 0);

        let icmp = icmp_of(reply);
        assert_eq!(icmp[0], ICMP_ECHO_REPLY);
        assert_eq!(cksum(icmp), 0);
        assert_eq!(&icmp[4..], &icmp_of(&req)[4..]);
    }

    #[test]
    fn bad_checksums_are_dropped() {
        let mut r = router();
        let mut req = echo_request("10.0.1.1", 64);
        req[ETHER_HDR_LEN + 10] ^= 0xff;
        assert!(r.handle_packet(&req, "eth1", Instant::now()).is_empty());

        let mut req = echo_request("10.0.1.1", 64);
        let last = req.len() - 1;
        req[last] ^= 0xff;
        assert!(r.handle_packet(&req, "eth1", Instant::now()).is_empty());
    }

    #[test]
    fn drops_bad_ihl_and_lengths() {
        let now = Instant::now();
        let mut r = router();
        let rewrite = |frame: &mut Vec<u8>, f: &dyn Fn(&mut [u8])| {
            let ip_buf = &mut frame[ETHER_HDR_LEN..];
            f(ip_buf);
            fill_ip_checksum(&mut ip_buf[..IP_HDR_LEN]);
        };

        let mut short_ihl = echo_request("192.168.2.1", 64);
        rewrite(&mut short_ihl, &|b| b[0] = 0x44);
        assert!(r.handle_packet(&short_ihl, "eth1", now).is_empty());

        // IHL 15 claims 60 header bytes, more than the datagram holds.
        let mut long_ihl = echo_request("192.168.2.1", 64);
        rewrite(&mut long_ihl, &|b| {
            b[0] = 0x4f;
            b[2..4].copy_from_slice(&40u16.to_be_bytes());
        });
        assert!(r.handle_packet(&long_ihl, "eth1", now).is_empty());

        let mut overlong = echo_request("192.168.2.1", 64);
        let claimed = (overlong.len() - ETHER_HDR_LEN + 1) as u16;
        rewrite(&mut overlong, &|b| b[2..4].copy_from_slice(&claimed.to_be_bytes()));
        assert!(r.handle_packet(&overlong, "eth1", now).is_empty());

        let mut v6 = echo_request("192.168.2.1", 64);
        rewrite(&mut v6, &|b| b[0] = 0x65);
        assert!(r.handle_packet(&v6, "eth1", now).is_empty());

        // Trailing Ethernet padding beyond total_len is accepted.
        let mut padded = echo_request("192.168.2.1", 64);
        padded.extend_from_slice(&[0; 6]);
        let out = r.handle_packet(&padded, "eth1", now);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].frame.len(), padded.len() - 6);
    }

    #[test]
    fn echo_reply_keeps_ip_options() {
        let mut icmp = vec![ICMP_ECHO_REQUEST, 0, 0, 0, 0x12, 0x34, 0, 1];
        icmp.extend_from_slice(b"options payload");
        fill_icmp_checksum(&mut icmp);
        let plain = ip_frame(CLIENT_MAC, "10.0.1.100", "10.0.1.1", 64, IP_PROTOCOL_ICMP, &icmp);

        // Splice in one 4-byte option (NOP, NOP, NOP, EOL) and bump IHL to 6.
        let mut req = plain[..ETHER_HDR_LEN + IP_HDR_LEN].to_vec();
        req.extend_from_slice(&[1, 1, 1, 0]);
        req.extend_from_slice(&plain[ETHER_HDR_LEN + IP_HDR_LEN..]);
        {
            let ip_buf = &mut req[ETHER_HDR_LEN..];
            ip_buf[0] = 0x46;
            let total = (IP_HDR_LEN + 4 + icmp.len()) as u16;
            ip_buf[2..4].copy_from_slice(&total.to_be_bytes());
            fill_ip_checksum(&mut ip_buf[..IP_HDR_LEN + 4]);
        }

        let mut r = router();
        let out = r.handle_packet(&req, "eth1", Instant::now());
        assert_eq!(out.len(), 1);
        let reply = &out[0].frame;
        assert_eq!(reply.len(), req.len());
        let hdr = ip_of(reply);
        assert_eq!(hdr.ihl, 6);
        let ip_buf = &reply[ETHER_HDR_LEN..];
        assert_eq!(cksum(&ip_buf[..IP_HDR_LEN + 4]), 0);
        assert_eq!(&ip_buf[IP_HDR_LEN..IP_HDR_LEN + 4], &[1, 1, 1, 0]);
        let icmp_reply = &ip_buf[IP_HDR_LEN + 4..];
        assert_eq!(icmp_reply[0], ICMP_ECHO_REPLY);
        assert_eq!(cksum(icmp_reply), 0);
        assert_eq!(&icmp_reply[4..], &icmp[4..]);
    }

    #[test]
    fn udp_to_router_is_port_unreachable() {
        let mut r = router();
        let frame = ip_frame(MacAddr([0x02, 0, 0, 0, 0, 1]), "10.0.1.100", "172.64.3.1", 64, 17, b"udp-header-and-data");
        let out = r.handle_packet(&frame, "eth1", Instant::now());
        assert_eq!(out.len(), 1);
        let hdr = ip_of(&out[0].frame);
        assert_eq!(hdr.src, ip("172.64.3.1"));
        assert_eq!(hdr.dst, ip("10.0.1.100"));
        assert_eq!(hdr.frag_off, IP_DF);
        let icmp = icmp_of(&out[0].frame);
        assert_eq!((icmp[0], icmp[1]), (ICMP_DEST_UNREACHABLE, ICMP_CODE_PORT_UNREACHABLE));
        assert_eq!(cksum(icmp), 0);
        assert_eq!(&icmp[ICMP_HDR_LEN..], &frame[ETHER_HDR_LEN..ETHER_HDR_LEN + ICMP_DATA_SIZE]);
    }

    #[test]
    fn ttl_expiry_sends_time_exceeded() {
        let mut r = router();
        let frame = echo_request("192.168.2.2", 1);
        let out = r.handle_packet(&frame, "eth1", Instant::now());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].iface, "eth1");
        let hdr = ip_of(&out[0].frame);
        assert_eq!(hdr.src, ip("10.0.1.1"));
        assert_eq!(hdr.dst, ip("10.0.1.100"));
        let icmp = icmp_of(&out[0].frame);
        assert_eq!((icmp[0], icmp[1]), (ICMP_TIME_EXCEEDED, 0));
        // quoted header still carries the TTL the packet arrived with
        assert_eq!(icmp[ICMP_HDR_LEN + 8], 1);
    }

    #[test]
    fn no_route_sends_net_unreachable() {
        let mut r = router();
        let out = r.handle_packet(&echo_request("8.8.8.8", 64), "eth1", Instant::now());
        assert_eq!(out.len(), 1);
        let icmp = icmp_of(&out[0].frame);
        assert_eq!((icmp[0], icmp[1]), (ICMP_DEST_UNREACHABLE, ICMP_CODE_NET_UNREACHABLE));
    }

    #[test]
    fn icmp_errors_do_not_trigger_errors() {
        let mut r = router();
        let mut icmp = vec![ICMP_TIME_EXCEEDED, 0, 0, 0, 0, 0, 0, 0];
        icmp.extend_from_slice(&[0u8; ICMP_DATA_SIZE]);
        fill_icmp_checksum(&mut icmp);
        let frame = ip_frame(MacAddr([0x02, 0, 0, 0, 0, 1]), "10.0.1.100", "8.8.8.8", 1, IP_PROTOCOL_ICMP, &icmp);
        assert!(r.handle_packet(&frame, "eth1", Instant::now()).is_empty());
    }

    #[test]
    fn forwards_after_arp_resolution() {
        let mut r = router();
        let t0 = Instant::now();
        let req = echo_request("192.168.2.2", 64);

        let out = r.handle_packet(&req, "eth1", t0);
        assert_eq!(out.len(), 1, "expected a single ARP request");
        assert_eq!(out[0].iface, "eth2");
        assert_eq!(EthernetHeader::parse(&out[0].frame).unwrap().dst, MacAddr::BROADCAST);
        let arp = arp_of(&out[0].frame);
        assert_eq!(arp.op, ARP_OP_REQUEST);
        assert_eq!(arp.sip, ip("192.168.2.1"));
        assert_eq!(arp.tip, ip("192.168.2.2"));

        // a second packet joins the same request without another broadcast
        assert!(r.handle_packet(&req, "eth1", t0).is_empty());

        let out = arp_reply_from_server(t0, &mut r);
        assert_eq!(out.len(), 2);
        for fwd in &out {
            assert_eq!(fwd.iface, "eth2");
            let eth = EthernetHeader::parse(&fwd.frame).unwrap();
            assert_eq!(eth.dst, SERVER_MAC);
            assert_eq!(eth.src, MacAddr([0x02, 0, 0, 0, 0, 2]));
            let hdr = ip_of(&fwd.frame);
            assert_eq!(hdr.ttl, 63);
            assert_eq!(cksum(&fwd.frame[ETHER_HDR_LEN..ETHER_HDR_LEN + IP_HDR_LEN]), 0);
            assert_eq!(icmp_of(&fwd.frame), icmp_of(&req));
        }
        assert!(r.arp_cache().pending().is_empty());

        // cache hit: forwarded immediately
        let out = r.handle_packet(&req, "eth1", t0 + Duration::from_secs(1));
        assert_eq!(out.len(), 1);
        assert_eq!(EthernetHeader::parse(&out[0].frame).unwrap().dst, SERVER_MAC);
    }

    #[test]
    fn connected_route_resolves_destination() {
        let mut r = router();
        let out = r.handle_packet(&echo_request("172.64.3.10", 64), "eth1", Instant::now());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].iface, "eth3");
        assert_eq!(arp_of(&out[0].frame).tip, ip("172.64.3.10"));
    }

    #[test]
    fn unanswered_arp_gives_host_unreachable() {
        let mut r = router();
        let t0 = Instant::now();
        let req = echo_request("192.168.2.2", 64);
        assert_eq!(r.handle_packet(&req, "eth1", t0).len(), 1);

        // not yet time to resend
        assert!(r.tick(t0 + Duration::from_millis(500)).is_empty());

        for n in 1..ARP_MAX_SENDS {
            let out = r.tick(t0 + Duration::from_secs(u64::from(n)));
            assert_eq!(out.len(), 1, "resend #{n}");
            assert_eq!(arp_of(&out[0].frame).op, ARP_OP_REQUEST);
        }

        let out = r.tick(t0 + Duration::from_secs(u64::from(ARP_MAX_SENDS)));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].iface, "eth1");
        assert_eq!(EthernetHeader::parse(&out[0].frame).unwrap().dst, CLIENT_MAC);
        let hdr = ip_of(&out[0].frame);
        assert_eq!(hdr.src, ip("10.0.1.1"));
        assert_eq!(hdr.dst, ip("10.0.1.100"));
        let icmp = icmp_of(&out[0].frame);
        assert_eq!((icmp[0], icmp[1]), (ICMP_DEST_UNREACHABLE, ICMP_CODE_HOST_UNREACHABLE));
        assert_eq!(&icmp[ICMP_HDR_LEN..], &req[ETHER_HDR_LEN..ETHER_HDR_LEN + ICMP_DATA_SIZE]);
        assert!(r.arp_cache().pending().is_empty());

        // nothing left to do
        assert!(r.tick(t0 + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn tick_expires_cache_entries() {
        let mut r = router();
        let t0 = Instant::now();
        r.handle_packet(&echo_request("192.168.2.2", 64), "eth1", t0);
        arp_reply_from_server(t0, &mut r);
        assert_eq!(r.arp_cache().entries().len(), 1);
        r.tick(t0 + Duration::from_secs(16));
        assert!(r.arp_cache().entries().is_empty());
    }
}
