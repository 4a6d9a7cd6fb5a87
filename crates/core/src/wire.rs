//! Ethernet, ARP, IPv4 and ICMP headers as they appear on the wire.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

pub const ETHER_ADDR_LEN: usize = 6;
pub const ETHER_HDR_LEN: usize = 14;
pub const ARP_HDR_LEN: usize = 28;
pub const IP_HDR_LEN: usize = 20;
pub const ICMP_HDR_LEN: usize = 8;
pub const ICMP_DATA_SIZE: usize = 28;
/// ICMP type 3 / type 11 message: header plus the quoted datagram.
pub const ICMP_T3_LEN: usize = ICMP_HDR_LEN + ICMP_DATA_SIZE;

pub const ETHERTYPE_IP: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;

pub const ARP_HRD_ETHERNET: u16 = 1;
pub const ARP_OP_REQUEST: u16 = 1;
pub const ARP_OP_REPLY: u16 = 2;

pub const IP_PROTOCOL_ICMP: u8 = 1;
pub const IP_DF: u16 = 0x4000;
pub const INIT_TTL: u8 = 255;

pub const ICMP_ECHO_REPLY: u8 = 0;
pub const ICMP_DEST_UNREACHABLE: u8 = 3;
pub const ICMP_ECHO_REQUEST: u8 = 8;
pub const ICMP_TIME_EXCEEDED: u8 = 11;

pub const ICMP_CODE_NET_UNREACHABLE: u8 = 0;
pub const ICMP_CODE_HOST_UNREACHABLE: u8 = 1;
pub const ICMP_CODE_PORT_UNREACHABLE: u8 = 3;

/// A 48-bit Ethernet hardware address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; ETHER_ADDR_LEN]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; ETHER_ADDR_LEN]);
    pub const ZERO: MacAddr = MacAddr([0; ETHER_ADDR_LEN]);

    fn from_slice(bytes: &[u8]) -> Self {
        let mut mac = [0u8; ETHER_ADDR_LEN];
        mac.copy_from_slice(&bytes[..ETHER_ADDR_LEN]);
        MacAddr(mac)
    }

    pub fn octets(&self) -> [u8; ETHER_ADDR_LEN] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMacError(String);

impl fmt::Display for ParseMacError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid MAC address: {}", self.0)
    }
}

impl std::error::Error for ParseMacError {}

impl FromStr for MacAddr {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mac = [0u8; ETHER_ADDR_LEN];
        let mut parts = s.split([':', '-']);
        for byte in mac.iter_mut() {
            let part = parts.next().ok_or_else(|| ParseMacError(s.into()))?;
            if part.len() != 2 {
                return Err(ParseMacError(s.into()));
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| ParseMacError(s.into()))?;
        }
        if parts.next().is_some() {
            return Err(ParseMacError(s.into()));
        }
        Ok(MacAddr(mac))
    }
}

/// Internet checksum (RFC 1071) over `data`.
///
/// Computing it over a header whose checksum field is already filled in
/// yields zero when the header is intact.
pub fn cksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for pair in &mut chunks {
        sum += u32::from(u16::from_be_bytes([pair[0], pair[1]]));
    }
    if let [last] = chunks.remainder() {
        sum += u32::from(*last) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

fn be16(buf: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}

fn ip_at(buf: &[u8], at: usize) -> Ipv4Addr {
    Ipv4Addr::new(buf[at], buf[at + 1], buf[at + 2], buf[at + 3])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub ethertype: u16,
}

impl EthernetHeader {
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < ETHER_HDR_LEN {
            return None;
        }
        Some(Self {
            dst: MacAddr::from_slice(&buf[0..6]),
            src: MacAddr::from_slice(&buf[6..12]),
            ethertype: be16(buf, 12),
        })
    }

    pub fn write(&self, buf: &mut [u8]) {
        buf[0..6].copy_from_slice(&self.dst.0);
        buf[6..12].copy_from_slice(&self.src.0);
        buf[12..14].copy_from_slice(&self.ethertype.to_be_bytes());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpHeader {
    pub hrd: u16,
    pub pro: u16,
    pub hln: u8,
    pub pln: u8,
    pub op: u16,
    pub sha: MacAddr,
    pub sip: Ipv4Addr,
    pub tha: MacAddr,
    pub tip: Ipv4Addr,
}

impl ArpHeader {
    /// An Ethernet/IPv4 ARP header with the given operation and addresses.
    pub fn ethernet_ipv4(
        op: u16,
        sha: MacAddr,
        sip: Ipv4Addr,
        tha: MacAddr,
        tip: Ipv4Addr,
    ) -> Self {
        Self {
            hrd: ARP_HRD_ETHERNET,
            pro: ETHERTYPE_IP,
            hln: ETHER_ADDR_LEN as u8,
            pln: 4,
            op,
            sha,
            sip,
            tha,
            tip,
        }
    }

    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < ARP_HDR_LEN {
            return None;
        }
        Some(Self {
            hrd: be16(buf, 0),
            pro: be16(buf, 2),
            hln: buf[4],
            pln: buf[5],
            op: be16(buf, 6),
            sha: MacAddr::from_slice(&buf[8..14]),
            sip: ip_at(buf, 14),
            tha: MacAddr::from_slice(&buf[18..24]),
            tip: ip_at(buf, 24),
        })
    }

    pub fn write(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.hrd.to_be_bytes());
        buf[2..4].copy_from_slice(&self.pro.to_be_bytes());
        buf[4] = self.hln;
        buf[5] = self.pln;
        buf[6..8].copy_from_slice(&self.op.to_be_bytes());
        buf[8..14].copy_from_slice(&self.sha.0);
        buf[14..18].copy_from_slice(&self.sip.octets());
        buf[18..24].copy_from_slice(&self.tha.0);
        buf[24..28].copy_from_slice(&self.tip.octets());
    }
}

/// Fixed part of an IPv4 header. Options, if any, are left in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub version: u8,
    pub ihl: u8,
    pub tos: u8,
    pub total_len: u16,
    pub id: u16,
    pub frag_off: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
}

impl Ipv4Header {
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < IP_HDR_LEN {
            return None;
        }
        Some(Self {
            version: buf[0] >> 4,
            ihl: buf[0] & 0x0f,
            tos: buf[1],
            total_len: be16(buf, 2),
            id: be16(buf, 4),
            frag_off: be16(buf, 6),
            ttl: buf[8],
            protocol: buf[9],
            checksum: be16(buf, 10),
            src: ip_at(buf, 12),
            dst: ip_at(buf, 16),
        })
    }

    /// Header length in bytes, options included.
    pub fn header_len(&self) -> usize {
        usize::from(self.ihl) * 4
    }

    /// Write the fixed 20-byte header, checksum field as stored in `self`.
    pub fn write(&self, buf: &mut [u8]) {
        buf[0] = (self.version << 4) | (self.ihl & 0x0f);
        buf[1] = self.tos;
        buf[2..4].copy_from_slice(&self.total_len.to_be_bytes());
        buf[4..6].copy_from_slice(&self.id.to_be_bytes());
        buf[6..8].copy_from_slice(&self.frag_off.to_be_bytes());
        buf[8] = self.ttl;
        buf[9] = self.protocol;
        buf[10..12].copy_from_slice(&self.checksum.to_be_bytes());
        buf[12..16].copy_from_slice(&self.src.octets());
        buf[16..20].copy_from_slice(&self.dst.octets());
    }
}

/// Recompute the checksum of the IPv4 header occupying `header`.
pub fn fill_ip_checksum(header: &mut [u8]) {
    header[10..12].copy_from_slice(&[0, 0]);
    let sum = cksum(header);
    header[10..12].copy_from_slice(&sum.to_be_bytes());
}

/// Recompute the checksum of the ICMP message occupying `msg`.
pub fn fill_icmp_checksum(msg: &mut [u8]) {
    msg[2..4].copy_from_slice(&[0, 0]);
    let sum = cksum(msg);
    msg[2..4].copy_from_slice(&sum.to_be_bytes());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpHeader {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
}

impl IcmpHeader {
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < 4 {
            return None;
        }
        Some(Self {
            icmp_type: buf[0],
            code: buf[1],
            checksum: be16(buf, 2),
        })
    }
}

/// Build a complete ARP frame.
pub fn arp_frame(eth_dst: MacAddr, eth_src: MacAddr, arp: &ArpHeader) -> Vec<u8> {
    let mut frame = vec![0u8; ETHER_HDR_LEN + ARP_HDR_LEN];
    EthernetHeader {
        dst: eth_dst,
        src: eth_src,
        ethertype: ETHERTYPE_ARP,
    }
    .write(&mut frame);
    arp.write(&mut frame[ETHER_HDR_LEN..]);
    frame
}

/// Addressing for an ICMP error frame.
#[derive(Debug, Clone, Copy)]
pub struct IcmpErrorAddr {
    pub eth_src: MacAddr,
    pub eth_dst: MacAddr,
    pub ip_src: Ipv4Addr,
}

/// Build an ICMP destination-unreachable or time-exceeded frame quoting
/// the first [`ICMP_DATA_SIZE`] bytes of `orig_ip`, the offending datagram.
pub fn icmp_error_frame(icmp_type: u8, code: u8, addr: IcmpErrorAddr, orig_ip: &[u8]) -> Vec<u8> {
    let ip_len = IP_HDR_LEN + ICMP_T3_LEN;
    let mut frame = vec![0u8; ETHER_HDR_LEN + ip_len];
    EthernetHeader {
        dst: addr.eth_dst,
        src: addr.eth_src,
        ethertype: ETHERTYPE_IP,
    }
    .write(&mut frame);

    let orig = Ipv4Header::parse(orig_ip);
    let ip = Ipv4Header {
        version: 4,
        ihl: 5,
        tos: 0,
        total_len: ip_len as u16,
        id: orig.map_or(0, |h| h.id),
        frag_off: IP_DF,
        ttl: INIT_TTL,
        protocol: IP_PROTOCOL_ICMP,
        checksum: 0,
        src: addr.ip_src,
        dst: orig.map_or(Ipv4Addr::UNSPECIFIED, |h| h.src),
    };
    let (_, rest) = frame.split_at_mut(ETHER_HDR_LEN);
    let (ip_buf, icmp_buf) = rest.split_at_mut(IP_HDR_LEN);
    ip.write(ip_buf);
    fill_ip_checksum(ip_buf);

    icmp_buf[0] = icmp_type;
    icmp_buf[1] = code;
    let quoted = orig_ip.len().min(ICMP_DATA_SIZE);
    icmp_buf[ICMP_HDR_LEN..ICMP_HDR_LEN + quoted].copy_from_slice(&orig_ip[..quoted]);
    fill_icmp_checksum(icmp_buf);
    frame
}

/// Render the headers of `frame` for debug logging, one header per line.
pub fn describe(frame: &[u8]) -> String {
    let Some(eth) = EthernetHeader::parse(frame) else {
        return format!("truncated ethernet frame ({} bytes)", frame.len());
    };
    let mut out = format!(
        "ETHERNET dst {} src {} type {:#06x}",
        eth.dst, eth.src, eth.ethertype
    );
    let payload = &frame[ETHER_HDR_LEN..];
    match eth.ethertype {
        ETHERTYPE_ARP => match ArpHeader::parse(payload) {
            Some(arp) => out.push_str(&format!(
                "\nARP op {} sha {} sip {} tha {} tip {}",
                arp.op, arp.sha, arp.sip, arp.tha, arp.tip
            )),
            None => out.push_str("\ntruncated ARP header"),
        },
        ETHERTYPE_IP => match Ipv4Header::parse(payload) {
            Some(ip) => {
                out.push_str(&format!(
                    "\nIP v{} hl {} len {} id {} off {:#06x} ttl {} proto {} sum {:#06x} src {} dst {}",
                    ip.version,
                    ip.ihl,
                    ip.total_len,
                    ip.id,
                    ip.frag_off,
                    ip.ttl,
                    ip.protocol,
                    ip.checksum,
                    ip.src,
                    ip.dst
                ));
                if ip.protocol == IP_PROTOCOL_ICMP {
                    let icmp = payload
                        .get(ip.header_len()..)
                        .and_then(IcmpHeader::parse);
                    match icmp {
                        Some(icmp) => out.push_str(&format!(
                            "\nICMP type {} code {} sum {:#06x}",
                            icmp.icmp_type, icmp.code, icmp.checksum
                        )),
                        None => out.push_str("\ntruncated ICMP header"),
                    }
                }
            }
            None => out.push_str("\ntruncated IP header"),
        },
        other => out.push_str(&format!("\nunrecognized ethertype {other:#06x}")),
    }
    out
}
