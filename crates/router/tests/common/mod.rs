#![allow(dead_code)]

use std::net::Ipv4Addr;

use srouter_core::wire::{
    ARP_OP_REQUEST, ArpHeader, ETHER_HDR_LEN, ETHERTYPE_IP, EthernetHeader, ICMP_ECHO_REQUEST,
    IP_HDR_LEN, IP_PROTOCOL_ICMP, Ipv4Header, MacAddr, arp_frame, fill_icmp_checksum,
    fill_ip_checksum,
};
use srouter_core::{Interface, Interfaces, Router, RoutingTable};
use srouter_proto::HwInterface;

pub const HOST_MAC: MacAddr = MacAddr([0x0a, 0, 0, 0, 0, 0x64]);
pub const HOST_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 1, 100);
pub const ETH1_MAC: [u8; 6] = [0x02, 0, 0, 0, 0, 1];
pub const ETH1_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 1, 1);

pub const RTABLE: &str = "0.0.0.0 10.0.1.100 0.0.0.0 eth1\n";

pub fn hw() -> Vec<HwInterface> {
    vec![
        HwInterface {
            name: "eth1".into(),
            mac: ETH1_MAC,
            ip: ETH1_IP,
            mask: Ipv4Addr::new(255, 255, 255, 0),
        },
        HwInterface {
            name: "eth2".into(),
            mac: [0x02, 0, 0, 0, 0, 2],
            ip: Ipv4Addr::new(192, 168, 2, 1),
            mask: Ipv4Addr::new(255, 255, 255, 0),
        },
    ]
}

pub fn router() -> Router {
    let ifaces = Interfaces::new(hw().iter().map(|h| Interface::try_from(h).unwrap()).collect()).unwrap();
    Router::new(ifaces, RoutingTable::parse(RTABLE).unwrap())
}

/// Host asking who has `tip`.
pub fn arp_request(tip: Ipv4Addr) -> Vec<u8> {
    let arp = ArpHeader::ethernet_ipv4(ARP_OP_REQUEST, HOST_MAC, HOST_IP, MacAddr::ZERO, tip);
    arp_frame(MacAddr::BROADCAST, HOST_MAC, &arp)
}

/// Echo request from the host to `dst`.
pub fn echo_request(dst: Ipv4Addr, ttl: u8) -> Vec<u8> {
    let mut icmp = vec![ICMP_ECHO_REQUEST, 0, 0, 0, 0, 7, 0, 1];
    icmp.extend_from_slice(b"abcdefgh");
    fill_icmp_checksum(&mut icmp);

    let mut frame = vec![0u8; ETHER_HDR_LEN + IP_HDR_LEN + icmp.len()];
    EthernetHeader {
        dst: MacAddr(ETH1_MAC),
        src: HOST_MAC,
        ethertype: ETHERTYPE_IP,
    }
    .write(&mut frame);
    let ip = &mut frame[ETHER_HDR_LEN..];
    Ipv4Header {
        version: 4,
        ihl: 5,
        tos: 0,
        total_len: (IP_HDR_LEN + icmp.len()) as u16,
        id: 99,
        frag_off: 0,
        ttl,
        protocol: IP_PROTOCOL_ICMP,
        checksum: 0,
        src: HOST_IP,
        dst,
    }
    .write(ip);
    fill_ip_checksum(&mut ip[..IP_HDR_LEN]);
    ip[IP_HDR_LEN..].copy_from_slice(&icmp);
    frame
}
