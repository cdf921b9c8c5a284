use lan_rs_packets::*;
use std::net::Ipv4Addr;

pub const OUR_MAC: MacAddr = MacAddr {
    bytes: [0x00, 0x13, 0x37, 0x01, 0x23, 0x45],
};
pub const OUR_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
pub const GATEWAY: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 254);
pub const PEER_MAC: MacAddr = MacAddr {
    bytes: [0xde, 0xad, 0xbe, 0xef, 0x00, 0x05],
};
pub const PEER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);

const LAYER4_OFFSET: usize = ETHERNET_HEADER_LEN + IPV4_HEADER_LEN;

fn ethernet(data: &mut [u8], src: MacAddr, dest: MacAddr, ether_type: u16) {
    let mut frame = EthernetFrame::from_buffer(data).unwrap();
    frame.set_src_mac(src);
    frame.set_dest_mac(dest);
    frame.set_ether_type(ether_type);
}

fn ipv4(data: &mut [u8], src: Ipv4Addr, dest: Ipv4Addr, protocol: IpProtocol, len: usize) {
    let total_len = (IPV4_HEADER_LEN + len) as u16;
    let mut ip = write_ipv4_header(data, ETHERNET_HEADER_LEN, total_len, 64, protocol).unwrap();
    ip.set_src_addr(src);
    ip.set_dest_addr(dest);
    ip.set_checksum();
}

/// UDP datagram from the peer to `dest_ip:dest_port`, with valid IP and UDP checksums.
pub fn udp_frame(
    src_port: u16,
    dest_ip: Ipv4Addr,
    dest_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let mut data = vec![0u8; UDP_PAYLOAD_OFFSET + payload.len()];
    data[UDP_PAYLOAD_OFFSET..].copy_from_slice(payload);
    ethernet(&mut data, PEER_MAC, OUR_MAC, IPV4_ETHER_TYPE);
    ipv4(
        &mut data,
        PEER_IP,
        dest_ip,
        IpProtocol::UDP,
        UDP_HEADER_LEN + payload.len(),
    );
    let mut udp =
        write_udp_header(&mut data, LAYER4_OFFSET, src_port, dest_port, payload.len()).unwrap();
    udp.set_checksum(PEER_IP, dest_ip);
    data
}

/// ARP frame sent by `sender_mac`/`sender_ip`, asking for or answering about `target_ip`.
pub fn arp_frame(
    op: ArpOp,
    sender_mac: MacAddr,
    sender_ip: Ipv4Addr,
    target_mac: MacAddr,
    target_ip: Ipv4Addr,
) -> Vec<u8> {
    let mut data = vec![0u8; ETHERNET_HEADER_LEN + ARP_PACKET_LEN];
    let dest = match op {
        ArpOp::Request => MacAddr::BROADCAST,
        ArpOp::Reply => target_mac,
    };
    ethernet(&mut data, sender_mac, dest, ARP_ETHER_TYPE);
    let mut arp = ArpPacket::from_buffer(&mut data[..], ETHERNET_HEADER_LEN).unwrap();
    arp.set_ethernet_ipv4();
    arp.set_opcode(op);
    arp.set_sender_hardware_addr(sender_mac);
    arp.set_sender_protocol_addr(sender_ip);
    arp.set_target_hardware_addr(target_mac);
    arp.set_target_protocol_addr(target_ip);
    data
}

/// Reply from `ip` at `mac` to a request we made.
pub fn arp_reply_to_us(ip: Ipv4Addr, mac: MacAddr) -> Vec<u8> {
    arp_frame(ArpOp::Reply, mac, ip, OUR_MAC, OUR_IP)
}

pub fn icmp_echo_request(dest_ip: Ipv4Addr, id: u16, seq: u16, data: &[u8]) -> Vec<u8> {
    let icmp_len = ICMP_HEADER_LEN + data.len();
    let mut frame = vec![0u8; LAYER4_OFFSET + icmp_len];
    ethernet(&mut frame, PEER_MAC, OUR_MAC, IPV4_ETHER_TYPE);
    ipv4(&mut frame, PEER_IP, dest_ip, IpProtocol::ICMP, icmp_len);
    frame[LAYER4_OFFSET] = ICMP_ECHO_REQUEST;
    frame[LAYER4_OFFSET + 4..LAYER4_OFFSET + 6].copy_from_slice(&id.to_be_bytes());
    frame[LAYER4_OFFSET + 6..LAYER4_OFFSET + 8].copy_from_slice(&seq.to_be_bytes());
    frame[LAYER4_OFFSET + ICMP_HEADER_LEN..].copy_from_slice(data);
    let end = frame.len();
    IcmpPacket::from_buffer(&mut frame[..], LAYER4_OFFSET, end)
        .unwrap()
        .set_checksum();
    frame
}

/// Pads a frame to the 60 byte Ethernet minimum, as a real controller hands it over.
pub fn padded(mut frame: Vec<u8>) -> Vec<u8> {
    if frame.len() < 60 {
        frame.resize(60, 0);
    }
    frame
}
