use crate::*;
use std::convert::{TryFrom, TryInto};
use std::net::Ipv4Addr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArpOp {
    Request = 1,
    Reply = 2,
}

impl TryFrom<u16> for ArpOp {
    type Error = &'static str;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(ArpOp::Request),
            2 => Ok(ArpOp::Reply),
            _ => Err("Unknown ARP opcode"),
        }
    }
}

pub const ARP_HARDWARE_ETHERNET: u16 = 1;

const HARDWARE_TYPE_RANGE: (usize, usize) = (0, 2);
const PROTOCOL_TYPE_RANGE: (usize, usize) = (2, 4);
const HARDWARE_ADDR_LEN: usize = 4;
const PROTOCOL_ADDR_LEN: usize = 5;
const OPCODE_RANGE: (usize, usize) = (6, 8);
const SENDER_HARDWARE_RANGE: (usize, usize) = (8, 14);
const SENDER_PROTOCOL_RANGE: (usize, usize) = (14, 18);
const TARGET_HARDWARE_RANGE: (usize, usize) = (18, 24);
const TARGET_PROTOCOL_RANGE: (usize, usize) = (24, 28);

///
/// Getters/setters for the Ethernet/IPv4 flavour of the packet structure described in RFC 826
/// https://tools.ietf.org/html/rfc826
///
/// The view covers a whole frame; `layer3_offset` is where the ARP body starts.
///
#[derive(Clone, Debug)]
pub struct ArpPacket<T> {
    pub data: T,
    pub layer3_offset: usize,
}

impl<T: AsRef<[u8]>> ArpPacket<T> {
    pub fn from_buffer(data: T, layer3_offset: usize) -> Result<ArpPacket<T>, &'static str> {
        if data.as_ref().len() < layer3_offset + ARP_PACKET_LEN {
            return Err("Data is too short to be an ARP packet");
        }
        Ok(ArpPacket {
            data,
            layer3_offset,
        })
    }

    fn arp_data(&self, (start, end): (usize, usize)) -> &[u8] {
        &self.data.as_ref()[self.layer3_offset + start..self.layer3_offset + end]
    }

    pub fn hardware_type(&self) -> u16 {
        u16::from_be_bytes(self.arp_data(HARDWARE_TYPE_RANGE).try_into().unwrap())
    }

    pub fn protocol_type(&self) -> u16 {
        u16::from_be_bytes(self.arp_data(PROTOCOL_TYPE_RANGE).try_into().unwrap())
    }

    pub fn hardware_addr_len(&self) -> u8 {
        self.data.as_ref()[self.layer3_offset + HARDWARE_ADDR_LEN]
    }

    pub fn protocol_addr_len(&self) -> u8 {
        self.data.as_ref()[self.layer3_offset + PROTOCOL_ADDR_LEN]
    }

    pub fn opcode(&self) -> u16 {
        u16::from_be_bytes(self.arp_data(OPCODE_RANGE).try_into().unwrap())
    }

    pub fn sender_hardware_addr(&self) -> MacAddr {
        MacAddr::new(self.arp_data(SENDER_HARDWARE_RANGE).try_into().unwrap())
    }

    pub fn sender_protocol_addr(&self) -> Ipv4Addr {
        let octets: [u8; 4] = self.arp_data(SENDER_PROTOCOL_RANGE).try_into().unwrap();
        Ipv4Addr::from(octets)
    }

    pub fn target_hardware_addr(&self) -> MacAddr {
        MacAddr::new(self.arp_data(TARGET_HARDWARE_RANGE).try_into().unwrap())
    }

    pub fn target_protocol_addr(&self) -> Ipv4Addr {
        let octets: [u8; 4] = self.arp_data(TARGET_PROTOCOL_RANGE).try_into().unwrap();
        Ipv4Addr::from(octets)
    }

    /// True for the only flavour this stack speaks: Ethernet hardware addresses
    /// resolving IPv4 protocol addresses.
    pub fn is_ethernet_ipv4(&self) -> bool {
        self.hardware_type() == ARP_HARDWARE_ETHERNET
            && self.protocol_type() == IPV4_ETHER_TYPE
            && self.hardware_addr_len() == 6
            && self.protocol_addr_len() == 4
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> ArpPacket<T> {
    fn set_arp_data(&mut self, value: &[u8], (start, end): (usize, usize)) {
        let offset = self.layer3_offset;
        self.data.as_mut()[offset + start..offset + end].copy_from_slice(value);
    }

    pub fn set_hardware_type(&mut self, htype: u16) {
        self.set_arp_data(&htype.to_be_bytes(), HARDWARE_TYPE_RANGE);
    }

    pub fn set_protocol_type(&mut self, ptype: u16) {
        self.set_arp_data(&ptype.to_be_bytes(), PROTOCOL_TYPE_RANGE);
    }

    pub fn set_hardware_addr_len(&mut self, len: u8) {
        let offset = self.layer3_offset;
        self.data.as_mut()[offset + HARDWARE_ADDR_LEN] = len;
    }

    pub fn set_protocol_addr_len(&mut self, len: u8) {
        let offset = self.layer3_offset;
        self.data.as_mut()[offset + PROTOCOL_ADDR_LEN] = len;
    }

    pub fn set_opcode(&mut self, op: ArpOp) {
        self.set_arp_data(&(op as u16).to_be_bytes(), OPCODE_RANGE);
    }

    pub fn set_sender_hardware_addr(&mut self, addr: MacAddr) {
        self.set_arp_data(&addr.bytes, SENDER_HARDWARE_RANGE);
    }

    pub fn set_sender_protocol_addr(&mut self, addr: Ipv4Addr) {
        self.set_arp_data(&addr.octets(), SENDER_PROTOCOL_RANGE);
    }

    pub fn set_target_hardware_addr(&mut self, addr: MacAddr) {
        self.set_arp_data(&addr.bytes, TARGET_HARDWARE_RANGE);
    }

    pub fn set_target_protocol_addr(&mut self, addr: Ipv4Addr) {
        self.set_arp_data(&addr.octets(), TARGET_PROTOCOL_RANGE);
    }

    /// Writes the fixed Ethernet/IPv4 preamble of the packet.
    pub fn set_ethernet_ipv4(&mut self) {
        self.set_hardware_type(ARP_HARDWARE_ETHERNET);
        self.set_protocol_type(IPV4_ETHER_TYPE);
        self.set_hardware_addr_len(6);
        self.set_protocol_addr_len(4);
    }
}
