use crate::driver::Driver;
use crate::error::LanError;
use crate::pool::FrameBuf;
use crate::socket::{Datagram, Delivery};
use crate::stack::{LanStack, PollOutcome};
use crate::stats::bump;
use lan_rs_packets::*;
use log::{debug, trace, warn};
use std::convert::TryFrom;
use std::net::Ipv4Addr;

const LAYER3_OFFSET: usize = ETHERNET_HEADER_LEN;
const LAYER4_OFFSET: usize = ETHERNET_HEADER_LEN + IPV4_HEADER_LEN;

// Ingress: every path ends with the buffer either owned by a socket or dropped back into
// the pool. Nothing here reports an error to the caller; bad input is counted and dropped.
impl<D: Driver> LanStack<D> {
    fn malformed(&self, reason: &'static str) -> PollOutcome {
        bump(&self.counters.malformed_frames);
        trace!("dropping malformed frame: {}", reason);
        PollOutcome::Handled
    }

    pub(crate) fn dispatch_frame(&self, buffer: FrameBuf) -> PollOutcome {
        let (dest_mac, ether_type) = match EthernetFrame::from_buffer(buffer.as_slice()) {
            Ok(frame) => (frame.dest_mac(), frame.ether_type()),
            Err(err) => return self.malformed(err),
        };
        if dest_mac != self.config.mac && !dest_mac.is_broadcast() {
            bump(&self.counters.eth_filter_misses);
            return PollOutcome::Handled;
        }

        match ether_type {
            ARP_ETHER_TYPE => self.arp_input(buffer),
            IPV4_ETHER_TYPE => self.ip_input(buffer),
            other => {
                trace!("dropping frame with ether type {:#06x}", other);
                bump(&self.counters.eth_filter_misses);
                PollOutcome::Handled
            }
        }
    }

    fn arp_input(&self, mut buffer: FrameBuf) -> PollOutcome {
        let (opcode, sender_mac, sender_ip) =
            match ArpPacket::from_buffer(buffer.as_slice(), LAYER3_OFFSET) {
                Ok(arp) => {
                    if !arp.is_ethernet_ipv4() || arp.target_protocol_addr() != self.config.ip {
                        bump(&self.counters.eth_filter_misses);
                        return PollOutcome::Handled;
                    }
                    (
                        arp.opcode(),
                        arp.sender_hardware_addr(),
                        arp.sender_protocol_addr(),
                    )
                }
                Err(err) => return self.malformed(err),
            };

        match ArpOp::try_from(opcode) {
            Ok(ArpOp::Request) => {
                trace!("arp: {} asks for us", sender_ip);
                if let Err(err) = self.arp_reply(&mut buffer, sender_mac, sender_ip) {
                    warn!("arp: reply to {} failed: {}", sender_ip, err);
                }
            }
            Ok(ArpOp::Reply) => self.arp.upsert(sender_ip, sender_mac),
            Err(err) => return self.malformed(err),
        }
        PollOutcome::Handled
    }

    fn arp_reply(
        &self,
        buffer: &mut FrameBuf,
        sender_mac: MacAddr,
        sender_ip: Ipv4Addr,
    ) -> Result<(), LanError> {
        let mut arp =
            ArpPacket::from_buffer(buffer.as_mut_slice(), LAYER3_OFFSET).map_err(LanError::Frame)?;
        arp.set_opcode(ArpOp::Reply);
        arp.set_target_hardware_addr(sender_mac);
        arp.set_target_protocol_addr(sender_ip);
        arp.set_sender_hardware_addr(self.config.mac);
        arp.set_sender_protocol_addr(self.config.ip);
        self.eth_reply(buffer)
    }

    fn ip_input(&self, buffer: FrameBuf) -> PollOutcome {
        let (protocol, src, dest, total_len) =
            match Ipv4Packet::from_buffer(buffer.as_slice(), LAYER3_OFFSET) {
                Ok(ip) => {
                    if ip.version_ihl() != 0x45
                        || !ip.validate_checksum()
                        || !self.config.accepts(ip.dest_addr())
                    {
                        bump(&self.counters.ip_filter_misses);
                        return PollOutcome::Handled;
                    }
                    (
                        ip.protocol(),
                        ip.src_addr(),
                        ip.dest_addr(),
                        ip.total_len() as usize,
                    )
                }
                Err(err) => return self.malformed(err),
            };

        match protocol {
            IpProtocol::ICMP => self.icmp_input(buffer, LAYER3_OFFSET + total_len),
            IpProtocol::UDP => self.udp_input(buffer, src, dest, LAYER3_OFFSET + total_len),
            other => {
                trace!("dropping {:?} packet from {}", other, src);
                bump(&self.counters.ip_filter_misses);
                PollOutcome::Handled
            }
        }
    }

    fn icmp_input(&self, mut buffer: FrameBuf, end: usize) -> PollOutcome {
        let is_echo_request = match IcmpPacket::from_buffer(buffer.as_slice(), LAYER4_OFFSET, end)
        {
            Ok(icmp) => icmp.icmp_type() == ICMP_ECHO_REQUEST,
            Err(err) => return self.malformed(err),
        };
        if is_echo_request {
            // Trailing link padding is not part of the echo data.
            buffer.set_len(end);
            if let Err(err) = self.echo_reply(&mut buffer, end) {
                warn!("icmp: echo reply failed: {}", err);
            }
        }
        PollOutcome::Handled
    }

    fn echo_reply(&self, buffer: &mut FrameBuf, end: usize) -> Result<(), LanError> {
        let mut icmp = IcmpPacket::from_buffer(buffer.as_mut_slice(), LAYER4_OFFSET, end)
            .map_err(LanError::Frame)?;
        icmp.set_icmp_type(ICMP_ECHO_REPLY);
        icmp.set_checksum();
        self.ip_reply(buffer)?;
        self.eth_reply(buffer)
    }

    fn udp_input(
        &self,
        buffer: FrameBuf,
        src: Ipv4Addr,
        dest: Ipv4Addr,
        end: usize,
    ) -> PollOutcome {
        // The UDP length must fit inside the IP packet, not just inside the padded frame.
        let datagram = match UdpSegment::from_buffer(&buffer.as_slice()[..end], LAYER4_OFFSET) {
            Ok(udp) => Datagram {
                src_ip: src,
                src_port: udp.src_port(),
                dest_ip: dest,
                dest_port: udp.dest_port(),
                payload_len: udp.payload().len(),
            },
            Err(err) => return self.malformed(err),
        };

        match self.sockets.deliver(datagram, buffer) {
            Delivery::Delivered {
                handle,
                data_lost,
                displaced,
            } => {
                drop(displaced);
                bump(&self.counters.udp_delivered);
                if data_lost {
                    bump(&self.counters.data_lost);
                    warn!(
                        "socket {}: unread datagram overwritten by one from {}:{}",
                        handle.index(),
                        datagram.src_ip,
                        datagram.src_port
                    );
                }
                PollOutcome::Consumed
            }
            Delivery::Unmatched(_) => {
                bump(&self.counters.udp_unmatched);
                trace!(
                    "no socket for {}:{} -> port {}",
                    datagram.src_ip,
                    datagram.src_port,
                    datagram.dest_port
                );
                PollOutcome::Handled
            }
        }
    }
}

// Egress. Replies reuse the inbound buffer and its addresses; fresh sends go through ARP.
impl<D: Driver> LanStack<D> {
    pub(crate) fn transmit(&self, frame: &[u8]) -> Result<(), LanError> {
        let result = self.driver.lock().unwrap().transmit(frame);
        match result {
            Ok(()) => {
                bump(&self.counters.frames_transmitted);
                trace!("transmitted {} byte frame", frame.len());
                Ok(())
            }
            Err(err) => {
                bump(&self.counters.driver_errors);
                Err(LanError::Io(err))
            }
        }
    }

    /// Sends the frame back where it came from, with our MAC as source.
    fn eth_reply(&self, buffer: &mut FrameBuf) -> Result<(), LanError> {
        let mut frame = EthernetFrame::from_buffer(buffer.as_mut_slice()).map_err(LanError::Frame)?;
        frame.swap_for_reply(self.config.mac);
        self.transmit(buffer.as_slice())
    }

    /// Addresses the IP header back to its sender, from us.
    fn ip_reply(&self, buffer: &mut FrameBuf) -> Result<(), LanError> {
        let mut ip =
            Ipv4Packet::from_buffer(buffer.as_mut_slice(), LAYER3_OFFSET).map_err(LanError::Frame)?;
        let sender = ip.src_addr();
        ip.set_dest_addr(sender);
        ip.set_src_addr(self.config.ip);
        ip.set_ttl(self.config.ttl);
        ip.set_checksum();
        Ok(())
    }

    pub(crate) fn eth_send(
        &self,
        buffer: &mut FrameBuf,
        dest_mac: MacAddr,
        ether_type: u16,
    ) -> Result<(), LanError> {
        let mut frame = EthernetFrame::from_buffer(buffer.as_mut_slice()).map_err(LanError::Frame)?;
        frame.set_dest_mac(dest_mac);
        frame.set_src_mac(self.config.mac);
        frame.set_ether_type(ether_type);
        self.transmit(buffer.as_slice())
    }

    /// Writes a complete IPv4 header in front of a `len` byte payload.
    fn ip_fill(
        &self,
        buffer: &mut FrameBuf,
        dest: Ipv4Addr,
        protocol: IpProtocol,
        len: usize,
    ) -> Result<(), LanError> {
        let total_len = (IPV4_HEADER_LEN + len) as u16;
        let mut ip = write_ipv4_header(
            buffer.as_mut_slice(),
            LAYER3_OFFSET,
            total_len,
            self.config.ttl,
            protocol,
        )
        .map_err(LanError::Frame)?;
        ip.set_src_addr(self.config.ip);
        ip.set_dest_addr(dest);
        ip.set_checksum();
        Ok(())
    }

    /// Routes toward `dest`: resolves the next hop, then fills the IP and Ethernet headers.
    pub(crate) fn ip_send(
        &self,
        buffer: &mut FrameBuf,
        dest: Ipv4Addr,
        protocol: IpProtocol,
        len: usize,
    ) -> Result<(), LanError> {
        let dest_mac = if self.config.is_broadcast(dest) {
            MacAddr::BROADCAST
        } else {
            let hop = self.config.next_hop(dest);
            self.resolve(hop).ok_or(LanError::ArpUnresolved(hop))?
        };
        self.ip_fill(buffer, dest, protocol, len)?;
        self.eth_send(buffer, dest_mac, IPV4_ETHER_TYPE)
    }

    fn udp_fill(
        &self,
        buffer: &mut FrameBuf,
        src_port: u16,
        dest: Ipv4Addr,
        dest_port: u16,
        payload_len: usize,
    ) -> Result<(), LanError> {
        let mut udp = write_udp_header(
            buffer.as_mut_slice(),
            LAYER4_OFFSET,
            src_port,
            dest_port,
            payload_len,
        )
        .map_err(LanError::Frame)?;
        udp.set_checksum(self.config.ip, dest);
        Ok(())
    }

    /// Sends the `payload_len` bytes already placed at the UDP payload offset.
    pub(crate) fn udp_send(
        &self,
        buffer: &mut FrameBuf,
        src_port: u16,
        dest: Ipv4Addr,
        dest_port: u16,
        payload_len: usize,
    ) -> Result<(), LanError> {
        self.udp_fill(buffer, src_port, dest, dest_port, payload_len)?;
        self.ip_send(buffer, dest, IpProtocol::UDP, UDP_HEADER_LEN + payload_len)
    }

    /// Turns a received datagram around with `data` as its new payload.
    pub(crate) fn udp_reply(&self, buffer: &mut FrameBuf, data: &[u8]) -> Result<(), LanError> {
        let (peer_mac, peer_ip, peer_port, our_port) = {
            let frame = buffer.as_slice();
            let eth = EthernetFrame::from_buffer(frame).map_err(LanError::Frame)?;
            let ip = Ipv4Packet::from_buffer(frame, LAYER3_OFFSET).map_err(LanError::Frame)?;
            let udp = UdpSegment::from_buffer(frame, LAYER4_OFFSET).map_err(LanError::Frame)?;
            (eth.src_mac(), ip.src_addr(), udp.src_port(), udp.dest_port())
        };
        buffer.set_len(UDP_PAYLOAD_OFFSET + data.len());
        buffer.as_mut_slice()[UDP_PAYLOAD_OFFSET..].copy_from_slice(data);
        self.udp_fill(buffer, our_port, peer_ip, peer_port, data.len())?;
        self.ip_fill(buffer, peer_ip, IpProtocol::UDP, UDP_HEADER_LEN + data.len())?;
        self.eth_send(buffer, peer_mac, IPV4_ETHER_TYPE)
    }

    fn send_arp_request(&self, target: Ipv4Addr) -> Result<(), LanError> {
        let mut buffer = self.acquire_buffer().ok_or(LanError::BufferExhausted)?;
        buffer.set_len(ETHERNET_HEADER_LEN + ARP_PACKET_LEN);
        let mut arp =
            ArpPacket::from_buffer(buffer.as_mut_slice(), LAYER3_OFFSET).map_err(LanError::Frame)?;
        arp.set_ethernet_ipv4();
        arp.set_opcode(ArpOp::Request);
        arp.set_sender_hardware_addr(self.config.mac);
        arp.set_sender_protocol_addr(self.config.ip);
        arp.set_target_hardware_addr(MacAddr::ZERO);
        arp.set_target_protocol_addr(target);
        self.eth_send(&mut buffer, MacAddr::BROADCAST, ARP_ETHER_TYPE)
    }

    /// MAC of `ip`, from the cache or by asking. Each attempt broadcasts a request and waits
    /// for the reply to be learned by the polling task.
    pub fn resolve(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        if let Some(mac) = self.arp.lookup(ip) {
            return Some(mac);
        }
        bump(&self.counters.arp_misses);
        debug!("arp: resolving {}", ip);
        for _ in 0..self.config.arp_retries {
            if let Err(err) = self.send_arp_request(ip) {
                debug!("arp: request for {} not sent: {}", ip, err);
            }
            if let Some(mac) = self.arp.wait_for(ip, self.config.arp_attempt_timeout) {
                return Some(mac);
            }
        }
        bump(&self.counters.arp_failures);
        warn!("arp: no reply from {}", ip);
        None
    }
}
