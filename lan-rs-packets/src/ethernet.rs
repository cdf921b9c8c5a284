use crate::*;
use std::convert::TryInto;

/// Typed view over an Ethernet II frame held in any byte buffer.
#[derive(Clone, Debug)]
pub struct EthernetFrame<T> {
    pub data: T,
    pub payload_offset: usize,
}

impl<T: AsRef<[u8]>> EthernetFrame<T> {
    pub fn from_buffer(data: T) -> Result<EthernetFrame<T>, &'static str> {
        // Ethernet II frames must be at least the header, which is 14bytes
        // 0                    6                    12                      14
        // |---6 byte Dest_MAC--|---6 byte Src_MAC---|--2 Byte EtherType---|
        if data.as_ref().len() < ETHERNET_HEADER_LEN {
            return Err("Frame is less than the minimum of 14 bytes");
        }

        Ok(EthernetFrame {
            data,
            payload_offset: ETHERNET_HEADER_LEN,
        })
    }

    pub fn dest_mac(&self) -> MacAddr {
        MacAddr::new(self.data.as_ref()[0..6].try_into().unwrap())
    }

    pub fn src_mac(&self) -> MacAddr {
        MacAddr::new(self.data.as_ref()[6..12].try_into().unwrap())
    }

    pub fn ether_type(&self) -> u16 {
        u16::from_be_bytes(self.data.as_ref()[12..=13].try_into().unwrap())
    }

    pub fn payload(&self) -> &[u8] {
        &self.data.as_ref()[self.payload_offset..]
    }

    pub fn into_inner(self) -> T {
        self.data
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> EthernetFrame<T> {
    pub fn set_dest_mac(&mut self, mac: MacAddr) {
        self.data.as_mut()[..6].copy_from_slice(&mac.bytes);
    }

    pub fn set_src_mac(&mut self, mac: MacAddr) {
        self.data.as_mut()[6..12].copy_from_slice(&mac.bytes);
    }

    pub fn set_ether_type(&mut self, ether_type: u16) {
        self.data.as_mut()[12..=13].copy_from_slice(&ether_type.to_be_bytes());
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        let offset = self.payload_offset;
        &mut self.data.as_mut()[offset..]
    }

    /// Turns a received frame around: the old source becomes the destination and
    /// `our_mac` becomes the source.
    pub fn swap_for_reply(&mut self, our_mac: MacAddr) {
        let sender = self.src_mac();
        self.set_dest_mac(sender);
        self.set_src_mac(our_mac);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ethernet_frame() {
        let data: Vec<u8> = vec![0xde, 0xad, 0xbe, 0xef, 0xff, 0xff, 1, 2, 3, 4, 5, 6, 0, 0];
        let frame = EthernetFrame::from_buffer(data).unwrap();
        assert_eq!(
            frame.dest_mac(),
            MacAddr::new([0xde, 0xad, 0xbe, 0xef, 0xff, 0xff])
        );
        assert_eq!(frame.src_mac(), MacAddr::new([1, 2, 3, 4, 5, 6]));
        assert_eq!(frame.ether_type(), 0);
        assert_eq!(frame.payload().len(), 0);
    }

    #[test]
    #[should_panic(expected = "Frame is less than the minimum of 14 bytes")]
    fn invalid_data_length() {
        let data: Vec<u8> = vec![0xde, 0xad, 0xbe, 0xef, 0xff, 0xff, 1, 2, 3, 4, 5, 6];
        let _frame = EthernetFrame::from_buffer(data).unwrap();
    }

    #[test]
    fn setters_on_borrowed_slice() {
        let mut data = [0u8; 20];
        let mut frame = EthernetFrame::from_buffer(&mut data[..]).unwrap();
        let new_dest = MacAddr::new([0x98, 0x88, 0x18, 0x12, 0xb4, 0xdf]);
        frame.set_dest_mac(new_dest);
        frame.set_src_mac(MacAddr::BROADCAST);
        frame.set_ether_type(IPV4_ETHER_TYPE);
        frame.payload_mut()[0] = 0x45;
        assert_eq!(frame.dest_mac(), new_dest);
        assert!(frame.src_mac().is_broadcast());
        assert_eq!(frame.ether_type(), 0x0800);
        assert_eq!(data[14], 0x45);
        assert_eq!(data[12..14], [0x08, 0x00]);
    }

    #[test]
    fn swap_for_reply() {
        let data: Vec<u8> = vec![0xde, 0xad, 0xbe, 0xef, 0xff, 0xff, 1, 2, 3, 4, 5, 6, 8, 6];
        let mut frame = EthernetFrame::from_buffer(data).unwrap();
        let ours = MacAddr::new([0x00, 0x13, 0x37, 0x01, 0x23, 0x45]);
        frame.swap_for_reply(ours);
        assert_eq!(frame.dest_mac(), MacAddr::new([1, 2, 3, 4, 5, 6]));
        assert_eq!(frame.src_mac(), ours);
        assert_eq!(frame.ether_type(), ARP_ETHER_TYPE);
    }
}
