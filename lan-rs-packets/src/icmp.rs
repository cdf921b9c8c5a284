use crate::*;
use std::convert::TryInto;

pub const ICMP_ECHO_REPLY: u8 = 0;
pub const ICMP_ECHO_REQUEST: u8 = 8;

/// View over an ICMP message spanning `layer4_offset..end` of a frame buffer.
/// Only echo request/reply are interpreted beyond the type and code.
#[derive(Clone, Debug)]
pub struct IcmpPacket<T> {
    pub data: T,
    pub layer4_offset: usize,
    pub end: usize,
}

impl<T: AsRef<[u8]>> IcmpPacket<T> {
    pub fn from_buffer(
        data: T,
        layer4_offset: usize,
        end: usize,
    ) -> Result<IcmpPacket<T>, &'static str> {
        if end > data.as_ref().len() || end < layer4_offset + ICMP_HEADER_LEN {
            return Err("Data is too short to be an ICMP message");
        }
        Ok(IcmpPacket {
            data,
            layer4_offset,
            end,
        })
    }

    fn message(&self) -> &[u8] {
        &self.data.as_ref()[self.layer4_offset..self.end]
    }

    pub fn icmp_type(&self) -> u8 {
        self.message()[0]
    }

    pub fn code(&self) -> u8 {
        self.message()[1]
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes(self.message()[2..=3].try_into().unwrap())
    }

    pub fn echo_identifier(&self) -> u16 {
        u16::from_be_bytes(self.message()[4..=5].try_into().unwrap())
    }

    pub fn echo_sequence(&self) -> u16 {
        u16::from_be_bytes(self.message()[6..=7].try_into().unwrap())
    }

    pub fn payload(&self) -> &[u8] {
        &self.message()[ICMP_HEADER_LEN..]
    }

    pub fn validate_checksum(&self) -> bool {
        internet_checksum(self.message()) == 0
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> IcmpPacket<T> {
    fn message_mut(&mut self) -> &mut [u8] {
        let (start, end) = (self.layer4_offset, self.end);
        &mut self.data.as_mut()[start..end]
    }

    pub fn set_icmp_type(&mut self, icmp_type: u8) {
        self.message_mut()[0] = icmp_type;
    }

    pub fn set_code(&mut self, code: u8) {
        self.message_mut()[1] = code;
    }

    pub fn set_checksum(&mut self) {
        let message = self.message_mut();
        message[2..=3].copy_from_slice(&[0, 0]);
        let checksum = internet_checksum(message);
        message[2..=3].copy_from_slice(&checksum.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_request_to_reply() {
        let mut data = vec![0x08, 0x00, 0x00, 0x00, 0x12, 0x34, 0x00, 0x01, b'a', b'b', b'c'];
        let mut packet = IcmpPacket::from_buffer(&mut data[..], 0, 11).unwrap();
        packet.set_checksum();
        assert!(packet.validate_checksum());
        assert_eq!(packet.icmp_type(), ICMP_ECHO_REQUEST);

        packet.set_icmp_type(ICMP_ECHO_REPLY);
        assert!(!packet.validate_checksum());
        packet.set_checksum();
        assert!(packet.validate_checksum());
        assert_eq!(packet.echo_identifier(), 0x1234);
        assert_eq!(packet.echo_sequence(), 1);
        assert_eq!(packet.payload(), b"abc");
    }

    #[test]
    fn too_short() {
        let data = vec![0x08, 0x00, 0x00, 0x00];
        assert!(IcmpPacket::from_buffer(data, 0, 4).is_err());
        let data = vec![0u8; 8];
        assert!(IcmpPacket::from_buffer(data, 0, 9).is_err());
    }
}
