/// Total outbound packet size, including the leading length byte.
pub const MAX_PACKET_SIZE: usize = 64;

/// Bytes available for operation records after the length byte.
pub const MAX_PAYLOAD_SIZE: usize = MAX_PACKET_SIZE - 1;

/// Size of one inbound response frame on the reference device family.
pub const RESPONSE_FRAME_SIZE: usize = 32;

pub const CORSAIR_VENDOR_ID: u16 = 0x1b1c;

pub mod opcodes {
    pub const WRITE1: u8 = 0x06;
    pub const READ1: u8 = 0x07;
    pub const WRITE2: u8 = 0x08;
    pub const READ2: u8 = 0x09;
    pub const WRITE: u8 = 0x0a;
    pub const READ: u8 = 0x0b;
    pub const SELF_TEST: u8 = 0x4f;
}
