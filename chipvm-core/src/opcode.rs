/// Operand fields of one instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    pub full: u16,
    /// Jump, call and index-load target. Only 11 bits wide, so 0x000..=0x7FF.
    pub address: u16,
    pub nibble: u8,
    pub x: u8,
    pub y: u8,
    pub immediate: u8,
}

impl Opcode {
    pub fn decode(high: u8, low: u8) -> Self {
        let full = (high as u16) << 8 | low as u16;
        Self {
            full,
            address: full & 0x7FF,
            nibble: low & 0x0F,
            x: high & 0x0F,
            y: low >> 4,
            immediate: low,
        }
    }
}

impl From<u16> for Opcode {
    fn from(full: u16) -> Self {
        let [high, low] = full.to_be_bytes();
        Self::decode(high, low)
    }
}
