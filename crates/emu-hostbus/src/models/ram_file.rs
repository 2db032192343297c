//! 64K RAM-file expansion board on ports EA (data) and EB (address).

const SIZE: usize = 0x1_0000;

pub struct RamFile {
    data: Vec<u8>,
    address: u16,
}

impl RamFile {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: vec![0; SIZE],
            address: 0,
        }
    }

    #[must_use]
    pub fn address(&self) -> u16 {
        self.address
    }

    /// EA returns the byte at the latch and advances it.
    pub fn read(&mut self, port: u16) -> u8 {
        if port as u8 != 0xEA {
            return 0xFF;
        }
        let value = self.data[self.address as usize];
        self.address = self.address.wrapping_add(1);
        value
    }

    /// EB latches `A8-A15 : data`; EA stores at the latch and advances it.
    pub fn write(&mut self, port: u16, value: u8) {
        match port as u8 {
            0xEB => self.address = (port & 0xFF00) | u16::from(value),
            0xEA => {
                self.data[self.address as usize] = value;
                self.address = self.address.wrapping_add(1);
            }
            _ => {}
        }
    }
}

impl Default for RamFile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latch_uses_upper_port_byte() {
        let mut file = RamFile::new();
        file.write(0x12EB, 0x34);
        assert_eq!(file.address(), 0x1234);
        file.write(0x00EA, 0xAA);
        file.write(0x00EA, 0xBB);
        file.write(0x12EB, 0x34);
        assert_eq!(file.read(0x00EA), 0xAA);
        assert_eq!(file.read(0x00EA), 0xBB);
        assert_eq!(file.address(), 0x1236);
    }

    #[test]
    fn address_wraps() {
        let mut file = RamFile::new();
        file.write(0xFFEB, 0xFF);
        file.write(0x00EA, 0x01);
        assert_eq!(file.address(), 0x0000);
        assert_eq!(file.read(0x00EB), 0xFF);
    }
}
