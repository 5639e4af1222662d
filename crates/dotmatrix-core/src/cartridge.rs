use thiserror::Error;

const ROM_BANK_SIZE: usize = 0x4000;
const RAM_BANK_SIZE: usize = 0x2000;
const HEADER_END: usize = 0x0150;

#[derive(Debug, Error)]
pub enum CartridgeError {
    #[error("ROM image is {0} bytes, smaller than the 0x150-byte header")]
    RomTooSmall(usize),
    /// The mapper is recognized but this core does not implement it
    /// (MBC3 carts expect a ticking RTC; partial support breaks games).
    #[error("unsupported cartridge type {0:#04X} (MBC3/RTC)")]
    UnsupportedMapper(u8),
    #[error("unknown cartridge type {0:#04X}")]
    UnknownMapper(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcType {
    NoMbc,
    Mbc1,
    Mbc2,
    Mbc5,
}

/// Mapper register state. Field names follow the bank-register decomposition:
/// `bank1` is the low ROM-bank register, `bank2` the high bits shared with
/// RAM banking on MBC1.
#[derive(Debug)]
enum MbcState {
    NoMbc,
    Mbc1 {
        bank1: u8,
        bank2: u8,
        mode: u8,
        ram_enable: bool,
    },
    Mbc2 {
        bank1: u8,
        ram_enable: bool,
    },
    Mbc5 {
        bank1: u8,
        bank2: u8,
        ram_bank: u8,
        ram_enable: bool,
    },
}

pub struct Cartridge {
    pub rom: Vec<u8>,
    pub ram: Vec<u8>,
    pub mbc: MbcType,
    pub title: String,
    cart_type: u8,
    rom_bank_mask: usize,
    mbc_state: MbcState,
}

impl Cartridge {
    /// Build a cartridge from a raw ROM image. The host is responsible for
    /// reading the file; the core only sees bytes.
    pub fn load(data: Vec<u8>) -> Result<Self, CartridgeError> {
        if data.len() < HEADER_END {
            return Err(CartridgeError::RomTooSmall(data.len()));
        }

        let header = Header::parse(&data);
        let cart_type = header.cart_type();
        let mbc = header.mbc_type()?;
        let title = header.title();
        let ram_size = header.ram_size();

        if !header.checksum_ok() {
            log::warn!(
                target: "dotmatrix_core::cartridge",
                "header checksum mismatch for \"{title}\" (stored {:#04X}, computed {:#04X})",
                header.stored_checksum(),
                header.computed_checksum()
            );
        }

        let rom_bank_count = (data.len() / ROM_BANK_SIZE).max(1);
        let mbc_state = match mbc {
            MbcType::NoMbc => MbcState::NoMbc,
            MbcType::Mbc1 => MbcState::Mbc1 {
                bank1: 1,
                bank2: 0,
                mode: 0,
                ram_enable: false,
            },
            MbcType::Mbc2 => MbcState::Mbc2 {
                bank1: 1,
                ram_enable: false,
            },
            MbcType::Mbc5 => MbcState::Mbc5 {
                bank1: 1,
                bank2: 0,
                ram_bank: 0,
                ram_enable: false,
            },
        };

        log::debug!(
            target: "dotmatrix_core::cartridge",
            "loaded \"{title}\": {mbc:?}, {rom_bank_count} ROM banks, {ram_size} bytes RAM"
        );

        Ok(Self {
            rom: data,
            ram: vec![0; ram_size],
            mbc,
            title,
            cart_type,
            rom_bank_mask: rom_bank_count - 1,
            mbc_state,
        })
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => {
                let offset = self.rom0_bank() * ROM_BANK_SIZE + addr as usize;
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            0x4000..=0x7FFF => {
                let offset = self.rom1_bank() * ROM_BANK_SIZE + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            0xA000..=0xBFFF => self.read_ram(addr),
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF => self.write_registers(addr, val),
            0xA000..=0xBFFF => self.write_ram(addr, val),
            _ => {}
        }
    }

    fn write_registers(&mut self, addr: u16, val: u8) {
        match &mut self.mbc_state {
            MbcState::NoMbc => {}
            MbcState::Mbc1 {
                bank1,
                bank2,
                mode,
                ram_enable,
            } => match addr {
                0x0000..=0x1FFF => *ram_enable = val & 0x0F == 0x0A,
                0x2000..=0x3FFF => {
                    *bank1 = val & 0x1F;
                    if *bank1 == 0 {
                        *bank1 = 1;
                    }
                }
                0x4000..=0x5FFF => *bank2 = val & 0x03,
                0x6000..=0x7FFF => *mode = val & 0x01,
                _ => unreachable!(),
            },
            MbcState::Mbc2 { bank1, ram_enable } => {
                // Address bit 8 selects the register across all of 0x0000-0x3FFF.
                if addr < 0x4000 {
                    if addr & 0x0100 == 0 {
                        *ram_enable = val & 0x0F == 0x0A;
                    } else {
                        *bank1 = val & 0x0F;
                        if *bank1 == 0 {
                            *bank1 = 1;
                        }
                    }
                }
            }
            MbcState::Mbc5 {
                bank1,
                bank2,
                ram_bank,
                ram_enable,
            } => match addr {
                0x0000..=0x1FFF => *ram_enable = val & 0x0F == 0x0A,
                0x2000..=0x2FFF => *bank1 = val,
                0x3000..=0x3FFF => *bank2 = val & 0x01,
                0x4000..=0x5FFF => *ram_bank = val & 0x0F,
                0x6000..=0x7FFF => {}
                _ => unreachable!(),
            },
        }
    }

    fn read_ram(&self, addr: u16) -> u8 {
        match &self.mbc_state {
            MbcState::NoMbc => {
                let idx = addr as usize - 0xA000;
                self.ram.get(idx).copied().unwrap_or(0xFF)
            }
            MbcState::Mbc1 { ram_enable, .. } => {
                if !*ram_enable {
                    return 0xFF;
                }
                let idx = self.ram_bank() * RAM_BANK_SIZE + (addr as usize - 0xA000);
                self.ram.get(idx).copied().unwrap_or(0xFF)
            }
            MbcState::Mbc2 { ram_enable, .. } => {
                if !*ram_enable {
                    return 0xFF;
                }
                // 512 half-bytes mirrored across the whole window.
                let idx = (addr as usize - 0xA000) & 0x01FF;
                0xF0 | (self.ram.get(idx).copied().unwrap_or(0x0F) & 0x0F)
            }
            MbcState::Mbc5 { ram_enable, .. } => {
                if !*ram_enable {
                    return 0xFF;
                }
                let idx = self.ram_bank() * RAM_BANK_SIZE + (addr as usize - 0xA000);
                self.ram.get(idx).copied().unwrap_or(0xFF)
            }
        }
    }

    fn write_ram(&mut self, addr: u16, val: u8) {
        match &self.mbc_state {
            MbcState::NoMbc => {
                let idx = addr as usize - 0xA000;
                if let Some(b) = self.ram.get_mut(idx) {
                    *b = val;
                }
            }
            MbcState::Mbc1 { ram_enable, .. } | MbcState::Mbc5 { ram_enable, .. } => {
                if !*ram_enable {
                    return;
                }
                let idx = self.ram_bank() * RAM_BANK_SIZE + (addr as usize - 0xA000);
                if let Some(b) = self.ram.get_mut(idx) {
                    *b = val;
                }
            }
            MbcState::Mbc2 { ram_enable, .. } => {
                if !*ram_enable {
                    return;
                }
                let idx = (addr as usize - 0xA000) & 0x01FF;
                if let Some(b) = self.ram.get_mut(idx) {
                    *b = val & 0x0F;
                }
            }
        }
    }

    /// Bank mapped at 0x0000-0x3FFF. The ROM-size mask applies in both mode
    /// branches so oversized bank2 values wrap on small carts.
    fn rom0_bank(&self) -> usize {
        match &self.mbc_state {
            MbcState::Mbc1 { bank2, mode, .. } if *mode != 0 => {
                ((*bank2 as usize) << 5) & self.rom_bank_mask
            }
            _ => 0,
        }
    }

    /// Bank mapped at 0x4000-0x7FFF.
    fn rom1_bank(&self) -> usize {
        let bank = match &self.mbc_state {
            MbcState::NoMbc => 1,
            MbcState::Mbc1 { bank1, bank2, .. } => ((*bank2 as usize) << 5) | *bank1 as usize,
            MbcState::Mbc2 { bank1, .. } => *bank1 as usize,
            MbcState::Mbc5 { bank1, bank2, .. } => ((*bank2 as usize) << 8) | *bank1 as usize,
        };
        bank & self.rom_bank_mask
    }

    fn ram_bank(&self) -> usize {
        match &self.mbc_state {
            MbcState::Mbc1 { bank2, mode, .. } => {
                if *mode != 0 {
                    *bank2 as usize
                } else {
                    0
                }
            }
            MbcState::Mbc5 { ram_bank, .. } => *ram_bank as usize,
            _ => 0,
        }
    }

    pub fn has_battery(&self) -> bool {
        matches!(self.cart_type, 0x03 | 0x06 | 0x1B | 0x1E)
    }

    /// Battery-backed RAM contents for the host to persist, if any.
    pub fn external_ram_snapshot(&self) -> Option<&[u8]> {
        (self.has_battery() && !self.ram.is_empty()).then_some(self.ram.as_slice())
    }

    /// Restore previously persisted battery RAM. Extra bytes are ignored,
    /// short images fill what they cover.
    pub fn restore_external_ram(&mut self, bytes: &[u8]) {
        for (dst, src) in self.ram.iter_mut().zip(bytes) {
            *dst = *src;
        }
    }

    /// Raw header bytes 0x0100-0x014F, used for save-state identity checks.
    pub fn header_bytes(&self) -> &[u8] {
        &self.rom[0x0100..HEADER_END]
    }

    pub(crate) fn mbc_registers(&self) -> [u8; 4] {
        match &self.mbc_state {
            MbcState::NoMbc => [0; 4],
            MbcState::Mbc1 {
                bank1,
                bank2,
                mode,
                ram_enable,
            } => [*bank1, *bank2, *mode, *ram_enable as u8],
            MbcState::Mbc2 { bank1, ram_enable } => [*bank1, 0, 0, *ram_enable as u8],
            MbcState::Mbc5 {
                bank1,
                bank2,
                ram_bank,
                ram_enable,
            } => [*bank1, *bank2, *ram_bank, *ram_enable as u8],
        }
    }

    pub(crate) fn set_mbc_registers(&mut self, regs: [u8; 4]) {
        match &mut self.mbc_state {
            MbcState::NoMbc => {}
            MbcState::Mbc1 {
                bank1,
                bank2,
                mode,
                ram_enable,
            } => {
                *bank1 = regs[0];
                *bank2 = regs[1];
                *mode = regs[2];
                *ram_enable = regs[3] != 0;
            }
            MbcState::Mbc2 { bank1, ram_enable } => {
                *bank1 = regs[0];
                *ram_enable = regs[3] != 0;
            }
            MbcState::Mbc5 {
                bank1,
                bank2,
                ram_bank,
                ram_enable,
            } => {
                *bank1 = regs[0];
                *bank2 = regs[1];
                *ram_bank = regs[2];
                *ram_enable = regs[3] != 0;
            }
        }
    }
}

/// Read-only view over the cartridge header at 0x0100-0x014F.
struct Header<'a> {
    data: &'a [u8],
}

impl<'a> Header<'a> {
    fn parse(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn title(&self) -> String {
        let mut slice = &self.data[0x0134..0x0144];
        if let Some(pos) = slice.iter().position(|&b| b == 0) {
            slice = &slice[..pos];
        }
        String::from_utf8_lossy(slice).trim().to_string()
    }

    fn cart_type(&self) -> u8 {
        self.data[0x0147]
    }

    fn mbc_type(&self) -> Result<MbcType, CartridgeError> {
        match self.cart_type() {
            0x00 | 0x08 | 0x09 => Ok(MbcType::NoMbc),
            0x01..=0x03 => Ok(MbcType::Mbc1),
            0x05 | 0x06 => Ok(MbcType::Mbc2),
            0x19..=0x1E => Ok(MbcType::Mbc5),
            t @ 0x0F..=0x13 => Err(CartridgeError::UnsupportedMapper(t)),
            t => Err(CartridgeError::UnknownMapper(t)),
        }
    }

    fn ram_size(&self) -> usize {
        // MBC2 carries its 512x4-bit RAM regardless of the header code.
        if matches!(self.cart_type(), 0x05 | 0x06) {
            return 0x200;
        }
        match self.data[0x0149] {
            0x01 => 0x800,   // 2 KiB
            0x02 => 0x2000,  // 8 KiB
            0x03 => 0x8000,  // 32 KiB
            0x04 => 0x20000, // 128 KiB
            0x05 => 0x10000, // 64 KiB
            _ => 0,
        }
    }

    fn stored_checksum(&self) -> u8 {
        self.data[0x014D]
    }

    fn computed_checksum(&self) -> u8 {
        self.data[0x0134..0x014D]
            .iter()
            .fold(0u8, |acc, &b| acc.wrapping_sub(b).wrapping_sub(1))
    }

    fn checksum_ok(&self) -> bool {
        self.stored_checksum() == self.computed_checksum()
    }
}
