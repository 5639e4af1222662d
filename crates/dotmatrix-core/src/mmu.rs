use crate::{
    apu::Apu, cartridge::Cartridge, input::Input, ppu::Ppu, serial::Serial, timer::Timer,
};

const WRAM_SIZE: usize = 0x2000;
const HRAM_SIZE: usize = 0x7F;
const BOOT_ROM_SIZE: usize = 0x100;

/// OAM DMA copies 160 bytes at one byte per M-cycle.
const DMA_CYCLES: u16 = 160 * 4;
/// The transfer begins two M-cycles after the 0xFF46 write.
const DMA_START_DELAY: u16 = 8;

pub struct Mmu {
    pub wram: [u8; WRAM_SIZE],
    pub hram: [u8; HRAM_SIZE],
    pub cart: Option<Cartridge>,
    pub boot_rom: Option<Vec<u8>>,
    pub boot_mapped: bool,
    pub if_reg: u8,
    pub ie_reg: u8,
    pub serial: Serial,
    pub ppu: Ppu,
    pub apu: Apu,
    pub timer: Timer,
    pub input: Input,
    pub(crate) dma_cycles: u16,
    pub(crate) dma_source: u16,
    pub(crate) pending_dma: Option<u16>,
    pub(crate) pending_delay: u16,
}

impl Mmu {
    pub fn new() -> Self {
        Self {
            wram: [0; WRAM_SIZE],
            hram: [0; HRAM_SIZE],
            cart: None,
            boot_rom: None,
            boot_mapped: false,
            if_reg: 0xE1,
            ie_reg: 0,
            serial: Serial::new(),
            ppu: Ppu::new(),
            apu: Apu::new(),
            timer: Timer::new(),
            input: Input::new(),
            dma_cycles: 0,
            dma_source: 0,
            pending_dma: None,
            pending_delay: 0,
        }
    }

    pub fn load_cart(&mut self, cart: Cartridge) {
        self.cart = Some(cart);
    }

    pub fn load_boot_rom(&mut self, data: Vec<u8>) {
        if data.len() != BOOT_ROM_SIZE {
            log::warn!(
                target: "dotmatrix_core::mmu",
                "boot ROM is {} bytes, expected {BOOT_ROM_SIZE}",
                data.len()
            );
        }
        self.boot_rom = Some(data);
        self.boot_mapped = true;
    }

    fn read_byte_inner(&mut self, addr: u16, from_dma: bool) -> u8 {
        // While OAM DMA holds the buses the CPU reads open everywhere but
        // HRAM, which sits on its own bus.
        if !from_dma && self.dma_cycles > 0 && !(0xFF80..=0xFFFE).contains(&addr) {
            return 0xFF;
        }

        match addr {
            0x0000..=0x00FF if self.boot_mapped => self
                .boot_rom
                .as_ref()
                .and_then(|b| b.get(addr as usize).copied())
                .unwrap_or(0xFF),
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                self.cart.as_ref().map(|c| c.read(addr)).unwrap_or(0xFF)
            }
            0x8000..=0x9FFF => {
                if self.ppu.vram_accessible() {
                    self.ppu.vram[(addr - 0x8000) as usize]
                } else {
                    0xFF
                }
            }
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize],
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize],
            0xFE00..=0xFE9F => {
                if self.ppu.oam_accessible() {
                    self.ppu.oam[(addr - 0xFE00) as usize]
                } else {
                    0xFF
                }
            }
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00 => self.input.read(),
            0xFF01 | 0xFF02 => self.serial.read(addr),
            0xFF04..=0xFF07 => self.timer.read(addr),
            0xFF0F => self.if_reg | 0xE0,
            0xFF10..=0xFF3F => self.apu.read_reg(addr),
            0xFF46 => self.ppu.dma,
            0xFF40..=0xFF45 | 0xFF47..=0xFF4B => self.ppu.read_reg(addr),
            0xFF50 => {
                if self.boot_mapped {
                    0xFE
                } else {
                    0xFF
                }
            }
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.ie_reg,
            _ => 0xFF,
        }
    }

    pub fn read_byte(&mut self, addr: u16) -> u8 {
        self.read_byte_inner(addr, false)
    }

    /// Source reads issued by the DMA engine bypass the CPU-side blocks.
    /// Pages above the external bus mirror back into WRAM.
    fn dma_read_byte(&mut self, addr: u16) -> u8 {
        let addr = if addr >= 0xFE00 {
            addr.wrapping_sub(0x2000)
        } else {
            addr
        };
        self.read_byte_inner(addr, true)
    }

    pub fn write_byte(&mut self, addr: u16, val: u8) {
        // OAM itself is off limits while the engine is writing it; the
        // video bus is equally contended. WRAM/IO/HRAM writes go through.
        if self.dma_cycles > 0 && matches!(addr, 0x8000..=0x9FFF | 0xFE00..=0xFE9F) {
            return;
        }

        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                if let Some(cart) = self.cart.as_mut() {
                    cart.write(addr, val);
                }
            }
            0x8000..=0x9FFF => {
                if self.ppu.vram_accessible() {
                    self.ppu.vram[(addr - 0x8000) as usize] = val;
                }
            }
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize] = val,
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize] = val,
            0xFE00..=0xFE9F => {
                if self.ppu.oam_accessible() {
                    self.ppu.oam[(addr - 0xFE00) as usize] = val;
                }
            }
            0xFEA0..=0xFEFF => {}
            0xFF00 => self.input.write(val),
            0xFF01 | 0xFF02 => self.serial.write(addr, val),
            0xFF04..=0xFF07 => self.timer.write(addr, val, &mut self.if_reg),
            0xFF0F => self.if_reg = (val & 0x1F) | (self.if_reg & 0xE0),
            0xFF10..=0xFF3F => self.apu.write_reg(addr, val),
            0xFF46 => {
                // OAM DMA request; readback keeps the written value.
                self.ppu.dma = val;
                self.pending_dma = Some((val as u16) << 8);
                self.pending_delay = DMA_START_DELAY;
            }
            0xFF40..=0xFF45 | 0xFF47..=0xFF4B => {
                self.ppu.write_reg(addr, val, &mut self.if_reg)
            }
            0xFF50 => {
                if self.boot_mapped {
                    log::debug!(target: "dotmatrix_core::mmu", "boot ROM unmapped");
                }
                self.boot_mapped = false;
            }
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.ie_reg = val,
            _ => {}
        }
    }

    /// Advance the OAM DMA engine by `cycles` T-cycles.
    pub fn dma_step(&mut self, cycles: u16) {
        for _ in 0..cycles {
            if self.pending_delay > 0 {
                self.pending_delay -= 1;
                if self.pending_delay == 0 {
                    if let Some(src) = self.pending_dma.take() {
                        self.dma_source = src;
                        self.dma_cycles = DMA_CYCLES;
                    }
                }
            }

            if self.dma_cycles == 0 {
                continue;
            }
            let elapsed = DMA_CYCLES - self.dma_cycles;
            if elapsed % 4 == 0 {
                let idx = elapsed / 4;
                let byte = self.dma_read_byte(self.dma_source.wrapping_add(idx));
                self.ppu.oam[idx as usize] = byte;
            }
            self.dma_cycles -= 1;
        }
    }

    /// True while an OAM DMA transfer is running or about to start.
    pub fn dma_active(&self) -> bool {
        self.dma_cycles > 0 || self.pending_delay > 0
    }

    pub fn take_serial(&mut self) -> Vec<u8> {
        self.serial.take_output()
    }

    /// Advance every bus-side component by `t_cycles`. Called by the CPU
    /// once per M-cycle so memory-mapped state moves in lockstep with
    /// instruction execution.
    pub fn tick_components(&mut self, t_cycles: u16) {
        self.timer.step(t_cycles, &mut self.if_reg);
        self.apu.step(t_cycles);
        self.serial.step(t_cycles, &mut self.if_reg);
        self.ppu.step(t_cycles, &mut self.if_reg);
        self.dma_step(t_cycles);
    }
}

impl Default for Mmu {
    fn default() -> Self {
        Self::new()
    }
}
