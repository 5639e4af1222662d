//! Save-state capture and restore.
//!
//! Binary format (little-endian):
//!   [0..4]   Magic: "DMGS"
//!   [4..8]   Version: u32
//!   [8..88]  Copy of the cartridge header (0x0100-0x014F), used to refuse
//!            loading a state over the wrong ROM
//!   [88..]   Length-prefixed ROM name, then machine state in declaration
//!            order: CPU, MMU, PPU, APU, timer, serial, joypad, cartridge.

use std::io;

use thiserror::Error;

use crate::{apu::SquareChannel, gameboy::GameBoy};

const MAGIC: &[u8; 4] = b"DMGS";
const VERSION: u32 = 1;
const HEADER_COPY_LEN: usize = 0x50;

// Offsets within the header copy.
const TITLE_RANGE: std::ops::Range<usize> = 0x34..0x44;
const CHECKSUM_OFFSET: usize = 0x4D;

#[derive(Debug, Error)]
pub enum SaveStateError {
    #[error("not a save state (bad magic)")]
    BadMagic,
    #[error("save state version {found} is not supported (current {VERSION})")]
    UnsupportedVersion { found: u32 },
    #[error("save state is truncated")]
    Truncated,
    #[error("save state belongs to a different ROM")]
    RomMismatch,
    #[error("no cartridge is loaded")]
    NoCartridge,
}

impl From<io::Error> for SaveStateError {
    fn from(_: io::Error) -> Self {
        SaveStateError::Truncated
    }
}

// ---- Binary helpers -------------------------------------------------------

struct StateWriter {
    buf: Vec<u8>,
}

impl StateWriter {
    fn new() -> Self {
        Self {
            buf: Vec::with_capacity(0x8000),
        }
    }

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }
    fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn write_bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }
    fn write_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }
}

struct StateReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> StateReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> io::Result<&'a [u8]> {
        if self.pos + len > self.data.len() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated"));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u8(&mut self) -> io::Result<u8> {
        Ok(self.take(1)?[0])
    }
    fn read_u16(&mut self) -> io::Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }
    fn read_u32(&mut self) -> io::Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }
    fn read_i32(&mut self) -> io::Result<i32> {
        Ok(self.read_u32()? as i32)
    }
    fn read_u64(&mut self) -> io::Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }
    fn read_i64(&mut self) -> io::Result<i64> {
        Ok(self.read_u64()? as i64)
    }
    fn read_bool(&mut self) -> io::Result<bool> {
        Ok(self.read_u8()? != 0)
    }
}

// ---- Capture --------------------------------------------------------------

/// Serialize the whole machine. Returns `Err(NoCartridge)` with nothing
/// loaded; the format embeds the ROM identity.
pub fn capture(gb: &GameBoy) -> Result<Vec<u8>, SaveStateError> {
    let cart = gb.mmu.cart.as_ref().ok_or(SaveStateError::NoCartridge)?;

    let mut w = StateWriter::new();
    w.write_bytes(MAGIC);
    w.write_u32(VERSION);
    w.write_bytes(cart.header_bytes());
    let name = cart.title.as_bytes();
    w.write_u32(name.len() as u32);
    w.write_bytes(name);

    // CPU
    let cpu = &gb.cpu;
    w.write_u8(cpu.a);
    w.write_u8(cpu.f);
    w.write_u8(cpu.b);
    w.write_u8(cpu.c);
    w.write_u8(cpu.d);
    w.write_u8(cpu.e);
    w.write_u8(cpu.h);
    w.write_u8(cpu.l);
    w.write_u16(cpu.pc);
    w.write_u16(cpu.sp);
    w.write_u64(cpu.cycles);
    w.write_bool(cpu.ime);
    w.write_u8(cpu.ime_delay);
    w.write_bool(cpu.halted);
    w.write_bool(cpu.halt_bug);
    w.write_bool(cpu.stopped);
    w.write_bool(cpu.locked);

    // MMU
    let mmu = &gb.mmu;
    w.write_bytes(&mmu.wram);
    w.write_bytes(&mmu.hram);
    w.write_u8(mmu.if_reg);
    w.write_u8(mmu.ie_reg);
    w.write_bool(mmu.boot_mapped);
    w.write_u16(mmu.dma_cycles);
    w.write_u16(mmu.dma_source);
    w.write_bool(mmu.pending_dma.is_some());
    w.write_u16(mmu.pending_dma.unwrap_or(0));
    w.write_u16(mmu.pending_delay);

    // PPU
    let ppu = &mmu.ppu;
    w.write_bytes(&ppu.vram);
    w.write_bytes(&ppu.oam);
    w.write_u8(ppu.lcdc);
    w.write_u8(ppu.stat);
    w.write_u8(ppu.scy);
    w.write_u8(ppu.scx);
    w.write_u8(ppu.ly);
    w.write_u8(ppu.lyc);
    w.write_u8(ppu.bgp);
    w.write_u8(ppu.obp0);
    w.write_u8(ppu.obp1);
    w.write_u8(ppu.wy);
    w.write_u8(ppu.wx);
    w.write_u8(ppu.dma);
    w.write_u8(ppu.mode);
    w.write_u16(ppu.mode_clock);
    w.write_u8(ppu.window_line);
    w.write_bool(ppu.window_y_hit);
    w.write_bool(ppu.stat_line);
    w.write_u64(ppu.frames);

    // APU
    let apu = &mmu.apu;
    w.write_bool(apu.powered);
    w.write_u8(apu.nr50);
    w.write_u8(apu.nr51);
    w.write_bytes(&apu.regs);
    w.write_bytes(&apu.wave_ram);
    w.write_u8(apu.sequencer.step);
    w.write_u32(apu.seq_counter);
    w.write_u32(apu.sample_acc);
    w.write_i64(apu.acc_left);
    w.write_i64(apu.acc_right);
    w.write_u32(apu.acc_count);
    write_square(&mut w, &apu.ch1);
    write_square(&mut w, &apu.ch2);
    w.write_bool(apu.ch3.enabled);
    w.write_bool(apu.ch3.dac_enabled);
    w.write_u16(apu.ch3.length);
    w.write_bool(apu.ch3.length_enable);
    w.write_u8(apu.ch3.volume);
    w.write_u8(apu.ch3.position);
    w.write_u8(apu.ch3.sample);
    w.write_u16(apu.ch3.frequency);
    w.write_i32(apu.ch3.timer);
    w.write_bool(apu.ch4.enabled);
    w.write_bool(apu.ch4.dac_enabled);
    w.write_u16(apu.ch4.length);
    w.write_bool(apu.ch4.length_enable);
    write_envelope(&mut w, &apu.ch4.envelope);
    w.write_u8(apu.ch4.clock_shift);
    w.write_u8(apu.ch4.divisor);
    w.write_bool(apu.ch4.width7);
    w.write_u16(apu.ch4.lfsr);
    w.write_i32(apu.ch4.timer);

    // Timer
    let timer = &mmu.timer;
    w.write_u16(timer.div);
    w.write_u8(timer.tima);
    w.write_u8(timer.tma);
    w.write_u8(timer.tac);
    w.write_bool(timer.edge_signal());
    let reload = timer.reload_countdown();
    w.write_bool(reload.is_some());
    w.write_u8(reload.unwrap_or(0));

    // Serial
    let (sb, sc, bits, bit_timer) = mmu.serial.regs();
    w.write_u8(sb);
    w.write_u8(sc);
    w.write_u8(bits);
    w.write_u16(bit_timer);

    // Joypad select lines (button state is re-fed by the host each frame)
    w.write_u8(mmu.input.select_bits());

    // Cartridge mapper registers + external RAM
    let regs = cart.mbc_registers();
    w.write_bytes(&regs);
    w.write_u32(cart.ram.len() as u32);
    w.write_bytes(&cart.ram);

    Ok(w.buf)
}

fn write_envelope(w: &mut StateWriter, env: &crate::apu::Envelope) {
    w.write_u8(env.initial);
    w.write_u8(env.period);
    w.write_bool(env.add);
    w.write_u8(env.volume);
    w.write_u8(env.timer);
}

fn write_square(w: &mut StateWriter, ch: &SquareChannel) {
    w.write_bool(ch.enabled);
    w.write_bool(ch.dac_enabled);
    w.write_u16(ch.length);
    w.write_bool(ch.length_enable);
    w.write_u8(ch.duty);
    w.write_u8(ch.duty_pos);
    w.write_u16(ch.frequency);
    w.write_i32(ch.timer);
    write_envelope(w, &ch.envelope);
    if let Some(sweep) = &ch.sweep {
        w.write_u8(sweep.period);
        w.write_bool(sweep.negate);
        w.write_u8(sweep.shift);
        w.write_u8(sweep.timer);
        w.write_u16(sweep.shadow);
        w.write_bool(sweep.enabled);
    }
}

// ---- Restore --------------------------------------------------------------

/// Restore a previously captured state into `gb`. The same ROM must be
/// loaded; identity is checked via the embedded header copy.
pub fn restore(gb: &mut GameBoy, data: &[u8]) -> Result<(), SaveStateError> {
    let mut r = StateReader::new(data);

    if r.take(4)? != MAGIC {
        return Err(SaveStateError::BadMagic);
    }
    let version = r.read_u32()?;
    if version != VERSION {
        return Err(SaveStateError::UnsupportedVersion { found: version });
    }

    let header = r.take(HEADER_COPY_LEN)?;
    {
        let cart = gb.mmu.cart.as_ref().ok_or(SaveStateError::NoCartridge)?;
        let current = cart.header_bytes();
        if header[TITLE_RANGE] != current[TITLE_RANGE]
            || header[CHECKSUM_OFFSET] != current[CHECKSUM_OFFSET]
        {
            return Err(SaveStateError::RomMismatch);
        }
    }
    let name_len = r.read_u32()? as usize;
    let _name = r.take(name_len)?;

    // CPU
    let cpu = &mut gb.cpu;
    cpu.a = r.read_u8()?;
    cpu.f = r.read_u8()?;
    cpu.b = r.read_u8()?;
    cpu.c = r.read_u8()?;
    cpu.d = r.read_u8()?;
    cpu.e = r.read_u8()?;
    cpu.h = r.read_u8()?;
    cpu.l = r.read_u8()?;
    cpu.pc = r.read_u16()?;
    cpu.sp = r.read_u16()?;
    cpu.cycles = r.read_u64()?;
    cpu.ime = r.read_bool()?;
    cpu.ime_delay = r.read_u8()?;
    cpu.halted = r.read_bool()?;
    cpu.halt_bug = r.read_bool()?;
    cpu.stopped = r.read_bool()?;
    cpu.locked = r.read_bool()?;

    // MMU
    let mmu = &mut gb.mmu;
    let wram_len = mmu.wram.len();
    mmu.wram.copy_from_slice(r.take(wram_len)?);
    let hram_len = mmu.hram.len();
    mmu.hram.copy_from_slice(r.take(hram_len)?);
    mmu.if_reg = r.read_u8()?;
    mmu.ie_reg = r.read_u8()?;
    mmu.boot_mapped = r.read_bool()?;
    mmu.dma_cycles = r.read_u16()?;
    mmu.dma_source = r.read_u16()?;
    let pending = r.read_bool()?;
    let pending_src = r.read_u16()?;
    mmu.pending_dma = pending.then_some(pending_src);
    mmu.pending_delay = r.read_u16()?;

    // PPU
    let ppu = &mut mmu.ppu;
    let vram_len = ppu.vram.len();
    ppu.vram.copy_from_slice(r.take(vram_len)?);
    let oam_len = ppu.oam.len();
    ppu.oam.copy_from_slice(r.take(oam_len)?);
    ppu.lcdc = r.read_u8()?;
    ppu.stat = r.read_u8()?;
    ppu.scy = r.read_u8()?;
    ppu.scx = r.read_u8()?;
    ppu.ly = r.read_u8()?;
    ppu.lyc = r.read_u8()?;
    ppu.bgp = r.read_u8()?;
    ppu.obp0 = r.read_u8()?;
    ppu.obp1 = r.read_u8()?;
    ppu.wy = r.read_u8()?;
    ppu.wx = r.read_u8()?;
    ppu.dma = r.read_u8()?;
    ppu.mode = r.read_u8()?;
    ppu.mode_clock = r.read_u16()?;
    ppu.window_line = r.read_u8()?;
    ppu.window_y_hit = r.read_bool()?;
    ppu.stat_line = r.read_bool()?;
    ppu.frames = r.read_u64()?;
    ppu.restore_pipeline();

    // APU
    let apu = &mut mmu.apu;
    apu.powered = r.read_bool()?;
    apu.nr50 = r.read_u8()?;
    apu.nr51 = r.read_u8()?;
    let regs_len = apu.regs.len();
    apu.regs.copy_from_slice(r.take(regs_len)?);
    let wave_ram_len = apu.wave_ram.len();
    apu.wave_ram.copy_from_slice(r.take(wave_ram_len)?);
    apu.sequencer.step = r.read_u8()?;
    apu.seq_counter = r.read_u32()?;
    apu.sample_acc = r.read_u32()?;
    apu.acc_left = r.read_i64()?;
    apu.acc_right = r.read_i64()?;
    apu.acc_count = r.read_u32()?;
    read_square(&mut r, &mut apu.ch1)?;
    read_square(&mut r, &mut apu.ch2)?;
    apu.ch3.enabled = r.read_bool()?;
    apu.ch3.dac_enabled = r.read_bool()?;
    apu.ch3.length = r.read_u16()?;
    apu.ch3.length_enable = r.read_bool()?;
    apu.ch3.volume = r.read_u8()?;
    apu.ch3.position = r.read_u8()?;
    apu.ch3.sample = r.read_u8()?;
    apu.ch3.frequency = r.read_u16()?;
    apu.ch3.timer = r.read_i32()?;
    apu.ch4.enabled = r.read_bool()?;
    apu.ch4.dac_enabled = r.read_bool()?;
    apu.ch4.length = r.read_u16()?;
    apu.ch4.length_enable = r.read_bool()?;
    read_envelope(&mut r, &mut apu.ch4.envelope)?;
    apu.ch4.clock_shift = r.read_u8()?;
    apu.ch4.divisor = r.read_u8()?;
    apu.ch4.width7 = r.read_bool()?;
    apu.ch4.lfsr = r.read_u16()?;
    apu.ch4.timer = r.read_i32()?;

    // Timer
    let timer = &mut mmu.timer;
    timer.div = r.read_u16()?;
    timer.tima = r.read_u8()?;
    timer.tma = r.read_u8()?;
    timer.tac = r.read_u8()?;
    timer.set_edge_signal(r.read_bool()?);
    let has_reload = r.read_bool()?;
    let reload = r.read_u8()?;
    timer.set_reload_countdown(has_reload.then_some(reload));

    // Serial
    let sb = r.read_u8()?;
    let sc = r.read_u8()?;
    let bits = r.read_u8()?;
    let bit_timer = r.read_u16()?;
    mmu.serial.set_regs(sb, sc, bits, bit_timer);

    // Joypad
    let select = r.read_u8()?;
    mmu.input.set_select_bits(select);

    // Cartridge
    let cart = mmu.cart.as_mut().ok_or(SaveStateError::NoCartridge)?;
    let mut regs = [0u8; 4];
    regs.copy_from_slice(r.take(4)?);
    cart.set_mbc_registers(regs);
    let ram_len = r.read_u32()? as usize;
    if ram_len != cart.ram.len() {
        return Err(SaveStateError::RomMismatch);
    }
    cart.ram.copy_from_slice(r.take(ram_len)?);

    Ok(())
}

fn read_envelope(
    r: &mut StateReader<'_>,
    env: &mut crate::apu::Envelope,
) -> Result<(), SaveStateError> {
    env.initial = r.read_u8()?;
    env.period = r.read_u8()?;
    env.add = r.read_bool()?;
    env.volume = r.read_u8()?;
    env.timer = r.read_u8()?;
    Ok(())
}

fn read_square(r: &mut StateReader<'_>, ch: &mut SquareChannel) -> Result<(), SaveStateError> {
    ch.enabled = r.read_bool()?;
    ch.dac_enabled = r.read_bool()?;
    ch.length = r.read_u16()?;
    ch.length_enable = r.read_bool()?;
    ch.duty = r.read_u8()?;
    ch.duty_pos = r.read_u8()?;
    ch.frequency = r.read_u16()?;
    ch.timer = r.read_i32()?;
    read_envelope(r, &mut ch.envelope)?;
    if let Some(sweep) = ch.sweep.as_mut() {
        sweep.period = r.read_u8()?;
        sweep.negate = r.read_bool()?;
        sweep.shift = r.read_u8()?;
        sweep.timer = r.read_u8()?;
        sweep.shadow = r.read_u16()?;
        sweep.enabled = r.read_bool()?;
    }
    Ok(())
}
