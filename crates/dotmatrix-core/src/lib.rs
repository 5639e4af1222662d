//! Cycle-accurate Game Boy (DMG) emulation core.
//!
//! This crate contains the platform-agnostic emulator logic (CPU/MMU/PPU/APU
//! and friends). Frontends live in separate crates and drive the core through
//! the [`gameboy::GameBoy`] facade and the [`host::Host`] bridge: the core
//! emits 160x144 ARGB frames and 48 kHz stereo i16 audio, and consumes a
//! [`host::JoypadState`] once per frame.

/// Audio Processing Unit: 4 channels, frame sequencer, mixer, resampler.
pub mod apu;

/// Cartridge mappers (MBC) and ROM/RAM handling.
pub mod cartridge;

/// LR35902 CPU core.
pub mod cpu;

/// High-level facade that wires the CPU and MMU into a single machine.
pub mod gameboy;

/// Host bridge trait and joypad state exchanged with the frontend.
pub mod host;

/// Joypad input register and edge-triggered interrupt behavior.
pub mod input;

/// Memory map and hardware plumbing, including OAM DMA.
pub mod mmu;

/// Pixel Processing Unit.
pub mod ppu;

/// Versioned save-state capture and restore.
pub mod savestate;

/// Serial port; captures test-ROM output on a disconnected link.
pub mod serial;

/// Divider/timer unit.
pub mod timer;

/// LCD width in pixels.
pub const SCREEN_WIDTH: usize = 160;
/// LCD height in pixels.
pub const SCREEN_HEIGHT: usize = 144;

/// CPU clock rate in T-cycles per second (4.194304 MHz).
pub const CPU_CLOCK_HZ: u32 = 4_194_304;

/// T-cycles per frame: 154 scanlines of 456 dots (~59.73 Hz).
pub const CYCLES_PER_FRAME: u32 = 70_224;

/// Output sample rate of the resampled audio stream.
pub const AUDIO_SAMPLE_RATE: u32 = 48_000;
