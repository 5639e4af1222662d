use crate::{SCREEN_HEIGHT, SCREEN_WIDTH};

/// Snapshot of the eight Game Boy buttons, `true` = pressed.
///
/// The host rebuilds this every frame from whatever input sources it has
/// (keyboard, gamepad, ...); the core only ever reads it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoypadState {
    pub a: bool,
    pub b: bool,
    pub select: bool,
    pub start: bool,
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

/// Bridge to the platform layer.
///
/// The core calls these synchronously from [`crate::gameboy::GameBoy::run_frame`];
/// implementations must not re-enter the core from a callback.
pub trait Host {
    /// Deliver a finished frame. `pitch` is the row stride in pixels.
    fn blit_screen(&mut self, pixels: &[u32; SCREEN_WIDTH * SCREEN_HEIGHT], pitch: usize);

    /// Flip the frame delivered by the preceding `blit_screen` to the display.
    fn present_frame(&mut self);

    /// Deliver interleaved stereo i16 samples at 48 kHz.
    fn on_audio_generated(&mut self, samples: &[i16]);

    /// Pump platform events, updating `joypad`. Returns `true` to quit.
    fn handle_events(&mut self, joypad: &mut JoypadState) -> bool;
}
