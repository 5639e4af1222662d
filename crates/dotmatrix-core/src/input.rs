use crate::host::JoypadState;

// P1/JOYP select lines, active-low (gbdev.io/pandocs/Joypad_Input.html)
const SELECT_BUTTONS: u8 = 0x20;
const SELECT_DPAD: u8 = 0x10;
const ALL_RELEASED: u8 = 0x0F;

/// The P1 joypad register and its 2x4 key matrix.
///
/// Button state arrives once per frame from the host bridge; the register
/// itself only chooses which half of the matrix is visible in the low nibble.
pub struct Input {
    select: u8,
    /// Start/Select/B/A in bits 3..0, released = 1.
    button_bits: u8,
    /// Down/Up/Left/Right in bits 3..0, released = 1.
    dpad_bits: u8,
}

impl Input {
    pub fn new() -> Self {
        Self {
            select: SELECT_BUTTONS | SELECT_DPAD,
            button_bits: ALL_RELEASED,
            dpad_bits: ALL_RELEASED,
        }
    }

    pub fn read(&self) -> u8 {
        0xC0 | self.select | self.selected_lines()
    }

    pub fn write(&mut self, val: u8) {
        // Only the two select bits are writable.
        self.select = val & (SELECT_BUTTONS | SELECT_DPAD);
    }

    /// Latch a fresh snapshot of the buttons. Any selected line going from
    /// released to pressed requests the joypad interrupt in `if_reg`.
    pub fn set_state(&mut self, state: JoypadState, if_reg: &mut u8) {
        let prev = self.selected_lines();

        self.button_bits = (!state.start as u8) << 3
            | (!state.select as u8) << 2
            | (!state.b as u8) << 1
            | (!state.a as u8);
        self.dpad_bits = (!state.down as u8) << 3
            | (!state.up as u8) << 2
            | (!state.left as u8) << 1
            | (!state.right as u8);

        let now = self.selected_lines();
        if prev & !now != 0 {
            *if_reg |= 0x10;
        }
    }

    /// True if any selected line is currently held. Used to wake from STOP.
    pub fn any_selected_pressed(&self) -> bool {
        self.selected_lines() != ALL_RELEASED
    }

    fn selected_lines(&self) -> u8 {
        let mut lines = ALL_RELEASED;
        if self.select & SELECT_BUTTONS == 0 {
            lines &= self.button_bits;
        }
        if self.select & SELECT_DPAD == 0 {
            lines &= self.dpad_bits;
        }
        lines
    }

    pub(crate) fn select_bits(&self) -> u8 {
        self.select
    }

    pub(crate) fn set_select_bits(&mut self, val: u8) {
        self.select = val & (SELECT_BUTTONS | SELECT_DPAD);
    }
}

impl Default for Input {
    fn default() -> Self {
        Self::new()
    }
}
