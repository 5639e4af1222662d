use crate::{
    cartridge::Cartridge,
    cpu::Cpu,
    host::{Host, JoypadState},
    mmu::Mmu,
    CYCLES_PER_FRAME, SCREEN_WIDTH,
};

pub struct GameBoy {
    pub cpu: Cpu,
    pub mmu: Mmu,
    joypad: JoypadState,
    audio_buf: Vec<i16>,
}

impl GameBoy {
    /// Machine in the post-boot state, ready to run a cartridge at 0x0100.
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            mmu: Mmu::new(),
            joypad: JoypadState::default(),
            audio_buf: Vec::new(),
        }
    }

    /// Machine at power-on, for executing a boot ROM mapped at 0x0000.
    pub fn new_power_on() -> Self {
        Self {
            cpu: Cpu::new_power_on(),
            ..Self::new()
        }
    }

    pub fn load_cart(&mut self, cart: Cartridge) {
        self.mmu.load_cart(cart);
    }

    pub fn load_boot_rom(&mut self, data: Vec<u8>) {
        self.mmu.load_boot_rom(data);
    }

    /// Reset to the initial state while keeping the loaded cartridge and
    /// boot ROM in place.
    pub fn reset(&mut self) {
        let cart = self.mmu.cart.take();
        let boot = self.mmu.boot_rom.take();
        let power_on = boot.is_some();
        self.cpu = if power_on {
            Cpu::new_power_on()
        } else {
            Cpu::new()
        };
        self.mmu = Mmu::new();
        if let Some(c) = cart {
            self.mmu.load_cart(c);
        }
        if let Some(b) = boot {
            self.mmu.load_boot_rom(b);
        }
    }

    /// Execute one CPU instruction; the rest of the machine advances in
    /// lockstep. Returns the T-cycles consumed.
    pub fn step(&mut self) -> u32 {
        self.cpu.step(&mut self.mmu)
    }

    pub fn set_joypad(&mut self, state: JoypadState) {
        self.joypad = state;
        self.mmu.input.set_state(state, &mut self.mmu.if_reg);
    }

    /// Run until the PPU finishes the current frame. With the LCD disabled
    /// no vblank ever arrives, so a frame's worth of cycles is run instead
    /// to keep the caller's pacing intact.
    pub fn run_until_vblank(&mut self) {
        let mut budget = 2 * CYCLES_PER_FRAME;
        while !self.mmu.ppu.frame_ready() {
            let spent = self.step();
            budget = budget.saturating_sub(spent);
            if budget == 0 {
                break;
            }
        }
        self.mmu.ppu.clear_frame_flag();
    }

    /// Drive one full frame through the host bridge: pump input, emulate to
    /// vblank, hand over video and audio. Returns `true` when the host
    /// requests shutdown.
    pub fn run_frame(&mut self, host: &mut impl Host) -> bool {
        let mut joypad = self.joypad;
        if host.handle_events(&mut joypad) {
            return true;
        }
        self.set_joypad(joypad);

        self.run_until_vblank();

        host.blit_screen(self.mmu.ppu.framebuffer(), SCREEN_WIDTH);
        host.present_frame();

        self.audio_buf.clear();
        self.mmu.apu.drain_samples(&mut self.audio_buf);
        if !self.audio_buf.is_empty() {
            host.on_audio_generated(&self.audio_buf);
        }
        false
    }

    /// Serial bytes written since the last call; Blargg test ROMs report
    /// their results here.
    pub fn take_serial(&mut self) -> Vec<u8> {
        self.mmu.take_serial()
    }
}

impl Default for GameBoy {
    fn default() -> Self {
        Self::new()
    }
}
