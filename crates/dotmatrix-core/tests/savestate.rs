mod common;

use dotmatrix_core::{cartridge::Cartridge, gameboy::GameBoy, savestate, savestate::SaveStateError};

fn battery_rom(title: &[u8]) -> Vec<u8> {
    let mut rom = common::test_rom_with(0x03, 2, &[0x18, 0xFE]); // MBC1+RAM+battery, JR -2
    rom[0x0149] = 0x02; // 8 KiB RAM
    rom[0x0134..0x0134 + title.len()].copy_from_slice(title);
    common::fix_header_checksum(&mut rom);
    rom
}

fn running_machine(rom: Vec<u8>) -> GameBoy {
    let mut gb = GameBoy::new();
    gb.load_cart(Cartridge::load(rom).unwrap());
    for _ in 0..5000 {
        gb.step();
    }
    gb
}

#[test]
fn round_trip_is_byte_identical() {
    let rom = battery_rom(b"STATE TEST");
    let mut gb = running_machine(rom.clone());
    // Touch some RAM so the snapshot carries cartridge state too.
    gb.mmu.write_byte(0x0000, 0x0A);
    gb.mmu.write_byte(0xA000, 0x5A);

    let s1 = savestate::capture(&gb).unwrap();

    let mut other = GameBoy::new();
    other.load_cart(Cartridge::load(rom).unwrap());
    savestate::restore(&mut other, &s1).unwrap();

    let s2 = savestate::capture(&other).unwrap();
    assert_eq!(s1, s2);
}

#[test]
fn restored_machine_resumes_identically() {
    let rom = battery_rom(b"STATE TEST");
    let mut gb = running_machine(rom.clone());
    let state = savestate::capture(&gb).unwrap();

    let mut other = GameBoy::new();
    other.load_cart(Cartridge::load(rom).unwrap());
    savestate::restore(&mut other, &state).unwrap();

    for _ in 0..5000 {
        gb.step();
        other.step();
    }
    assert_eq!(gb.cpu.pc, other.cpu.pc);
    assert_eq!(gb.cpu.cycles, other.cpu.cycles);
    assert_eq!(gb.cpu.af(), other.cpu.af());
    assert_eq!(gb.mmu.ppu.framebuffer(), other.mmu.ppu.framebuffer());
}

#[test]
fn version_mismatch_is_refused() {
    let rom = battery_rom(b"STATE TEST");
    let gb = running_machine(rom);
    let mut state = savestate::capture(&gb).unwrap();
    state[4..8].copy_from_slice(&2u32.to_le_bytes());

    let mut gb = gb;
    assert!(matches!(
        savestate::restore(&mut gb, &state),
        Err(SaveStateError::UnsupportedVersion { found: 2 })
    ));
}

#[test]
fn wrong_rom_is_refused() {
    let gb = running_machine(battery_rom(b"GAME A"));
    let state = savestate::capture(&gb).unwrap();

    let mut other = GameBoy::new();
    other
        .load_cart(Cartridge::load(battery_rom(b"GAME B")).unwrap());
    assert!(matches!(
        savestate::restore(&mut other, &state),
        Err(SaveStateError::RomMismatch)
    ));
}

#[test]
fn truncated_state_is_refused() {
    let rom = battery_rom(b"STATE TEST");
    let mut gb = running_machine(rom);
    let state = savestate::capture(&gb).unwrap();
    assert!(matches!(
        savestate::restore(&mut gb, &state[..state.len() / 2]),
        Err(SaveStateError::Truncated)
    ));
}

#[test]
fn garbage_is_refused() {
    let rom = battery_rom(b"STATE TEST");
    let mut gb = running_machine(rom);
    assert!(matches!(
        savestate::restore(&mut gb, b"not a save state at all"),
        Err(SaveStateError::BadMagic)
    ));
}
