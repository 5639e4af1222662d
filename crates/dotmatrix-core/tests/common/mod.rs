use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;

#[allow(dead_code)]
static INIT: OnceCell<()> = OnceCell::new();

/// Build a minimal 32 KiB ROM-only image with `code` placed at the entry
/// point (0x0100) and a valid header checksum.
#[allow(dead_code)]
pub fn test_rom(code: &[u8]) -> Vec<u8> {
    test_rom_with(0x00, 2, code)
}

/// Synthesized ROM with an explicit cartridge-type byte and bank count.
#[allow(dead_code)]
pub fn test_rom_with(cart_type: u8, banks: usize, code: &[u8]) -> Vec<u8> {
    let mut rom = vec![0u8; banks * 0x4000];
    rom[0x0100..0x0100 + code.len()].copy_from_slice(code);
    rom[0x0147] = cart_type;
    fix_header_checksum(&mut rom);
    rom
}

#[allow(dead_code)]
pub fn fix_header_checksum(rom: &mut [u8]) {
    let checksum = rom[0x0134..0x014D]
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_sub(b).wrapping_sub(1));
    rom[0x014D] = checksum;
}

#[allow(dead_code)]
fn ensure_test_roms() {
    INIT.get_or_init(|| {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("test_roms");
        fs::create_dir_all(&dir).expect("failed to create test_roms directory");

        // ROM binaries are not checked in; the c-sp bundle is fetched on
        // demand. Skip the download when an extracted tree already exists.
        if dir.join("blargg").exists() && dir.join("dmg-acid2").exists() {
            return;
        }

        let url = "https://github.com/c-sp/game-boy-test-roms/releases/download/v7.0/game-boy-test-roms-v7.0.zip";
        let resp = reqwest::blocking::get(url).expect("failed to download test roms");
        let status = resp.status();
        if !status.is_success() {
            panic!("failed to download test roms: {status}");
        }
        let bytes = resp.bytes().expect("failed to read rom bytes");
        let reader = std::io::Cursor::new(bytes);
        let mut archive = zip::ZipArchive::new(reader).expect("failed to open zip archive");
        archive.extract(&dir).expect("failed to extract test roms");
    });
}

#[allow(dead_code)]
pub fn rom_path<P: AsRef<Path>>(relative: P) -> PathBuf {
    ensure_test_roms();
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("test_roms")
        .join(relative)
}

/// Scan serial output for Blargg's final verdict strings.
#[allow(dead_code)]
pub fn serial_verdict(serial: &[u8]) -> Option<bool> {
    const PASSED: &[u8] = b"Passed";
    const FAILED: &[u8] = b"Failed";
    if serial.windows(PASSED.len()).any(|w| w == PASSED) {
        return Some(true);
    }
    if serial.windows(FAILED.len()).any(|w| w == FAILED) {
        return Some(false);
    }
    None
}

#[allow(dead_code)]
pub fn load_png_rgb<P: AsRef<Path>>(path: P) -> (u32, u32, Vec<[u8; 3]>) {
    let file = File::open(path.as_ref()).expect("failed to open png");
    let mut decoder = png::Decoder::new(BufReader::new(file));
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info().expect("failed to read png info");
    let buffer_size = reader
        .output_buffer_size()
        .expect("failed to get png buffer size");
    let mut buf = vec![0; buffer_size];
    let info = reader
        .next_frame(&mut buf)
        .expect("failed to decode png frame");
    let data = &buf[..info.buffer_size()];

    let mut pixels = Vec::with_capacity(info.width as usize * info.height as usize);
    match reader.info().color_type {
        png::ColorType::Rgb => {
            for chunk in data.chunks_exact(3) {
                pixels.push([chunk[0], chunk[1], chunk[2]]);
            }
        }
        png::ColorType::Rgba => {
            for chunk in data.chunks_exact(4) {
                pixels.push([chunk[0], chunk[1], chunk[2]]);
            }
        }
        png::ColorType::Grayscale => {
            for &gray in data {
                pixels.push([gray, gray, gray]);
            }
        }
        other => panic!("unsupported png color type {other:?}"),
    }
    (info.width, info.height, pixels)
}
