/*
    rom.rs
    BIOS and option ROM loading. Images land in the 0xC0000-0xFFFFF ROM
    space and are marked read-only in the bus write mask.
*/

use std::error::Error;
use std::fs;
use std::path::Path;
use core::fmt::Display;

use crate::bus::{BusInterface, ADDRESS_SPACE};

pub const BIOS_SEGMENT_BASE: usize = 0xF0000;
pub const VIDEO_ROM_ADDRESS: usize = 0xC0000;
pub const IDE_ROM_ADDRESS: usize = 0xD0000;
pub const BASIC_ROM_ADDRESS: usize = 0xF6000;

// An 8K BIOS leaves room for ROM BASIC and needs a separate video BIOS
pub const SMALL_BIOS_SIZE: usize = 8192;

#[derive(Debug)]
pub enum RomError {
    ReadFailed,
    ImageTooLarge,
}
impl Error for RomError {}
impl Display for RomError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            RomError::ReadFailed => write!(f, "The ROM image could not be read."),
            RomError::ImageTooLarge => write!(f, "The ROM image does not fit at its load address."),
        }
    }
}

/// Load a ROM image at a fixed address and write-protect it.
pub fn load_rom<P: AsRef<Path>>(
    bus: &mut BusInterface,
    path: P,
    address: usize,
) -> Result<usize, RomError> {
    let image = fs::read(path.as_ref()).map_err(|_| RomError::ReadFailed)?;
    bus.copy_from(&image, address, true)
        .map_err(|_| RomError::ImageTooLarge)?;

    log::debug!(
        "ROM: loaded {} ({} bytes) at {:05X}",
        path.as_ref().display(),
        image.len(),
        address
    );
    Ok(image.len())
}

/// Load the system BIOS top-aligned against the end of the address space,
/// so the reset vector at FFFF:0000 falls in its last paragraph. Returns
/// the image size; small (8K-class) BIOSes expect ROM BASIC and a video
/// BIOS to be loaded besides.
pub fn load_bios<P: AsRef<Path>>(bus: &mut BusInterface, path: P) -> Result<usize, RomError> {
    let image = fs::read(path.as_ref()).map_err(|_| RomError::ReadFailed)?;
    if image.is_empty() || image.len() > ADDRESS_SPACE - BIOS_SEGMENT_BASE {
        return Err(RomError::ImageTooLarge);
    }

    let address = ADDRESS_SPACE - image.len();
    bus.copy_from(&image, address, true)
        .map_err(|_| RomError::ImageTooLarge)?;

    log::info!(
        "ROM: BIOS {} ({} bytes) at {:05X}",
        path.as_ref().display(),
        image.len(),
        address
    );
    Ok(image.len())
}
