/*
    bus.rs
    The system bus: 1 MiB of RAM behind a per-byte read-only mask, the
    video apertures, and the 16-bit I/O port space.

    The bus owns the devices (PIC, video adapter, disk service) so that a
    single mutable borrow of the bus reaches everything an instruction can
    touch. Port dispatch goes through a closed IoDeviceType sum resolved
    from a port map built out of each device's port_list(); ports nobody
    claims fall back to a per-port shadow byte.
*/

use std::collections::HashMap;

use crate::config::VideoType;
use crate::disk::DiskService;
use crate::memerror::MemError;
use crate::pic::Pic;
use crate::video::VideoCard;

pub const ADDRESS_SPACE: usize = 0x100_000;
const ADDRESS_MASK: u32 = 0xFFFFF;

const ROM_BIT: u8 = 0b1000_0000;

// The video apertures bypass RAM entirely
const VGA_APERTURE_BASE: u32 = 0xA0000;
const VGA_APERTURE_END: u32 = 0xAFFFF;
const TEXT_APERTURE_BASE: u32 = 0xB0000;
const TEXT_APERTURE_END: u32 = 0xBFFFF;

pub trait IoDevice {
    fn read_u8(&mut self, port: u16) -> u8;
    fn write_u8(&mut self, port: u16, data: u8);
    fn port_list(&self) -> Vec<u16>;
}

/// The closed set of devices reachable through the port map.
#[derive(Copy, Clone, Debug)]
pub enum IoDeviceType {
    Pic,
    Video,
}

pub struct BusInterface {
    memory: Vec<u8>,
    memory_mask: Vec<u8>,
    port_shadow: Vec<u8>,
    io_map: HashMap<u16, IoDeviceType>,

    pic: Pic,
    video: VideoCard,
    disks: Option<DiskService>,
}

impl BusInterface {
    pub fn new(video_type: VideoType) -> BusInterface {
        let pic = Pic::new();
        let video = VideoCard::new(video_type);

        let mut io_map = HashMap::new();
        io_map.extend(pic.port_list().iter().map(|p| (*p, IoDeviceType::Pic)));
        io_map.extend(video.port_list().iter().map(|p| (*p, IoDeviceType::Video)));

        BusInterface {
            memory: vec![0; ADDRESS_SPACE],
            memory_mask: vec![0; ADDRESS_SPACE],
            port_shadow: vec![0; 0x10000],
            io_map,
            pic,
            video,
            disks: Some(DiskService::new()),
        }
    }

    pub fn size(&self) -> usize {
        self.memory.len()
    }

    /// Zero all RAM outside the ROM mask.
    pub fn clear_ram(&mut self) {
        for (byte, mask) in self.memory.iter_mut().zip(self.memory_mask.iter()) {
            if mask & ROM_BIT == 0 {
                *byte = 0;
            }
        }
    }

    /// Copy an image into memory, optionally marking the region read-only.
    /// ROM loading is the only path that sets the mask.
    pub fn copy_from(&mut self, src: &[u8], location: usize, read_only: bool) -> Result<(), MemError> {
        if location + src.len() > self.memory.len() {
            return Err(MemError::LoadOutOfBounds);
        }

        self.memory[location..location + src.len()].copy_from_slice(src);

        if read_only {
            for mask in &mut self.memory_mask[location..location + src.len()] {
                *mask |= ROM_BIT;
            }
        }
        Ok(())
    }

    /// A borrowed view of RAM; does not reflect the video apertures.
    pub fn get_slice_at(&self, start: usize, len: usize) -> &[u8] {
        &self.memory[start..start + len]
    }

    pub fn read_u8(&mut self, address: u32) -> u8 {
        let address = address & ADDRESS_MASK;
        match address {
            VGA_APERTURE_BASE..=VGA_APERTURE_END => {
                self.video.mem_read_u8(address - VGA_APERTURE_BASE)
            }
            TEXT_APERTURE_BASE..=TEXT_APERTURE_END => {
                self.video.text_read_u8(address - TEXT_APERTURE_BASE)
            }
            _ => self.memory[address as usize],
        }
    }

    pub fn write_u8(&mut self, address: u32, data: u8) {
        let address = address & ADDRESS_MASK;
        match address {
            VGA_APERTURE_BASE..=VGA_APERTURE_END => {
                self.video.mem_write_u8(address - VGA_APERTURE_BASE, data);
            }
            TEXT_APERTURE_BASE..=TEXT_APERTURE_END => {
                self.video.text_write_u8(address - TEXT_APERTURE_BASE, data);
            }
            _ => {
                if self.memory_mask[address as usize] & ROM_BIT == 0 {
                    self.memory[address as usize] = data;
                }
            }
        }
    }

    /// 16-bit accesses are little-endian and may straddle any boundary,
    /// including the 20-bit wrap.
    pub fn read_u16(&mut self, address: u32) -> u16 {
        let lo = self.read_u8(address);
        let hi = self.read_u8(address.wrapping_add(1));
        (hi as u16) << 8 | lo as u16
    }

    pub fn write_u16(&mut self, address: u32, data: u16) {
        self.write_u8(address, data as u8);
        self.write_u8(address.wrapping_add(1), (data >> 8) as u8);
    }

    // ---- I/O port space ---------------------------------------------------

    pub fn io_read_u8(&mut self, port: u16) -> u8 {
        match self.io_map.get(&port) {
            Some(IoDeviceType::Pic) => self.pic.read_u8(port),
            Some(IoDeviceType::Video) => self.video.read_u8(port),
            None => self.port_shadow[port as usize],
        }
    }

    pub fn io_write_u8(&mut self, port: u16, data: u8) {
        match self.io_map.get(&port) {
            Some(IoDeviceType::Pic) => self.pic.write_u8(port, data),
            Some(IoDeviceType::Video) => self.video.write_u8(port, data),
            None => {
                self.port_shadow[port as usize] = data;
            }
        }
    }

    /// Deposit a byte in the port shadow from the host side (keyboard
    /// scancodes at port 0x60).
    pub fn set_port_shadow(&mut self, port: u16, data: u8) {
        self.port_shadow[port as usize] = data;
    }

    // ---- device accessors -------------------------------------------------

    pub fn pic(&self) -> &Pic {
        &self.pic
    }

    pub fn pic_mut(&mut self) -> &mut Pic {
        &mut self.pic
    }

    pub fn video(&self) -> &VideoCard {
        &self.video
    }

    pub fn video_mut(&mut self) -> &mut VideoCard {
        &mut self.video
    }

    pub fn disks(&self) -> Option<&DiskService> {
        self.disks.as_ref()
    }

    pub fn disks_mut(&mut self) -> &mut DiskService {
        self.disks.as_mut().expect("disk service checked out")
    }

    /// Check the disk service out of the bus so it can operate on guest
    /// memory through the same bus borrow; pair with disks_put.
    pub fn disks_take(&mut self) -> Option<DiskService> {
        self.disks.take()
    }

    pub fn disks_put(&mut self, disks: DiskService) {
        self.disks = Some(disks);
    }

    pub fn reset_devices(&mut self) {
        self.pic.reset();
        self.video.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus() -> BusInterface {
        BusInterface::new(VideoType::VGA)
    }

    #[test]
    fn ram_write_reads_back_outside_aperture_and_rom() {
        let mut bus = bus();

        bus.write_u8(0x1234, 0x42);
        assert_eq!(bus.read_u8(0x1234), 0x42);

        bus.write_u8(0x9FFFF, 0x99);
        assert_eq!(bus.read_u8(0x9FFFF), 0x99);
    }

    #[test]
    fn rom_mask_blocks_writes() {
        let mut bus = bus();

        bus.copy_from(&[0x11, 0x22, 0x33], 0xF0000, true).unwrap();
        bus.write_u8(0xF0001, 0x55);
        assert_eq!(bus.read_u8(0xF0001), 0x22);

        // Unmasked memory just before the ROM is still writable
        bus.write_u8(0xEFFFF, 0x55);
        assert_eq!(bus.read_u8(0xEFFFF), 0x55);
    }

    #[test]
    fn vga_aperture_bypasses_ram() {
        let mut bus = bus();

        // The planar pipeline, not RAM, receives this write; with power-on
        // defaults it lands in all planes
        bus.write_u8(0xA0000, 0x7E);
        assert_eq!(bus.video().plane_slice(0)[0], 0x7E);
        assert_eq!(bus.get_slice_at(0xA0000, 1)[0], 0x00);
    }

    #[test]
    fn text_aperture_is_adapter_memory() {
        let mut bus = bus();

        bus.write_u8(0xB8000, b'A');
        bus.write_u8(0xB8001, 0x07);
        assert_eq!(bus.read_u8(0xB8000), b'A');
        assert_eq!(bus.video().text_slice()[0x8000], b'A');
        assert_eq!(bus.get_slice_at(0xB8000, 1)[0], 0x00);
    }

    #[test]
    fn word_access_is_little_endian_and_may_straddle() {
        let mut bus = bus();

        bus.write_u16(0x2000, 0x1234);
        assert_eq!(bus.read_u8(0x2000), 0x34);
        assert_eq!(bus.read_u8(0x2001), 0x12);

        // Odd (misaligned) address
        bus.write_u16(0x2001, 0xBEEF);
        assert_eq!(bus.read_u16(0x2001), 0xBEEF);
    }

    #[test]
    fn addresses_wrap_at_20_bits() {
        let mut bus = bus();

        bus.write_u8(0x100000, 0x77);
        assert_eq!(bus.read_u8(0x00000), 0x77);

        // A word write at the top of the address space wraps to zero
        bus.write_u16(0xFFFFF, 0xAB12);
        assert_eq!(bus.read_u8(0xFFFFF), 0x12);
        assert_eq!(bus.read_u8(0x00000), 0xAB);
    }

    #[test]
    fn unhandled_ports_use_the_shadow_byte() {
        let mut bus = bus();

        assert_eq!(bus.io_read_u8(0x0278), 0x00);
        bus.io_write_u8(0x0278, 0x5A);
        assert_eq!(bus.io_read_u8(0x0278), 0x5A);
    }

    #[test]
    fn pic_and_video_ports_are_mapped() {
        let mut bus = bus();

        // IMR through the PIC data port
        bus.io_write_u8(0x21, 0xA5);
        assert_eq!(bus.io_read_u8(0x21), 0xA5);

        // CRTC through the CGA range
        bus.io_write_u8(0x3D4, 0x0E);
        bus.io_write_u8(0x3D5, 0x12);
        assert_eq!(bus.io_read_u8(0x3D5), 0x12);
    }
}
