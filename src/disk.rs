/*
    disk.rs
    BIOS-level disk emulation: a 256-slot drive table behind the INT 13h
    service. Works in whole 512-byte sectors against a pluggable block
    backing, and moves data through the memory bus so that ROM regions
    stay protected from guest-initiated reads.

    Drive numbering follows the BIOS convention: 0x00-0x7F are floppies,
    0x80-0xFF fixed disks.
*/

use std::error::Error;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use core::fmt::Display;

use crate::bus::BusInterface;
use crate::cpu::{Cpu, Flag, Register8, Register16};

pub const SECTOR_SIZE: usize = 512;

const DRIVE_COUNT: usize = 256;
pub const FIXED_DISK_BASE: u8 = 0x80;
pub const BOOT_ROM_BASIC: u8 = 0xFF;

// INT 13h status codes surfaced in AH
const STATUS_OK: u8 = 0x00;
const STATUS_BAD_COMMAND: u8 = 0x01;
const STATUS_SECTOR_NOT_FOUND: u8 = 0x04;
const STATUS_WRITE_FAULT: u8 = 0xCC;
const STATUS_NO_DRIVE: u8 = 0xAA;

// BIOS data area byte mirroring the last fixed-disk status
const BDA_DISK_STATUS: u32 = 0x474;

#[derive(Debug)]
pub enum DiskError {
    FileOpenFailed,
    RawDeviceUnsupported,
    IoFailed,
}
impl Error for DiskError {}
impl Display for DiskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            DiskError::FileOpenFailed => write!(f, "The disk image file could not be opened."),
            DiskError::RawDeviceUnsupported => {
                write!(f, "Raw device paths require a host-supplied block backing.")
            }
            DiskError::IoFailed => write!(f, "A host I/O operation on the disk backing failed."),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DriveGeometry {
    pub cylinders: u32,
    pub heads: u32,
    pub sectors: u32,
}

/// The host interface the disk service needs: byte size, optional native
/// geometry (raw devices), and whole-sector transfers at a seek offset.
pub trait BlockBacking {
    fn size(&self) -> u64;
    fn geometry(&self) -> Option<DriveGeometry> {
        None
    }
    fn seek_to(&mut self, offset: u64) -> Result<(), DiskError>;
    fn read_sector(&mut self, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), DiskError>;
    fn write_sector(&mut self, buf: &[u8; SECTOR_SIZE]) -> Result<(), DiskError>;
}

/// A raw sector-aligned image file, opened read-write.
pub struct DiskImage {
    file: File,
    size: u64,
}

impl DiskImage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DiskError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|_| DiskError::FileOpenFailed)?;
        let size = file.metadata().map_err(|_| DiskError::FileOpenFailed)?.len();
        Ok(DiskImage { file, size })
    }
}

impl BlockBacking for DiskImage {
    fn size(&self) -> u64 {
        self.size
    }

    fn seek_to(&mut self, offset: u64) -> Result<(), DiskError> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map(|_| ())
            .map_err(|_| DiskError::IoFailed)
    }

    fn read_sector(&mut self, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), DiskError> {
        self.file.read_exact(buf).map_err(|_| DiskError::IoFailed)
    }

    fn write_sector(&mut self, buf: &[u8; SECTOR_SIZE]) -> Result<(), DiskError> {
        self.file.write_all(buf).map_err(|_| DiskError::IoFailed)
    }
}

/// Floppy geometry from the image size, smallest format first.
fn floppy_geometry(size: u64) -> DriveGeometry {
    let (cylinders, sectors, heads) = if size <= 163_840 {
        (40, 8, 1)
    }
    else if size <= 368_640 {
        (40, 9, 2)
    }
    else if size <= 737_280 {
        (80, 9, 2)
    }
    else if size <= 1_228_800 {
        (80, 15, 2)
    }
    else {
        (80, 18, 2)
    };
    DriveGeometry { cylinders, heads, sectors }
}

/// Fixed-disk images use a fixed 63x16 track layout; the cylinder count
/// falls out of the size.
fn fixed_disk_geometry(size: u64) -> DriveGeometry {
    DriveGeometry {
        cylinders: (size / (63 * 16 * SECTOR_SIZE as u64)) as u32,
        heads: 16,
        sectors: 63,
    }
}

struct Drive {
    backing: Box<dyn BlockBacking>,
    size: u64,
    geometry: DriveGeometry,
}

pub struct DiskService {
    drives: Vec<Option<Drive>>,
    boot_drive: u8,
    hd_count: u8,
    last_status: [u8; DRIVE_COUNT],
    last_carry: [bool; DRIVE_COUNT],
}

impl DiskService {
    pub fn new() -> Self {
        DiskService {
            drives: (0..DRIVE_COUNT).map(|_| None).collect(),
            boot_drive: 0,
            hd_count: 0,
            last_status: [0; DRIVE_COUNT],
            last_carry: [false; DRIVE_COUNT],
        }
    }

    /// Insert a disk by path. Paths with the `\\` raw-device prefix are the
    /// host's responsibility; it should construct a BlockBacking and call
    /// insert_backing instead.
    pub fn insert(&mut self, drive_num: u8, path: &str) -> Result<(), DiskError> {
        if path.starts_with("\\\\") {
            return Err(DiskError::RawDeviceUnsupported);
        }
        let image = DiskImage::open(path)?;
        self.insert_backing(drive_num, Box::new(image))
    }

    /// Insert a prepared backing. Replacing an inserted drive releases the
    /// prior backing first.
    pub fn insert_backing(
        &mut self,
        drive_num: u8,
        backing: Box<dyn BlockBacking>,
    ) -> Result<(), DiskError> {
        let size = backing.size();
        let geometry = backing.geometry().unwrap_or_else(|| {
            if drive_num >= FIXED_DISK_BASE {
                fixed_disk_geometry(size)
            }
            else {
                floppy_geometry(size)
            }
        });

        log::debug!(
            "DISK: insert drive {:02X}: {} bytes, CHS {}/{}/{}",
            drive_num,
            size,
            geometry.cylinders,
            geometry.heads,
            geometry.sectors
        );

        let slot = &mut self.drives[drive_num as usize];
        if slot.is_none() && drive_num >= FIXED_DISK_BASE {
            self.hd_count += 1;
        }
        *slot = Some(Drive { backing, size, geometry });
        Ok(())
    }

    /// Eject a disk, releasing its backing handle.
    pub fn eject(&mut self, drive_num: u8) {
        if self.drives[drive_num as usize].take().is_some() && drive_num >= FIXED_DISK_BASE {
            self.hd_count -= 1;
        }
    }

    pub fn is_inserted(&self, drive_num: u8) -> bool {
        self.drives[drive_num as usize].is_some()
    }

    pub fn hd_count(&self) -> u8 {
        self.hd_count
    }

    pub fn set_boot_drive(&mut self, drive_num: u8) {
        self.boot_drive = drive_num;
    }

    pub fn boot_drive(&self) -> u8 {
        self.boot_drive
    }

    pub fn geometry(&self, drive_num: u8) -> Option<DriveGeometry> {
        self.drives[drive_num as usize].as_ref().map(|d| d.geometry)
    }

    /// Read `count` sectors from the addressed CHS position into guest
    /// memory at dst_seg:dst_off. Each sector stages in a local buffer and
    /// is stored byte-wise through the bus so ROM regions are honored.
    /// Registers report the outcome: AL = sectors transferred, AH = status,
    /// CF set on failure. A short read stops at the failing sector but
    /// still reports what was transferred.
    #[allow(clippy::too_many_arguments)]
    pub fn read_sectors(
        &mut self,
        cpu: &mut Cpu,
        bus: &mut BusInterface,
        drive_num: u8,
        dst_seg: u16,
        dst_off: u16,
        cyl: u16,
        sect: u16,
        head: u16,
        count: u8,
    ) {
        let drive = match self.addressable_drive(drive_num, cyl, sect, head) {
            Some(drive) => drive,
            None => {
                cpu.set_register8(Register8::AH, STATUS_SECTOR_NOT_FOUND);
                cpu.set_flag(Flag::Carry);
                return;
            }
        };

        let lba = chs_to_lba(&drive.geometry, cyl, sect, head);
        if drive.backing.seek_to(lba * SECTOR_SIZE as u64).is_err() {
            cpu.set_register8(Register8::AH, STATUS_SECTOR_NOT_FOUND);
            cpu.set_flag(Flag::Carry);
            return;
        }

        let mut buffer = [0u8; SECTOR_SIZE];
        let mut dest = Cpu::calc_linear_address(dst_seg, dst_off);
        let mut transferred: u8 = 0;
        for _ in 0..count {
            if drive.backing.read_sector(&mut buffer).is_err() {
                log::warn!(
                    "DISK: drive {:02X}: short read at LBA {}",
                    drive_num,
                    lba + transferred as u64
                );
                break;
            }
            for byte in buffer.iter() {
                bus.write_u8(dest, *byte);
                dest = dest.wrapping_add(1) & 0xFFFFF;
            }
            transferred += 1;
        }

        cpu.set_register8(Register8::AL, transferred);
        cpu.set_register8(Register8::AH, STATUS_OK);
        cpu.clear_flag(Flag::Carry);
    }

    /// Write `count` sectors from guest memory at src_seg:src_off to the
    /// addressed CHS position. Source bytes are fetched through the bus. A
    /// failing host write stops the operation and reports a write fault.
    #[allow(clippy::too_many_arguments)]
    pub fn write_sectors(
        &mut self,
        cpu: &mut Cpu,
        bus: &mut BusInterface,
        drive_num: u8,
        src_seg: u16,
        src_off: u16,
        cyl: u16,
        sect: u16,
        head: u16,
        count: u8,
    ) {
        let drive = match self.addressable_drive(drive_num, cyl, sect, head) {
            Some(drive) => drive,
            None => {
                cpu.set_register8(Register8::AH, STATUS_SECTOR_NOT_FOUND);
                cpu.set_flag(Flag::Carry);
                return;
            }
        };

        let lba = chs_to_lba(&drive.geometry, cyl, sect, head);
        if drive.backing.seek_to(lba * SECTOR_SIZE as u64).is_err() {
            cpu.set_register8(Register8::AH, STATUS_SECTOR_NOT_FOUND);
            cpu.set_flag(Flag::Carry);
            return;
        }

        let mut buffer = [0u8; SECTOR_SIZE];
        let mut src = Cpu::calc_linear_address(src_seg, src_off);
        for _ in 0..count {
            for byte in buffer.iter_mut() {
                *byte = bus.read_u8(src);
                src = src.wrapping_add(1) & 0xFFFFF;
            }
            if drive.backing.write_sector(&buffer).is_err() {
                log::warn!("DISK: drive {:02X}: write fault", drive_num);
                cpu.set_register8(Register8::AH, STATUS_WRITE_FAULT);
                cpu.set_flag(Flag::Carry);
                return;
            }
        }

        cpu.set_register8(Register8::AL, count);
        cpu.set_register8(Register8::AH, STATUS_OK);
        cpu.clear_flag(Flag::Carry);
    }

    /// Validate drive and CHS address; sector numbers are 1-based and a
    /// transfer may not start beyond the end of the backing.
    fn addressable_drive(
        &mut self,
        drive_num: u8,
        cyl: u16,
        sect: u16,
        head: u16,
    ) -> Option<&mut Drive> {
        let drive = self.drives[drive_num as usize].as_mut()?;
        if sect == 0 {
            return None;
        }
        let lba = chs_to_lba(&drive.geometry, cyl, sect, head);
        if lba * SECTOR_SIZE as u64 > drive.size {
            return None;
        }
        Some(drive)
    }

    /// INT 13h entry point, dispatched on AH.
    pub fn int13(&mut self, cpu: &mut Cpu, bus: &mut BusInterface) {
        let dl = cpu.get_register8(Register8::DL);

        match cpu.get_register8(Register8::AH) {
            0x00 => {
                // Reset disk system: nothing mechanical to reset
                cpu.set_register8(Register8::AH, STATUS_OK);
                cpu.clear_flag(Flag::Carry);
            }
            0x01 => {
                // Return last status for drive DL
                cpu.set_register8(Register8::AH, self.last_status[dl as usize]);
                cpu.set_flag_state(Flag::Carry, self.last_carry[dl as usize]);
            }
            0x02 => {
                if self.is_inserted(dl) {
                    let (cyl, sect, head, count) = int13_chs(cpu);
                    let es = cpu.get_register16(Register16::ES);
                    let bx = cpu.get_register16(Register16::BX);
                    self.read_sectors(cpu, bus, dl, es, bx, cyl, sect, head, count);
                }
                else {
                    cpu.set_register8(Register8::AH, STATUS_BAD_COMMAND);
                    cpu.set_flag(Flag::Carry);
                }
            }
            0x03 => {
                if self.is_inserted(dl) {
                    let (cyl, sect, head, count) = int13_chs(cpu);
                    let es = cpu.get_register16(Register16::ES);
                    let bx = cpu.get_register16(Register16::BX);
                    self.write_sectors(cpu, bus, dl, es, bx, cyl, sect, head, count);
                }
                else {
                    cpu.set_register8(Register8::AH, STATUS_BAD_COMMAND);
                    cpu.set_flag(Flag::Carry);
                }
            }
            0x04 | 0x05 => {
                // Verify / format track: report success
                cpu.set_register8(Register8::AH, STATUS_OK);
                cpu.clear_flag(Flag::Carry);
            }
            0x08 => {
                // Get drive parameters
                match self.geometry(dl) {
                    Some(geometry) => {
                        cpu.set_register8(Register8::AH, STATUS_OK);
                        cpu.set_register8(Register8::CH, geometry.cylinders.wrapping_sub(1) as u8);
                        let cl = (geometry.sectors as u8 & 0x3F)
                            | ((geometry.cylinders / 256) << 6) as u8;
                        cpu.set_register8(Register8::CL, cl);
                        cpu.set_register8(Register8::DH, geometry.heads.wrapping_sub(1) as u8);
                        if dl < FIXED_DISK_BASE {
                            cpu.set_register8(Register8::BL, 4);
                            cpu.set_register8(Register8::DL, 2);
                        }
                        else {
                            cpu.set_register8(Register8::DL, self.hd_count);
                        }
                        cpu.clear_flag(Flag::Carry);
                    }
                    None => {
                        cpu.set_register8(Register8::AH, STATUS_NO_DRIVE);
                        cpu.set_flag(Flag::Carry);
                    }
                }
            }
            _ => {
                cpu.set_flag(Flag::Carry);
            }
        }

        // Every call leaves its outcome in the per-drive status tables, and
        // fixed disks mirror AH into the BIOS data area.
        let dl = cpu.get_register8(Register8::DL);
        let ah = cpu.get_register8(Register8::AH);
        self.last_status[dl as usize] = ah;
        self.last_carry[dl as usize] = cpu.get_flag(Flag::Carry);
        if dl & 0x80 != 0 {
            bus.write_u8(BDA_DISK_STATUS, ah);
        }
    }

    /// Load the first sector of the boot drive to 07C0:0000 and transfer
    /// control to it; boot drive 0xFF starts ROM BASIC instead.
    pub fn boot(&mut self, cpu: &mut Cpu, bus: &mut BusInterface) {
        if self.boot_drive < BOOT_ROM_BASIC {
            cpu.set_register8(Register8::DL, self.boot_drive);
            self.read_sectors(cpu, bus, self.boot_drive, 0x07C0, 0x0000, 0, 1, 0, 1);
            cpu.set_register16(Register16::CS, 0x0000);
            cpu.set_register16(Register16::IP, 0x7C00);
        }
        else {
            cpu.set_register16(Register16::CS, 0xF600);
            cpu.set_register16(Register16::IP, 0x0000);
        }
    }
}

/// CHS to logical block address. Sector numbers are 1-based.
fn chs_to_lba(geometry: &DriveGeometry, cyl: u16, sect: u16, head: u16) -> u64 {
    (cyl as u64 * geometry.heads as u64 + head as u64) * geometry.sectors as u64 + sect as u64 - 1
}

/// Decode the INT 13h CHS registers: CL bits 7..6 extend the cylinder.
fn int13_chs(cpu: &Cpu) -> (u16, u16, u16, u8) {
    let ch = cpu.get_register8(Register8::CH) as u16;
    let cl = cpu.get_register8(Register8::CL) as u16;
    let cyl = ch + (cl / 64) * 256;
    let sect = cl & 63;
    let head = cpu.get_register8(Register8::DH) as u16;
    let count = cpu.get_register8(Register8::AL);
    (cyl, sect, head, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusInterface;
    use crate::config::VideoType;

    /// An in-memory backing for tests.
    struct RamDisk {
        data: Vec<u8>,
        pos: u64,
    }

    impl RamDisk {
        fn new(size: usize) -> Self {
            RamDisk { data: vec![0; size], pos: 0 }
        }

        fn patterned(size: usize) -> Self {
            let mut disk = RamDisk::new(size);
            for (i, byte) in disk.data.iter_mut().enumerate() {
                *byte = ((i / SECTOR_SIZE) & 0xFF) as u8;
            }
            disk
        }
    }

    impl BlockBacking for RamDisk {
        fn size(&self) -> u64 {
            self.data.len() as u64
        }
        fn seek_to(&mut self, offset: u64) -> Result<(), DiskError> {
            self.pos = offset;
            Ok(())
        }
        fn read_sector(&mut self, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), DiskError> {
            let start = self.pos as usize;
            let end = start + SECTOR_SIZE;
            if end > self.data.len() {
                return Err(DiskError::IoFailed);
            }
            buf.copy_from_slice(&self.data[start..end]);
            self.pos = end as u64;
            Ok(())
        }
        fn write_sector(&mut self, buf: &[u8; SECTOR_SIZE]) -> Result<(), DiskError> {
            let start = self.pos as usize;
            let end = start + SECTOR_SIZE;
            if end > self.data.len() {
                return Err(DiskError::IoFailed);
            }
            self.data[start..end].copy_from_slice(buf);
            self.pos = end as u64;
            Ok(())
        }
    }

    fn service_with_floppy() -> DiskService {
        // A full 1.44M floppy: geometry 80/18/2
        let mut disks = DiskService::new();
        disks
            .insert_backing(0x00, Box::new(RamDisk::patterned(1_474_560)))
            .unwrap();
        disks
    }

    fn test_bus() -> BusInterface {
        BusInterface::new(VideoType::VGA)
    }

    #[test]
    fn floppy_geometry_table() {
        assert_eq!(
            floppy_geometry(163_840),
            DriveGeometry { cylinders: 40, heads: 1, sectors: 8 }
        );
        assert_eq!(
            floppy_geometry(368_640),
            DriveGeometry { cylinders: 40, heads: 2, sectors: 9 }
        );
        assert_eq!(
            floppy_geometry(737_280),
            DriveGeometry { cylinders: 80, heads: 2, sectors: 9 }
        );
        assert_eq!(
            floppy_geometry(1_228_800),
            DriveGeometry { cylinders: 80, heads: 2, sectors: 15 }
        );
        assert_eq!(
            floppy_geometry(1_474_560),
            DriveGeometry { cylinders: 80, heads: 2, sectors: 18 }
        );
    }

    #[test]
    fn fixed_disk_geometry_from_size() {
        let geometry = fixed_disk_geometry(63 * 16 * 512 * 40);
        assert_eq!(
            geometry,
            DriveGeometry { cylinders: 40, heads: 16, sectors: 63 }
        );
    }

    #[test]
    fn chs_to_lba_for_a_1440k_floppy() {
        let geometry = DriveGeometry { cylinders: 80, heads: 2, sectors: 18 };
        assert_eq!(chs_to_lba(&geometry, 1, 1, 0), 18);
        assert_eq!(chs_to_lba(&geometry, 0, 1, 1), 18);
        assert_eq!(chs_to_lba(&geometry, 1, 18, 1), 53);
    }

    #[test]
    fn int13_read_transfers_one_sector() {
        let mut disks = service_with_floppy();
        let mut bus = test_bus();
        let mut cpu = Cpu::new();

        // Read C=1 H=0 S=1 (LBA 18) to 1000:0000
        cpu.set_register8(Register8::AH, 0x02);
        cpu.set_register8(Register8::AL, 1);
        cpu.set_register8(Register8::CH, 1);
        cpu.set_register8(Register8::CL, 1);
        cpu.set_register8(Register8::DH, 0);
        cpu.set_register8(Register8::DL, 0);
        cpu.set_register16(Register16::ES, 0x1000);
        cpu.set_register16(Register16::BX, 0x0000);
        disks.int13(&mut cpu, &mut bus);

        assert_eq!(cpu.get_register8(Register8::AL), 1);
        assert_eq!(cpu.get_register8(Register8::AH), 0);
        assert!(!cpu.get_flag(Flag::Carry));
        // LBA 18 pattern byte
        assert_eq!(bus.read_u8(0x10000), 18);
        assert_eq!(bus.read_u8(0x101FF), 18);
        // Only one sector arrived
        assert_eq!(bus.read_u8(0x10200), 0);
    }

    #[test]
    fn int13_write_then_read_round_trips() {
        let mut disks = service_with_floppy();
        let mut bus = test_bus();
        let mut cpu = Cpu::new();

        for i in 0..SECTOR_SIZE {
            bus.write_u8(0x20000 + i as u32, (i & 0xFF) as u8);
        }

        // Write C=1 H=1 S=18 (LBA 53) from 2000:0000
        cpu.set_register8(Register8::AH, 0x03);
        cpu.set_register8(Register8::AL, 1);
        cpu.set_register8(Register8::CH, 1);
        cpu.set_register8(Register8::CL, 18);
        cpu.set_register8(Register8::DH, 1);
        cpu.set_register8(Register8::DL, 0);
        cpu.set_register16(Register16::ES, 0x2000);
        cpu.set_register16(Register16::BX, 0x0000);
        disks.int13(&mut cpu, &mut bus);
        assert!(!cpu.get_flag(Flag::Carry));

        // Read it back to 3000:0000
        cpu.set_register8(Register8::AH, 0x02);
        cpu.set_register8(Register8::AL, 1);
        cpu.set_register8(Register8::CH, 1);
        cpu.set_register8(Register8::CL, 18);
        cpu.set_register8(Register8::DH, 1);
        cpu.set_register16(Register16::ES, 0x3000);
        disks.int13(&mut cpu, &mut bus);

        assert_eq!(cpu.get_register8(Register8::AL), 1);
        for i in 0..SECTOR_SIZE {
            assert_eq!(bus.read_u8(0x30000 + i as u32), (i & 0xFF) as u8);
        }
    }

    #[test]
    fn read_to_rom_region_leaves_rom_intact() {
        let mut disks = service_with_floppy();
        let mut bus = test_bus();
        let mut cpu = Cpu::new();

        let rom = vec![0xEE; SECTOR_SIZE];
        bus.copy_from(&rom, 0xF0000, true).unwrap();

        cpu.set_register8(Register8::AH, 0x02);
        cpu.set_register8(Register8::AL, 1);
        cpu.set_register8(Register8::CH, 1);
        cpu.set_register8(Register8::CL, 1);
        cpu.set_register8(Register8::DH, 0);
        cpu.set_register8(Register8::DL, 0);
        cpu.set_register16(Register16::ES, 0xF000);
        cpu.set_register16(Register16::BX, 0x0000);
        disks.int13(&mut cpu, &mut bus);

        // The transfer "succeeds" but the ROM bytes are untouched
        assert!(!cpu.get_flag(Flag::Carry));
        assert_eq!(bus.read_u8(0xF0000), 0xEE);
    }

    #[test]
    fn zero_sector_is_rejected() {
        let mut disks = service_with_floppy();
        let mut bus = test_bus();
        let mut cpu = Cpu::new();

        cpu.set_register8(Register8::AH, 0x02);
        cpu.set_register8(Register8::AL, 1);
        cpu.set_register8(Register8::CH, 0);
        cpu.set_register8(Register8::CL, 0);
        cpu.set_register8(Register8::DH, 0);
        cpu.set_register8(Register8::DL, 0);
        cpu.set_register16(Register16::ES, 0x1000);
        cpu.set_register16(Register16::BX, 0x0000);
        disks.int13(&mut cpu, &mut bus);

        assert!(cpu.get_flag(Flag::Carry));
        assert_eq!(cpu.get_register8(Register8::AH), STATUS_SECTOR_NOT_FOUND);
    }

    #[test]
    fn last_status_is_tracked_per_drive() {
        let mut disks = service_with_floppy();
        let mut bus = test_bus();
        let mut cpu = Cpu::new();

        // A read from a missing drive fails
        cpu.set_register8(Register8::AH, 0x02);
        cpu.set_register8(Register8::DL, 1);
        disks.int13(&mut cpu, &mut bus);
        assert!(cpu.get_flag(Flag::Carry));

        // AH=01 reports it back and a success on drive 0 is independent
        cpu.set_register8(Register8::AH, 0x01);
        disks.int13(&mut cpu, &mut bus);
        assert!(cpu.get_flag(Flag::Carry));
        assert_eq!(cpu.get_register8(Register8::AH), STATUS_BAD_COMMAND);

        cpu.set_register8(Register8::AH, 0x00);
        cpu.set_register8(Register8::DL, 0);
        disks.int13(&mut cpu, &mut bus);
        cpu.set_register8(Register8::AH, 0x01);
        disks.int13(&mut cpu, &mut bus);
        assert!(!cpu.get_flag(Flag::Carry));
    }

    #[test]
    fn fixed_disk_mirrors_status_to_bios_data_area() {
        let mut disks = DiskService::new();
        disks
            .insert_backing(0x80, Box::new(RamDisk::new(63 * 16 * 512 * 4)))
            .unwrap();
        let mut bus = test_bus();
        let mut cpu = Cpu::new();

        cpu.set_register8(Register8::AH, 0x00);
        cpu.set_register8(Register8::DL, 0x80);
        disks.int13(&mut cpu, &mut bus);
        assert_eq!(bus.read_u8(BDA_DISK_STATUS), 0x00);

        // An unknown function leaves CF set and mirrors AH
        cpu.set_register8(Register8::AH, 0x42);
        disks.int13(&mut cpu, &mut bus);
        assert!(cpu.get_flag(Flag::Carry));
        assert_eq!(bus.read_u8(BDA_DISK_STATUS), 0x42);
    }

    #[test]
    fn drive_parameters_for_floppy_and_fixed_disk() {
        let mut disks = service_with_floppy();
        disks
            .insert_backing(0x80, Box::new(RamDisk::new(63 * 16 * 512 * 40)))
            .unwrap();
        let mut bus = test_bus();
        let mut cpu = Cpu::new();

        cpu.set_register8(Register8::AH, 0x08);
        cpu.set_register8(Register8::DL, 0x00);
        disks.int13(&mut cpu, &mut bus);
        assert_eq!(cpu.get_register8(Register8::CH), 79);
        assert_eq!(cpu.get_register8(Register8::CL), 18);
        assert_eq!(cpu.get_register8(Register8::DH), 1);
        assert_eq!(cpu.get_register8(Register8::DL), 2);
        assert_eq!(cpu.get_register8(Register8::BL), 4);

        cpu.set_register8(Register8::AH, 0x08);
        cpu.set_register8(Register8::DL, 0x80);
        disks.int13(&mut cpu, &mut bus);
        assert_eq!(cpu.get_register8(Register8::CH), 39);
        assert_eq!(cpu.get_register8(Register8::DH), 15);
        assert_eq!(cpu.get_register8(Register8::DL), 1);

        // Empty slot reports no drive
        cpu.set_register8(Register8::AH, 0x08);
        cpu.set_register8(Register8::DL, 0x81);
        disks.int13(&mut cpu, &mut bus);
        assert!(cpu.get_flag(Flag::Carry));
        assert_eq!(cpu.get_register8(Register8::AH), STATUS_NO_DRIVE);
    }

    #[test]
    fn boot_loads_sector_to_7c00() {
        let mut disks = service_with_floppy();
        let mut bus = test_bus();
        let mut cpu = Cpu::new();

        disks.set_boot_drive(0);
        disks.boot(&mut cpu, &mut bus);

        assert_eq!(cpu.get_register16(Register16::CS), 0x0000);
        assert_eq!(cpu.get_register16(Register16::IP), 0x7C00);
        // LBA 0 pattern byte
        assert_eq!(bus.read_u8(0x7C00), 0);
        assert_eq!(cpu.get_register8(Register8::AL), 1);

        disks.set_boot_drive(BOOT_ROM_BASIC);
        disks.boot(&mut cpu, &mut bus);
        assert_eq!(cpu.get_register16(Register16::CS), 0xF600);
        assert_eq!(cpu.get_register16(Register16::IP), 0x0000);
    }
}
