/*
    video/crtc.rs
    The 6845-derived CRTC register file, shared by every adapter family.

    One address latch selects among 32 data registers; the address and data
    registers appear on alternating even/odd ports in both the MDA (3B0-3B7)
    and CGA (3D0-3D7) ranges.

    Registers of interest:
      0  horz. total            9  max raster address
      1  horz. displayed       12  display start address hi
      2  horz. sync pos        13  display start address lo
      4  vert. total           14  cursor address hi
      6  vert. displayed       15  cursor address lo
*/

use crate::video::VideoCard;

pub const CRTC_REGISTER_COUNT: usize = 32;

const CRTC_START_ADDRESS_HI: usize = 12;
const CRTC_START_ADDRESS_LO: usize = 13;
const CRTC_CURSOR_ADDRESS_HI: usize = 14;
const CRTC_CURSOR_ADDRESS_LO: usize = 15;

impl VideoCard {
    pub(super) fn crtc_address_write(&mut self, byte: u8) {
        self.crtc_address = byte & 0x1F;
    }

    pub(super) fn crtc_register_write(&mut self, byte: u8) {
        self.crtc[self.crtc_address as usize] = byte;
    }

    pub(super) fn crtc_register_read(&self) -> u8 {
        self.crtc[self.crtc_address as usize]
    }

    pub fn crtc_register(&self, index: usize) -> u8 {
        self.crtc[index & (CRTC_REGISTER_COUNT - 1)]
    }

    /// The display start offset programmed by the BIOS for page flipping.
    pub fn crtc_start_address(&self) -> u16 {
        let hi = self.crtc[CRTC_START_ADDRESS_HI] as u16;
        let lo = self.crtc[CRTC_START_ADDRESS_LO] as u16;
        0x3FFF & (hi << 8 | lo)
    }

    /// The character cell the text cursor occupies.
    pub fn crtc_cursor_address(&self) -> u16 {
        let hi = self.crtc[CRTC_CURSOR_ADDRESS_HI] as u16;
        let lo = self.crtc[CRTC_CURSOR_ADDRESS_LO] as u16;
        0x3FFF & (hi << 8 | lo)
    }
}

#[cfg(test)]
mod tests {
    use crate::bus::IoDevice;
    use crate::config::VideoType;
    use crate::video::VideoCard;

    #[test]
    fn index_then_data_stores_at_index() {
        let mut video = VideoCard::new(VideoType::CGA);

        video.write_u8(0x3D4, 0x0A);
        video.write_u8(0x3D5, 0x2F);
        assert_eq!(video.crtc_register(0x0A), 0x2F);
        assert_eq!(video.read_u8(0x3D5), 0x2F);

        // The same file is visible through the MDA range
        video.write_u8(0x3B4, 0x0A);
        assert_eq!(video.read_u8(0x3B5), 0x2F);
    }

    #[test]
    fn address_latch_masks_to_register_file() {
        let mut video = VideoCard::new(VideoType::MDA);

        video.write_u8(0x3B4, 0x2E); // 0x2E & 0x1F = 0x0E
        video.write_u8(0x3B5, 0x01);
        video.write_u8(0x3B4, 0x0F);
        video.write_u8(0x3B5, 0x80);

        assert_eq!(video.crtc_cursor_address(), 0x0180);
    }

    #[test]
    fn start_address_is_fourteen_bits() {
        let mut video = VideoCard::new(VideoType::CGA);

        video.write_u8(0x3D4, 12);
        video.write_u8(0x3D5, 0xFF);
        video.write_u8(0x3D4, 13);
        video.write_u8(0x3D5, 0xFF);

        assert_eq!(video.crtc_start_address(), 0x3FFF);
    }
}
