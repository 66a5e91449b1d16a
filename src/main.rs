#![deny(clippy::all)]
#![forbid(unsafe_code)]

/*
    main.rs
    Headless front-end: load the configuration, assemble the machine, and
    drive the emulation loop. Presentation is left to embedding hosts; this
    binary exists to boot images and exercise the core.
*/

use anyhow::Context;

use relic86::disk::BOOT_ROM_BASIC;
use relic86::machine::Machine;
use relic86::rom;

const DEFAULT_CONFIG_PATH: &str = "./relic86.toml";

fn main() -> Result<(), anyhow::Error> {
    env_logger::init();

    let config = relic86::config::get_config(DEFAULT_CONFIG_PATH)
        .context("reading configuration")?;

    let mut machine = Machine::new(config.machine.video);

    let bios_path = config.machine.bios.to_string_lossy().to_string();
    let bios_size = machine
        .load_bios(&bios_path)
        .with_context(|| format!("loading BIOS image {}", bios_path))?;

    // Small BIOSes need the companion ROMs the full set provides
    if bios_size <= rom::SMALL_BIOS_SIZE {
        if let Some(path) = &config.machine.basic_rom {
            let path = path.to_string_lossy();
            if let Err(e) = machine.load_rom(&path, rom::BASIC_ROM_ADDRESS) {
                log::warn!("ROM BASIC not loaded: {}", e);
            }
        }
        if let Some(path) = &config.machine.video_rom {
            let path = path.to_string_lossy().to_string();
            machine
                .load_rom(&path, rom::VIDEO_ROM_ADDRESS)
                .with_context(|| format!("loading video ROM {}", path))?;
        }
    }
    if let Some(path) = &config.machine.ide_rom {
        let path = path.to_string_lossy().to_string();
        machine
            .load_rom(&path, rom::IDE_ROM_ADDRESS)
            .with_context(|| format!("loading IDE option ROM {}", path))?;
    }

    for (drive, image) in [
        (0x00u8, &config.machine.fd0),
        (0x01, &config.machine.fd1),
        (0x80, &config.machine.hd0),
        (0x81, &config.machine.hd1),
    ] {
        if let Some(path) = image {
            machine
                .insert_disk(drive, path)
                .with_context(|| format!("inserting disk image {}", path))?;
        }
    }

    machine.set_boot_drive(config.machine.boot_drive.unwrap_or(BOOT_ROM_BASIC));

    let batch = config.emulator.instructions_per_batch;
    let mut total: u64 = 0;
    while machine.running() {
        total += machine.run(batch);
    }

    if let Some(error) = machine.get_error_str() {
        log::error!("machine stopped: {}", error);
    }
    println!("{} instructions executed.", total);

    Ok(())
}
