/*
    config.rs
    TOML configuration file with command-line overlay. The config file
    selects the machine (adapter family, ROM images, disk images, boot
    drive); command-line arguments override individual entries.
*/

use std::path::{Path, PathBuf};
use std::str::FromStr;

use bpaf::Bpaf;
use serde_derive::Deserialize;

#[derive(Copy, Clone, Debug, Deserialize, PartialEq)]
pub enum VideoType {
    MDA,
    CGA,
    EGA,
    VGA,
}

impl FromStr for VideoType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, String>
    where
        Self: Sized,
    {
        match s.to_uppercase().as_str() {
            "MDA" => Ok(VideoType::MDA),
            "CGA" => Ok(VideoType::CGA),
            "EGA" => Ok(VideoType::EGA),
            "VGA" => Ok(VideoType::VGA),
            _ => Err("Bad value for videotype".to_string()),
        }
    }
}

fn _default_batch() -> u32 {
    10000
}

#[derive(Debug, Deserialize)]
pub struct Emulator {
    /// Instructions per emulation batch between presenter yields
    #[serde(default = "_default_batch")]
    pub instructions_per_batch: u32,
}

impl Default for Emulator {
    fn default() -> Self {
        Emulator {
            instructions_per_batch: _default_batch(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MachineSection {
    pub video: VideoType,
    pub bios: PathBuf,
    pub video_rom: Option<PathBuf>,
    pub ide_rom: Option<PathBuf>,
    pub basic_rom: Option<PathBuf>,
    pub fd0: Option<String>,
    pub fd1: Option<String>,
    pub hd0: Option<String>,
    pub hd1: Option<String>,
    /// 0x00-0x7F floppy, 0x80+ fixed disk, 0xFF ROM BASIC
    pub boot_drive: Option<u8>,
}

#[derive(Debug, Deserialize)]
pub struct ConfigFileParams {
    #[serde(default)]
    pub emulator: Emulator,
    pub machine: MachineSection,
}

#[derive(Debug, Bpaf)]
#[bpaf(options, version, generate(cli_args))]
pub struct CmdLineArgs {
    #[bpaf(long)]
    pub configfile: Option<PathBuf>,

    #[bpaf(long)]
    pub bios: Option<PathBuf>,

    #[bpaf(long)]
    pub video: Option<VideoType>,

    #[bpaf(long)]
    pub fd0: Option<String>,

    #[bpaf(long)]
    pub fd1: Option<String>,

    #[bpaf(long)]
    pub hd0: Option<String>,

    #[bpaf(long)]
    pub hd1: Option<String>,

    #[bpaf(long)]
    pub boot: Option<u8>,
}

impl ConfigFileParams {
    pub fn overlay(&mut self, shell_args: CmdLineArgs) {
        if let Some(bios) = shell_args.bios {
            self.machine.bios = bios;
        }
        if let Some(video) = shell_args.video {
            self.machine.video = video;
        }
        if let Some(fd0) = shell_args.fd0 {
            self.machine.fd0 = Some(fd0);
        }
        if let Some(fd1) = shell_args.fd1 {
            self.machine.fd1 = Some(fd1);
        }
        if let Some(hd0) = shell_args.hd0 {
            self.machine.hd0 = Some(hd0);
        }
        if let Some(hd1) = shell_args.hd1 {
            self.machine.hd1 = Some(hd1);
        }
        if let Some(boot) = shell_args.boot {
            self.machine.boot_drive = Some(boot);
        }
    }
}

pub fn get_config<P>(default_path: P) -> Result<ConfigFileParams, anyhow::Error>
where
    P: AsRef<Path>,
{
    let shell_args: CmdLineArgs = cli_args().run();
    let mut toml_args: ConfigFileParams;

    // The config file path itself can come from the command line
    if let Some(configfile_path) = shell_args.configfile.as_ref() {
        let toml_slice = std::fs::read(configfile_path)?;
        toml_args = toml::from_slice(&toml_slice)?;
    }
    else {
        let toml_slice = std::fs::read(default_path)?;
        toml_args = toml::from_slice(&toml_slice)?;
    }

    log::debug!("toml_config: {:?}", toml_args);

    toml_args.overlay(shell_args);

    Ok(toml_args)
}
