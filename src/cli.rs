use clap::{ArgGroup, Parser};
use std::path::PathBuf;

pub const DEFAULT_ISO_URL: &str = "https://releases.ubuntu.com";

#[derive(Debug, Parser)]
#[command(author, about = "Build custom Ubuntu installer ISOs", long_about = None)]
#[command(name = "autoiso", disable_version_flag = true)]
#[command(group(ArgGroup::new("source").required(true).args(["source_iso", "version"])))]
pub struct Cli {
    /// Path to a locally sourced ISO file to modify. Mutually exclusive with ISO download options.
    #[arg(short, long)]
    pub source_iso: Option<PathBuf>,

    /// The Ubuntu version to download (e.g. 22.04.3)
    #[arg(short, long)]
    pub version: Option<String>,

    /// The installer type to use (e.g. live-server OR desktop)
    #[arg(short = 't', long = "type", default_value = "live-server", help_heading = "Download Arguments")]
    pub installer_type: String,

    /// The installer architecture to use (e.g. amd64)
    #[arg(long = "arch", default_value = "amd64", help_heading = "Download Arguments")]
    pub installer_arch: String,

    /// The URL where Ubuntu ISOs are located
    #[arg(long, alias = "iso_url", default_value = DEFAULT_ISO_URL, help_heading = "Download Arguments")]
    pub iso_url: String,

    /// Import a directory to your custom ISO (e.g. ./custom)
    #[arg(short, long)]
    pub import_dir: Option<PathBuf>,

    /// Location of the grub.cfg file to import into the ISO
    #[arg(short, long = "grub-menu")]
    pub grub_file: Option<PathBuf>,

    /// The output filename/path of the generated ISO
    #[arg(short, long, default_value = "autoinstall.iso")]
    pub out_file: PathBuf,

    /// xorriso executable used to write the image
    #[arg(long, env = "AUTOISO_XORRISO", default_value = "xorriso")]
    pub xorriso: PathBuf,

    /// Print the planned image changes as JSON instead of writing the image
    #[arg(long)]
    pub dry_run: bool,

    /// Enable debug logging
    #[arg(long)]
    pub verbose: bool,
}
