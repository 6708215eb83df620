//! imagecfg CLI entry point.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;

use imagecfg::RootfsValues;

/// Render a rootfs-build configuration document from key/value flags.
#[derive(Debug, Parser)]
#[command(name = "imagecfg")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// A package to include, such as `cpio` (repeatable)
    #[arg(long = "package", value_name = "NAME")]
    packages: Vec<String>,

    /// An arch to include, such as `amd64` (repeatable)
    #[arg(long = "arch", value_name = "NAME")]
    archs: Vec<String>,

    /// Map from URL to comma-separated channels, such as
    /// `--source=https://snapshot.ubuntu.com/=noble,main,universe` (repeatable)
    #[arg(long = "source", value_name = "URL=CHANNELS")]
    sources: Vec<String>,

    /// File to write the rendered configuration to
    #[arg(long, value_name = "PATH")]
    output: PathBuf,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let values = RootfsValues::from_flags(cli.archs, &cli.sources, cli.packages)?;
    fs::write(&cli.output, values.to_yaml()?)?;
    Ok(())
}
