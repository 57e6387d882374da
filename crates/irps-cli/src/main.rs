//! `irpsfw` — command-line interface for IRPS5401 firmware updates.
//!
//! ```text
//! USAGE:
//!   irpsfw board                     List board instances
//!   irpsfw version <instance>        Running firmware version
//!   irpsfw inspect <file>            Validate and describe an image file
//!   irpsfw update <instance> [...]   Program staged firmware into OTP
//!   irpsfw progress <instance>       Poll the running update
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use irps_chip::{board_instances, OtpSection, SectionMask};
use irps_image::{crc32, load_public_key, FirmwareImage, ImageHeader};
use irps_updater::{UpdateRequest, Updater, UpdaterConfig};

#[derive(Parser)]
#[command(name = "irpsfw", about = "IRPS5401 OTP firmware update CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List board instances and their bus parameters.
    Board,
    /// Read the running firmware version of one instance.
    Version {
        /// Board instance id.
        instance: u8,
    },
    /// Validate an image file and print its header.
    Inspect {
        /// Path to the container file.
        file: PathBuf,
        /// Verify the signature against this PEM public key.
        #[arg(long)]
        key: Option<PathBuf>,
    },
    /// Program the staged firmware image into OTP.
    Update {
        /// Board instance id.
        instance: u8,
        /// Sections to program: conf, user, or conf,user.
        #[arg(long, default_value = "user")]
        sections: String,
        /// Staged image path override.
        #[arg(long)]
        staging: Option<PathBuf>,
        /// Public key path override.
        #[arg(long)]
        key: Option<PathBuf>,
    },
    /// Snapshot the session of one instance.
    Progress {
        /// Board instance id.
        instance: u8,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Board => cmd_board(),
        Cmd::Version { instance } => cmd_version(instance)?,
        Cmd::Inspect { file, key } => cmd_inspect(&file, key.as_deref())?,
        Cmd::Update {
            instance,
            sections,
            staging,
            key,
        } => cmd_update(instance, &sections, staging, key)?,
        Cmd::Progress { instance } => cmd_progress(instance)?,
    }

    Ok(())
}

fn cmd_board() {
    for info in board_instances() {
        println!(
            "[{}] {}  {} @ {:#04x}  pages {:#04x}..={:#04x}",
            info.instance,
            info.sub_model,
            info.chip.bus_dev,
            info.chip.address,
            info.chip.page_min,
            info.chip.page_max
        );
    }
}

fn cmd_version(instance: u8) -> Result<()> {
    let updater = Updater::open(UpdaterConfig::default())?;
    println!("{}", updater.fw_version(instance)?);
    Ok(())
}

fn cmd_inspect(file: &std::path::Path, key: Option<&std::path::Path>) -> Result<()> {
    let data = std::fs::read(file)?;
    let header = ImageHeader::parse(&data)?;

    println!("File         : {}", file.display());
    println!("Size         : {} bytes", data.len());
    println!("Sub-model    : {}", header.sub_model_str());
    println!("Firmware rev : {}", header.fw_rev_string());
    println!(
        "Payload      : {} bytes at offset {} ({} records)",
        header.img_size,
        header.img_offset,
        header.img_size / 4
    );
    println!(
        "Header CRC   : {:#010x} ({})",
        header.hdr_crc32,
        crc_state(header.hdr_crc32, crc32(&data[..irps_image::header::HDR_CRC_OFFSET]))
    );

    match key {
        Some(path) => {
            let public = load_public_key(path)?;
            let image = FirmwareImage::load(file, &public)?;
            let conf = irps_image::count_section_records(image.records(), OtpSection::Conf);
            let user = irps_image::count_section_records(image.records(), OtpSection::User);
            println!("Signature    : valid");
            println!("Records      : {conf} conf, {user} user");
        }
        None => println!("Signature    : not checked (pass --key)"),
    }
    Ok(())
}

fn crc_state(stored: u32, computed: u32) -> &'static str {
    if stored == computed { "ok" } else { "MISMATCH" }
}

fn cmd_update(
    instance: u8,
    sections: &str,
    staging: Option<PathBuf>,
    key: Option<PathBuf>,
) -> Result<()> {
    let mask = parse_sections(sections)?;

    let mut config = UpdaterConfig::default();
    if let Some(path) = staging {
        config.staging_path = path;
    }
    if let Some(path) = key {
        config.public_key_path = path;
    }

    let updater = Updater::open(config)?;
    println!("Updating instance {instance}, sections: {sections} ...");
    let code = updater.run_request(UpdateRequest { instance, mask });

    if code.is_success() {
        println!("Update complete and verified.");
        Ok(())
    } else {
        anyhow::bail!("update failed: {:?} ({:#04x})", code, code.as_u8())
    }
}

fn parse_sections(spec: &str) -> Result<SectionMask> {
    let mut mask = SectionMask::default();
    for part in spec.split(',') {
        mask = match part.trim() {
            "conf" => mask.union(SectionMask::CONF),
            "user" => mask.union(SectionMask::USER),
            other => anyhow::bail!("unknown section {other:?} (expected conf or user)"),
        };
    }
    Ok(mask)
}

fn cmd_progress(instance: u8) -> Result<()> {
    let updater = Updater::open(UpdaterConfig::default())?;
    let report = updater.progress(instance)?;
    println!(
        "stage={:?} status={:?} progress={}% error={:#04x}",
        report.stage, report.status, report.progress, report.error_code
    );
    Ok(())
}
