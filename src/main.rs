//! gxcodec CLI
//!
//! Command-line interface for inspecting, validating and converting G3D and
//! J3D model containers.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info, warn};

use gxcodec_core::Error as CoreError;
use gxcodec_parsers::logging::{init_with_config, TracingConfig};
use gxcodec_parsers::{
    codec_for_extension, detect_codec, Endian, HumanReadable, Model, ModelCodec, NumericFamily,
    QuantizationProfile, ReadOptions, Severity, Transaction, TransactionState, WriteOptions,
};

/// gxcodec - GameCube/Wii model container tool
#[derive(Parser)]
#[command(name = "gxcodec")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format for structured data
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "yaml" => Ok(OutputFormat::Yaml),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show the contents of a model container
    Info(InfoArgs),

    /// Read containers and report diagnostics, failing on errors
    Check(CheckArgs),

    /// Convert a container to another format or vertex profile
    Convert(ConvertArgs),

    /// Write a container twice and compare the generations
    Roundtrip(RoundtripArgs),
}

/// Read settings shared by every subcommand that decodes a file
#[derive(Args)]
struct ReadArgs {
    /// Bytes a J3D section may leave unread before a warning
    #[arg(long, default_value = "32")]
    tolerance: u32,

    /// Report validation findings as errors
    #[arg(long)]
    strict: bool,

    /// Keep vertex buffers at their stored length
    #[arg(long)]
    no_trim: bool,
}

impl ReadArgs {
    fn options(&self) -> ReadOptions {
        ReadOptions {
            section_size_tolerance: self.tolerance,
            strict_validation: self.strict,
            trim_vertex_buffers: !self.no_trim,
        }
    }
}

#[derive(Args)]
struct InfoArgs {
    /// Path to a .bmd, .bdl or .brres file
    path: PathBuf,

    /// List every diagnostic, not just the summary
    #[arg(short, long)]
    detailed: bool,

    #[command(flatten)]
    read: ReadArgs,
}

#[derive(Args)]
struct CheckArgs {
    /// Files to check
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    #[command(flatten)]
    read: ReadArgs,
}

#[derive(Args)]
struct ConvertArgs {
    /// Input container
    input: PathBuf,

    /// Output path; its extension picks the format unless --to is given
    #[arg(short, long)]
    output: PathBuf,

    /// Output format: bmd, bdl or brres
    #[arg(long)]
    to: Option<String>,

    /// Store generic vertex data as fixed point
    #[arg(long, conflicts_with = "float")]
    fixed: bool,

    /// Store generic vertex data as 32-bit floats
    #[arg(long)]
    float: bool,

    /// Write little-endian instead of the console's big-endian layout
    #[arg(long)]
    little_endian: bool,

    /// Write even when model validation reports errors
    #[arg(long)]
    force: bool,

    #[command(flatten)]
    read: ReadArgs,
}

#[derive(Args)]
struct RoundtripArgs {
    /// Container to round-trip
    path: PathBuf,

    #[command(flatten)]
    read: ReadArgs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_with_config(TracingConfig::from_verbosity(cli.verbose));

    match cli.command {
        Commands::Info(args) => cmd_info(args, cli.format),
        Commands::Check(args) => cmd_check(args, cli.format),
        Commands::Convert(args) => cmd_convert(args),
        Commands::Roundtrip(args) => cmd_roundtrip(args, cli.format),
    }
}

/// A decoded file together with the codec that read it
struct Loaded {
    codec: Box<dyn ModelCodec>,
    model: Model,
    tx: Transaction,
}

fn load(path: &Path, options: &ReadOptions) -> Result<Loaded> {
    if !path.exists() {
        return Err(CoreError::FileNotFound(path.to_path_buf()).into());
    }
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let codec = detect_codec(&bytes).ok_or_else(|| CoreError::UnrecognisedContainer {
        path: path.to_path_buf(),
        magic: bytes.iter().take(8).copied().collect(),
    })?;
    debug!(codec = codec.name(), bytes = bytes.len(), "Detected container");

    let mut tx = Transaction::new(path.display().to_string());
    let model = codec
        .read_with_options(&bytes, options, &mut tx)
        .map_err(|e| CoreError::codec(e.to_string()).with_context(path.display().to_string()))?;

    Ok(Loaded { codec, model, tx })
}

fn failure(tx: &Transaction) -> CoreError {
    CoreError::TransactionFailed {
        path: tx.path().to_string(),
        errors: tx.count(Severity::Error),
    }
}

fn cmd_info(args: InfoArgs, format: OutputFormat) -> Result<()> {
    let loaded = load(&args.path, &args.read.options())?;
    let Loaded { codec, model, tx } = &loaded;

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "path": args.path,
                "codec": codec.name(),
                "codec_version": gxcodec_parsers::VERSION,
                "model": model.to_json(),
                "transaction": tx.to_json(),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Yaml => {
            print!("{}", model.to_yaml());
            if args.detailed {
                print!("{}", tx.to_yaml());
            }
        }
        OutputFormat::Text => {
            println!("{} ({})", args.path.display(), codec.name());
            print!("{}", model.to_readable_string());
            if args.detailed {
                println!();
                print!("{}", tx.to_readable_string());
            } else {
                println!(
                    "\n{:?}: {} error(s), {} warning(s)",
                    tx.state(),
                    tx.count(Severity::Error),
                    tx.count(Severity::Warning)
                );
            }
        }
    }

    Ok(())
}

fn cmd_check(args: CheckArgs, format: OutputFormat) -> Result<()> {
    let options = args.read.options();
    let mut reports = Vec::new();
    let mut first_failure = None;

    for path in &args.paths {
        let Loaded { tx, .. } = load(path, &options)?;
        if tx.state() == TransactionState::Failure && first_failure.is_none() {
            first_failure = Some(failure(&tx));
        }
        reports.push(tx);
    }

    match format {
        OutputFormat::Json => {
            let json: Vec<_> = reports.iter().map(HumanReadable::to_json).collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Yaml => {
            for tx in &reports {
                print!("{}", tx.to_yaml());
            }
        }
        OutputFormat::Text => {
            for tx in &reports {
                print!("{}", tx.to_readable_string());
            }
        }
    }

    match first_failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn cmd_convert(args: ConvertArgs) -> Result<()> {
    let target = match &args.to {
        Some(to) => to.clone(),
        None => args
            .output
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| CoreError::invalid_config("output has no extension and --to was not given"))?,
    };
    let writer = codec_for_extension(&target)
        .ok_or_else(|| CoreError::UnsupportedFormat { format: target.clone() })?;

    let loaded = load(&args.input, &args.read.options())?;
    if loaded.tx.state() == TransactionState::Failure {
        warn!(path = %args.input.display(), "Converting a partially read model");
    }

    let current = loaded.model.info.profile;
    let family = if args.fixed {
        NumericFamily::Fixed
    } else if args.float {
        NumericFamily::Float
    } else {
        current.family
    };
    let endian = if args.little_endian { Endian::Little } else { Endian::Big };
    let profile = QuantizationProfile { endian, family };

    let options = WriteOptions {
        profile: (profile != current).then_some(profile),
        validate_before_write: !args.force,
    };
    let bytes = writer
        .write_with_options(&loaded.model, &options)
        .map_err(|e| CoreError::codec(e.to_string()).with_context(args.output.display().to_string()))?;

    fs::write(&args.output, &bytes)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    info!(
        from = loaded.codec.name(),
        to = writer.name(),
        bytes = bytes.len(),
        "Wrote {}",
        args.output.display()
    );
    println!("{} -> {} ({} bytes)", args.input.display(), args.output.display(), bytes.len());

    Ok(())
}

fn cmd_roundtrip(args: RoundtripArgs, format: OutputFormat) -> Result<()> {
    let options = args.read.options();
    let Loaded { codec, model, tx } = load(&args.path, &options)?;
    if tx.state() == TransactionState::Failure {
        return Err(failure(&tx).into());
    }

    let first = codec.write(&model)?;
    let mut second_tx = Transaction::new(format!("{} (generation 2)", args.path.display()));
    let reread = codec.read_with_options(&first, &options, &mut second_tx)?;
    if second_tx.state() == TransactionState::Failure {
        return Err(failure(&second_tx).into());
    }
    let second = codec.write(&reread)?;

    let models_match = reread == model;
    let mismatch = first
        .iter()
        .zip(&second)
        .position(|(a, b)| a != b)
        .or_else(|| (first.len() != second.len()).then(|| first.len().min(second.len())));

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "path": args.path,
                "codec": codec.name(),
                "generation_2_bytes": first.len(),
                "generation_3_bytes": second.len(),
                "first_difference": mismatch,
                "models_match": models_match,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        _ => {
            println!("{} ({})", args.path.display(), codec.name());
            println!("  Generation 2:  {} bytes", first.len());
            println!("  Generation 3:  {} bytes", second.len());
            println!("  Models match:  {}", models_match);
        }
    }

    if let Some(offset) = mismatch {
        return Err(CoreError::RoundTripMismatch {
            message: format!("generations differ at offset 0x{offset:X}"),
        }
        .into());
    }
    if !models_match {
        warn!(path = %args.path.display(), "Re-read model differs from the first read");
    }

    Ok(())
}
