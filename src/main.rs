// SPDX-License-Identifier: MIT

use std::any::Any;
use std::fs::File;
use std::io::BufWriter;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

use clap::{ArgAction, Args, Parser, Subcommand};
use log::{error, info, warn, LevelFilter};

use mci_write::{cancel, parse_address, Bar, Card, ChunkedWriter, Device, Error, ReadConfig, WriteConfig};

/// Write data into a memory card through its MCI adapter.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Hide progress bars
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report the size of the memory card
    Detect {
        /// Card block device or image file
        #[arg(short, long)]
        device: PathBuf,
    },
    /// Write a file into the memory card
    Write(WriteArgs),
    /// Read a range of the memory card into a file
    Read(ReadArgs),
}

#[derive(Args, Debug)]
struct WriteArgs {
    /// Card block device or image file
    #[arg(short, long)]
    device: PathBuf,

    /// The file containing the data to write on the memory card
    #[arg(short = 'f', long)]
    data_file: PathBuf,

    /// Address to start writing at
    #[arg(short, long, default_value = "0", value_parser = parse_address)]
    start_address: u64,

    /// Keep existing data if there is not enough data to fill a block,
    /// otherwise erase the rest of the block with 0x00
    #[arg(short, long, default_value_t = true, action = ArgAction::Set)]
    keep_existing: bool,

    /// Read the data back and compare after writing
    #[arg(long)]
    verify: bool,

    /// Bytes per transmit
    #[arg(long, default_value = "4096")]
    chunk_size: NonZeroUsize,
}

#[derive(Args, Debug)]
struct ReadArgs {
    /// Card block device or image file
    #[arg(short, long)]
    device: PathBuf,

    /// File to store the data in
    #[arg(short, long)]
    output: PathBuf,

    /// Address to start reading from
    #[arg(short, long, default_value = "0", value_parser = parse_address)]
    start_address: u64,

    /// Bytes to read, up to the end of the card if omitted
    #[arg(long, value_parser = parse_address)]
    size: Option<u64>,
}

fn progress(desc: &'static str, total: u64, quiet: bool) -> Bar {
    if quiet {
        Bar::hidden(desc, total)
    } else {
        Bar::new(desc, total)
    }
}

fn cancel_flag() -> Option<&'static AtomicBool> {
    match cancel::install() {
        Ok(flag) => Some(flag),
        Err(err) => {
            warn!("Ctrl-C will not stop the transfer cleanly: {}", err);
            None
        }
    }
}

fn detect(device: PathBuf) -> Result<(), Error> {
    let mut card = Card::open_read_only(&device).map_err(Error::Probe)?;
    let info = card.probe().map_err(Error::Probe)?;
    info!("{}: {:?}", device.display(), info.flags);
    println!("Memory card size: {} KiB ({} bytes)", info.capacity_kib, info.capacity_kib * 1024);
    Ok(())
}

fn write(args: WriteArgs, quiet: bool) -> Result<(), Error> {
    let config = WriteConfig::new(args.data_file, args.start_address, args.keep_existing)?
        .chunk_size(args.chunk_size)
        .verify(args.verify);

    let mut card = Card::open(&args.device).map_err(Error::Probe)?;
    let mut source = config.open()?;

    let mut writer = ChunkedWriter::new(&mut card).chunk_size(config.chunk_size);
    if let Some(flag) = cancel_flag() {
        writer = writer.cancel_on(flag);
    }

    let request = writer.prepare(&source, config.start_address, config.keep_existing)?;

    info!("Writing file's content into the memory card...");
    let mut bar = progress("Writing", request.source_length(), quiet);
    let summary = writer.write(&mut source, &request, &mut bar)?;
    info!(
        "wrote {} bytes in {} chunks, {:#x}..{:#x}",
        summary.bytes,
        summary.chunks,
        request.start_address(),
        summary.end_address
    );

    if config.verify {
        let mut bar = progress("Verifying", request.source_length(), quiet);
        writer.verify(&mut source, &request, &mut bar)?;
        info!("verification passed");
    }

    Ok(())
}

fn read(args: ReadArgs, quiet: bool) -> Result<(), Error> {
    let config = ReadConfig {
        start_address: args.start_address,
        size: args.size,
        output: args.output,
    };

    let mut card = Card::open_read_only(&args.device).map_err(Error::Probe)?;

    let mut writer = ChunkedWriter::new(&mut card);
    if let Some(flag) = cancel_flag() {
        writer = writer.cancel_on(flag);
    }

    info!("Reading the memory card into {}...", config.output.display());
    let mut bar = progress("Reading", config.size.unwrap_or(0), quiet);
    let open = || File::create(&config.output).map(BufWriter::new);
    let summary = writer.dump(open, config.start_address, config.size, &mut bar)?;
    info!("read {} bytes", summary.bytes);
    Ok(())
}

fn run(cli: Cli) -> Result<(), Error> {
    match cli.command {
        Command::Detect { device } => detect(device),
        Command::Write(args) => write(args, cli.quiet),
        Command::Read(args) => read(args, cli.quiet),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let result = panic::catch_unwind(AssertUnwindSafe(|| run(cli)))
        .unwrap_or_else(|payload| Err(Error::Internal(panic_message(payload))));

    let err = match result {
        Ok(()) => return ExitCode::SUCCESS,
        Err(err) => err,
    };

    error!("{}: {}", err.kind(), err);
    match &err {
        Error::Transfer { address, .. } | Error::Cancelled { address } => {
            warn!("the card holds a partial write ending before {:#x}", address)
        }
        Error::Range { .. } | Error::Probe(_) => info!("nothing was written"),
        Error::Io(_) | Error::Verify { .. } | Error::Internal(_) => (),
    }
    ExitCode::from(err.exit_code())
}
