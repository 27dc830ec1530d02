//! Command-line host for the unstunts decoder library: loads a
//! compressed resource file, runs the decoder pipeline, writes the
//! decoded bytes, and renders decoder events as text.

use std::io::Write;
use std::path::PathBuf;
use std::{fs, io, process};

use anyhow::{bail, Context as _, Result};
use log::info;
use structopt::StructOpt;
use unstunts::{Context, Event, Format, StuntsVersion};

#[derive(Debug, StructOpt)]
#[structopt(name = "unstunts", about = "Stunts/4-D Sports Driving game resource unpacker")]
struct Opt {
    /// Compression format: auto, stunts, eac or rpck
    #[structopt(short = "f", long = "format", default_value = "auto")]
    format: Format,

    /// Stunts bit-stream dialect: auto, stunts1.0 or stunts1.1
    /// (requires -f stunts)
    #[structopt(short = "s", long = "stunts-version")]
    stunts_version: Option<StuntsVersion>,

    /// Limit decoding to NUM passes (requires -f stunts)
    #[structopt(short = "p", long = "passes")]
    passes: Option<u8>,

    /// Increase verbosity; repeat for more detail
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: u8,

    /// Suppress all output
    #[structopt(short = "q", long = "quiet")]
    quiet: bool,

    /// Compressed source file
    #[structopt(parse(from_os_str))]
    source: PathBuf,

    /// Destination file (default: SOURCE.out)
    #[structopt(parse(from_os_str))]
    destination: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let mut format = opt.format;
    if let Some(version) = opt.stunts_version {
        match &mut format {
            Format::Stunts { version: slot, .. } => *slot = version,
            _ => bail!("-s requires -f stunts, got -f {}", format),
        }
    }
    if let Some(passes) = opt.passes {
        match &mut format {
            Format::Stunts { max_passes, .. } => *max_passes = passes,
            _ => bail!("-p requires -f stunts, got -f {}", format),
        }
    }

    let verbosity = if opt.quiet { 0 } else { 1 + opt.verbose };
    let destination = opt
        .destination
        .unwrap_or_else(|| append_extension(&opt.source));

    info!("reading {}", opt.source.display());
    let packed = fs::read(&opt.source)
        .with_context(|| format!("reading source file {}", opt.source.display()))?;

    let mut ctx = Context::new(format, verbosity, Some(Box::new(render_event)));
    ctx.set_source(packed);

    if let Err(err) = ctx.decompress() {
        if !opt.quiet {
            eprintln!("Error: {}", err);
        }
        process::exit(1);
    }
    if (1..=2).contains(&verbosity) {
        // Terminate the progress ticker line.
        println!();
    }

    info!("writing {}", destination.display());
    fs::write(&destination, ctx.output())
        .with_context(|| format!("writing destination file {}", destination.display()))?;

    Ok(())
}

/// Render one decoder event to the terminal. Fatal errors are ignored
/// here; the final error from the decoder is reported once at exit.
fn render_event(event: Event) {
    match event {
        Event::Info(message) => println!("{}", message),
        Event::Warn(message) => eprintln!("Warning: {}", message),
        Event::Error(_) => {}
        Event::Progress { percent } => {
            print!(" {}%", percent);
            let _ = io::stdout().flush();
        }
    }
}

fn append_extension(source: &PathBuf) -> PathBuf {
    let mut name = source.as_os_str().to_owned();
    name.push(".out");
    PathBuf::from(name)
}
