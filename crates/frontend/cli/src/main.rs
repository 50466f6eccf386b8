use anyhow::{bail, Context, Result};
use apu_core::logging::{LogConfig, LogLevel};
use apu_core::{Apu, ApuConfig, BufferedSink, ChipMask, RegisterTrace, SampleBank};
use clap::Parser;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

mod script;

#[derive(Parser)]
#[command(about = "Render NES APU register scripts to raw PCM")]
struct Args {
    /// JSON register script
    script: PathBuf,

    /// Output file, raw signed 16-bit little-endian PCM
    #[arg(short, long, default_value = "out.pcm")]
    output: PathBuf,

    /// Session configuration (JSON); missing fields use defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// DPCM sample data mapped at $C000
    #[arg(long)]
    samples: Option<PathBuf>,

    /// Expansion chip mask, overriding the config (1=VRC6 2=VRC7 4=FDS
    /// 8=MMC5 16=N163 32=S5B)
    #[arg(long)]
    chips: Option<u8>,

    /// Silent frames rendered after the script ends
    #[arg(long, default_value_t = 0)]
    tail_frames: u32,

    /// Core log level: off, error, warn, info, debug, trace
    #[arg(long, default_value = "off")]
    log_level: String,

    /// Write core logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Trace the internal registers after every frame (needs trace level)
    #[arg(long, default_value_t = false)]
    trace_registers: bool,

    /// Print the final debug_state as JSON
    #[arg(long, default_value_t = false)]
    debug: bool,
}

fn configure_logging(args: &Args) -> Result<()> {
    let Some(level) = LogLevel::from_str(&args.log_level) else {
        bail!("Unknown log level: {}", args.log_level);
    };
    let config = LogConfig::global();
    config.set_global_level(level);
    if let Some(path) = &args.log_file {
        config
            .set_log_file(path.clone())
            .with_context(|| format!("opening log file {}", path.display()))?;
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<ApuConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            ApuConfig::from_json(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => ApuConfig::default(),
    };
    if let Some(mask) = args.chips {
        config.expansion = ChipMask::from_bits(mask);
    }
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    configure_logging(&args)?;

    let config = load_config(&args)?;
    let text = fs::read_to_string(&args.script)
        .with_context(|| format!("reading script {}", args.script.display()))?;
    let events = script::parse(&text)
        .with_context(|| format!("parsing script {}", args.script.display()))?;

    let bank = match &args.samples {
        Some(path) => SampleBank::new(
            fs::read(path).with_context(|| format!("reading samples {}", path.display()))?,
        ),
        None => SampleBank::default(),
    };

    let sink = BufferedSink::new();
    let mut apu = Apu::with_config(&config, Box::new(sink.clone()), Box::new(bank))?;
    if args.trace_registers {
        apu.set_observer(Some(Box::new(RegisterTrace)));
    }
    log::info!(
        "{} events, {} Hz x{}, {:?}, chips {:?}",
        events.len(),
        config.sample_rate,
        config.channels,
        config.machine,
        apu.active_chips()
    );

    script::run(&mut apu, &events);
    script::add_frames(&mut apu, args.tail_frames);

    let samples = sink.take();
    let mut out = BufWriter::new(
        File::create(&args.output)
            .with_context(|| format!("creating {}", args.output.display()))?,
    );
    for sample in &samples {
        out.write_all(&sample.to_le_bytes())?;
    }
    out.flush()?;

    log::info!(
        "wrote {} samples ({} frames) to {}",
        samples.len(),
        sink.frames(),
        args.output.display()
    );
    if args.debug {
        println!("{}", serde_json::to_string_pretty(&apu.debug_state())?);
    }
    Ok(())
}
