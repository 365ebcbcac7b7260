//! Convert PNG files to JPEG from the command line.
//!
//! ```text
//! cargo run --example batch_convert -- [--optimized | --quality MODE] [--out DIR] a.png b.png ...
//! ```
//!
//! Set `RUST_LOG=batch_convert=debug` to watch dispatches and completions.

use batch_convert::{
    Candidate, Converter, EngineConfig, EngineEvent, ItemStatus, QualityMode,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "batch_convert")]
#[command(about = "Convert PNG files to JPEG")]
struct Args {
    /// Shorthand for `--quality optimized`
    #[arg(long, conflicts_with = "quality")]
    optimized: bool,

    /// Quality mode: best (92) or optimized (75)
    #[arg(long)]
    quality: Option<QualityMode>,

    /// Directory the JPEG files are written to
    #[arg(long, default_value = ".")]
    out: PathBuf,

    /// PNG files to convert
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

impl Args {
    fn mode(&self) -> QualityMode {
        match (self.quality, self.optimized) {
            (Some(mode), _) => mode,
            (None, true) => QualityMode::Optimized,
            (None, false) => QualityMode::Best,
        }
    }
}

fn main() -> batch_convert::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "batch_convert=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (tx, rx) = mpsc::channel();
    let config = EngineConfig::from_env().with_quality_mode(args.mode());
    let converter = Converter::with_sink(config, Arc::new(tx))?;

    let printer = thread::spawn(move || {
        for event in rx {
            match event {
                EngineEvent::StatusChanged {
                    name,
                    status: status @ (ItemStatus::Completed | ItemStatus::Failed),
                    ..
                } => println!("{name}: {}", status.as_str()),
                EngineEvent::Progress(p) if p.total > 0 => {
                    println!("  {}% ({} of {})", p.percent, p.processed(), p.total)
                }
                EngineEvent::BatchFinished { cancelled: true, .. } => println!("stopped"),
                _ => {}
            }
        }
    });

    let candidates = args
        .inputs
        .iter()
        .map(|path| Candidate::from_path(path))
        .collect::<batch_convert::Result<Vec<_>>>()?;
    let report = converter.submit_all(candidates);
    for rejection in &report.rejected {
        eprintln!("skipped {}", rejection.error);
    }

    if converter.is_empty() {
        eprintln!("nothing to convert");
        return Ok(());
    }

    let batch = converter.convert_all()?;
    let written = converter.export_all(&args.out)?;
    println!(
        "{} converted, {} failed, {} written to {}",
        batch.succeeded,
        batch.failed,
        written.len(),
        args.out.display()
    );

    drop(converter);
    let _ = printer.join();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("batch_convert").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_to_best_quality_in_current_dir() {
        let args = parse(&["a.png", "b.png"]).unwrap();
        assert_eq!(args.mode(), QualityMode::Best);
        assert_eq!(args.out, PathBuf::from("."));
        assert_eq!(args.inputs.len(), 2);
    }

    #[test]
    fn quality_flags_select_mode() {
        assert_eq!(parse(&["--optimized", "a.png"]).unwrap().mode(), QualityMode::Optimized);
        assert_eq!(
            parse(&["--quality", "optimized", "a.png"]).unwrap().mode(),
            QualityMode::Optimized
        );
        assert!(parse(&["--quality", "ultra", "a.png"]).is_err());
        let err = parse(&["--optimized", "--quality", "best", "a.png"]).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn malformed_command_lines_are_usage_errors() {
        // a trailing flag without its value no longer falls back to "."
        assert!(parse(&["a.png", "--out"]).is_err());
        let err = parse(&["--optimised", "a.png"]).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
        let err = parse(&[]).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }
}
