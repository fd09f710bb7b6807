use std::io::IsTerminal as _;

use rama::{
    error::{BoxError, ErrorContext as _},
    telemetry::tracing::{
        self,
        metadata::LevelFilter,
        subscriber::{EnvFilter, fmt::writer::BoxMakeWriter},
    },
};

use crate::Args;

/// Crates whose logs are shown at the chosen verbosity,
/// everything else (http stack, runtime) is kept at warn.
const BENCH_CRATES: [&str; 2] = [env!("CARGO_CRATE_NAME"), "ai_throughput_lib"];

/// Sets up logging for a benchmark run.
///
/// `RUST_LOG` replaces the default directives when set. Logs go to stderr
/// (or the `--output` file) so reports written to stdout stay machine readable.
pub fn init_tracing(args: &Args) -> Result<(), BoxError> {
    let make_writer = match args.output.as_deref() {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .context("open log file")?;

            BoxMakeWriter::new(file)
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let subscriber = tracing::subscriber::fmt()
        .with_ansi(args.output.is_none() && std::io::stderr().is_terminal())
        .with_target(args.verbose)
        .with_env_filter(env_filter(args.verbose))
        .with_writer(make_writer);

    if args.pretty {
        subscriber.pretty().try_init()?;
    } else {
        subscriber.try_init()?;
    }

    tracing::debug!("tracing is set up, log file: {:?}", args.output);
    Ok(())
}

fn env_filter(verbose: bool) -> EnvFilter {
    let builder = EnvFilter::builder().with_default_directive(LevelFilter::WARN.into());
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => builder.parse_lossy(directives),
        _ => builder.parse_lossy(default_directives(verbose)),
    }
}

fn default_directives(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    BENCH_CRATES
        .iter()
        .map(|krate| format!("{krate}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_scope_bench_crates() {
        for (verbose, expected) in [
            (false, "aibench=info,ai_throughput_lib=info"),
            (true, "aibench=debug,ai_throughput_lib=debug"),
        ] {
            assert_eq!(default_directives(verbose), expected);
        }
    }

    #[test]
    fn test_default_directives_parse() {
        for verbose in [false, true] {
            let filter = EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .parse(default_directives(verbose));
            assert!(filter.is_ok(), "verbose: {verbose}");
        }
    }
}
