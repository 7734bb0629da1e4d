mod report;

use std::io::stderr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use downlink::module::{process_all, registry, ParamValue, Parameters};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the available decoding modules and the parameters they accept.
    Modules {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: report::Format,
    },
    /// Decode a file of frames into instrument images.
    ///
    /// Images are written to <parent of output>/<INSTRUMENT>/. If output is an existing
    /// directory the instrument directory is created inside it.
    Decode {
        /// Decoding module id, see the modules command.
        module: String,

        /// Input frame file.
        #[arg(short, long, value_name = "path")]
        input: PathBuf,

        /// Output path hint.
        #[arg(short, long, value_name = "path")]
        output: PathBuf,

        /// Module parameter as key=value. A bare key is the same as key=true. May be
        /// given more than once.
        #[arg(short, long = "param", value_parser = parse_param, value_name = "key=value")]
        params: Vec<(String, ParamValue)>,

        /// Output format for the run report.
        #[arg(short, long, default_value = "text")]
        format: report::Format,
    },
    /// Decode several files concurrently.
    ///
    /// Each job is given as <module>:<input>. Images for a job are written to
    /// <output>/<input file stem>/<INSTRUMENT>/. All jobs get the same parameters.
    Batch {
        /// Jobs of the form <module>:<input>.
        #[arg(required = true, value_parser = parse_job, value_name = "module:input")]
        jobs: Vec<(String, PathBuf)>,

        /// Output directory.
        #[arg(short, long, default_value = ".", value_name = "path")]
        output: PathBuf,

        /// Module parameter as key=value. May be given more than once.
        #[arg(short, long = "param", value_parser = parse_param, value_name = "key=value")]
        params: Vec<(String, ParamValue)>,

        /// Number of jobs to run at once. Defaults to the number of CPUs.
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// Output format for the run reports.
        #[arg(short, long, default_value = "text")]
        format: report::Format,
    },
}

fn parse_param(s: &str) -> Result<(String, ParamValue), String> {
    Parameters::parse_assignment(s).map_err(|err| err.to_string())
}

fn parse_job(s: &str) -> Result<(String, PathBuf), String> {
    match s.split_once(':') {
        Some((module, input)) if !module.is_empty() && !input.is_empty() => {
            Ok((module.to_string(), PathBuf::from(input)))
        }
        _ => Err(format!("expected <module>:<input>, got {s:?}")),
    }
}

fn job_hint(output: &Path, input: &Path) -> Result<PathBuf> {
    let Some(stem) = input.file_stem() else {
        bail!("input {input:?} has no file name");
    };
    Ok(output.join(stem).join(stem))
}

fn decode(
    module: &str,
    input: &Path,
    output: &Path,
    params: &Parameters,
    format: &report::Format,
) -> Result<()> {
    let mut module = registry()
        .create(module, input, output, params)
        .with_context(|| format!("creating module {module}"))?;
    let report = module
        .process()
        .with_context(|| format!("decoding {input:?}"))?;
    if !report.is_complete() {
        warn!("run finished with {} output failures", report.failures.len());
    }
    report::reports(&[report], format)
}

fn batch(
    jobs: &[(String, PathBuf)],
    output: &Path,
    params: &Parameters,
    threads: Option<usize>,
    format: &report::Format,
) -> Result<()> {
    let mut modules = Vec::with_capacity(jobs.len());
    for (id, input) in jobs {
        let hint = job_hint(output, input)?;
        let module = registry()
            .create(id, input, &hint, params)
            .with_context(|| format!("creating module {id} for {input:?}"))?;
        modules.push(module);
    }

    info!("running {} jobs", modules.len());
    let results = process_all(&mut modules, threads).context("starting batch")?;

    let mut reports = Vec::default();
    let mut failed = 0;
    for ((id, input), result) in jobs.iter().zip(results) {
        match result {
            Ok(report) => reports.push(report),
            Err(err) => {
                error!("{id} failed for {input:?}: {err}");
                failed += 1;
            }
        }
    }
    report::reports(&reports, format)?;

    if failed > 0 {
        bail!("{failed} of {} jobs failed", jobs.len());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(
            EnvFilter::try_from_env("DOWNLINK_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    debug!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Modules { format } => report::modules(registry().descriptors(), format),
        Commands::Decode {
            module,
            input,
            output,
            params,
            format,
        } => {
            let params: Parameters = params.iter().cloned().collect();
            debug!("parameters: {params:?}");
            decode(module, input, output, &params, format)
        }
        Commands::Batch {
            jobs,
            output,
            params,
            threads,
            format,
        } => {
            let params: Parameters = params.iter().cloned().collect();
            debug!("parameters: {params:?}");
            batch(jobs, output, &params, *threads, format)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("max_loss_ratio=0.1"),
            Ok(("max_loss_ratio".to_string(), ParamValue::Float(0.1)))
        );
        assert_eq!(
            parse_param("verbose"),
            Ok(("verbose".to_string(), ParamValue::Bool(true)))
        );
        assert!(parse_param("=1").is_err());
    }

    #[test]
    fn test_parse_job() {
        assert_eq!(
            parse_job("metop_mhs:/data/metop.cadu"),
            Ok(("metop_mhs".to_string(), PathBuf::from("/data/metop.cadu")))
        );
        assert!(parse_job("metop_mhs").is_err());
        assert!(parse_job(":/data/metop.cadu").is_err());
    }

    #[test]
    fn test_job_hint() {
        let hint = job_hint(Path::new("/out"), Path::new("/data/metop.cadu")).unwrap();
        assert_eq!(hint, PathBuf::from("/out/metop/metop"));
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
