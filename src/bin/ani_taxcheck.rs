use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use ani_taxcheck::acquisition::AcquisitionSummary;
use ani_taxcheck::app::App;
use ani_taxcheck::archive::{ArchiveClient, ArchiveHttpClient};
use ani_taxcheck::config::{ConfigLoader, ResolvedConfig};
use ani_taxcheck::domain::Accession;
use ani_taxcheck::error::TaxCheckError;
use ani_taxcheck::fs_util;
use ani_taxcheck::groups::IndistinguishableGroupIndex;
use ani_taxcheck::output::JsonOutput;
use ani_taxcheck::reference::ReferenceTable;
use ani_taxcheck::threshold::ThresholdResolver;

#[derive(Parser)]
#[command(name = "ani-taxcheck")]
#[command(about = "Taxonomic identity check of a genome assembly using ANI against type strains")]
#[command(version)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download reference genomes listed in a file, verified by MD5")]
    Download(DownloadArgs),
    #[command(about = "Check a reference genome list and fetch missing genomes")]
    Ensure(EnsureArgs),
    #[command(about = "Classify a similarity table and write tc_result.tsv")]
    Classify(ClassifyArgs),
}

#[derive(Args)]
struct DownloadArgs {
    accession_file: PathBuf,

    #[arg(long)]
    out: Option<PathBuf>,

    #[arg(long)]
    workers: Option<usize>,
}

#[derive(Args)]
struct EnsureArgs {
    reference_list: PathBuf,
}

#[derive(Args)]
struct ClassifyArgs {
    similarity_table: PathBuf,

    #[arg(long, default_value = ".")]
    out: PathBuf,

    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<TaxCheckError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &TaxCheckError) -> u8 {
    match error {
        TaxCheckError::Configuration(_)
        | TaxCheckError::ConfigRead(_)
        | TaxCheckError::ConfigParse(_)
        | TaxCheckError::InvalidAccession(_)
        | TaxCheckError::ReferenceParse { .. }
        | TaxCheckError::UnknownReference(_) => 2,
        TaxCheckError::Network(_)
        | TaxCheckError::NetworkStatus { .. }
        | TaxCheckError::NotFound(_)
        | TaxCheckError::Integrity { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Download(args) => run_download(args, config),
        Commands::Ensure(args) => run_ensure(args, config),
        Commands::Classify(args) => run_classify(args, config),
    }
}

/// Acquisition-only commands never touch the reference tables.
fn acquisition_app(
    config: ResolvedConfig,
) -> miette::Result<App<ArchiveHttpClient, ReferenceTable>> {
    let archive = ArchiveHttpClient::new(config.timeout)?;
    let thresholds = ThresholdResolver::new(config.ani_threshold);
    Ok(App::new(
        config,
        archive,
        ReferenceTable::default(),
        IndistinguishableGroupIndex::default(),
        thresholds,
    ))
}

fn run_download(args: DownloadArgs, config: ResolvedConfig) -> miette::Result<()> {
    let accessions = fs_util::read_list_file(&args.accession_file)?
        .iter()
        .map(|line| line.parse::<Accession>())
        .collect::<Result<Vec<_>, _>>()?;
    let dest_dir = args
        .out
        .unwrap_or_else(|| config.genome_dir.clone().into_std_path_buf());

    let app = acquisition_app(config)?;
    let summary = app.download(&accessions, &dest_dir, args.workers)?;
    print_acquisition_summary(&summary);
    if summary.is_complete() {
        Ok(())
    } else {
        Err(miette::Report::msg(format!(
            "{} of {} genomes could not be downloaded",
            summary.failed + summary.not_found,
            summary.requested
        )))
    }
}

fn run_ensure(args: EnsureArgs, config: ResolvedConfig) -> miette::Result<()> {
    let reference_paths: Vec<PathBuf> = fs_util::read_list_file(&args.reference_list)?
        .into_iter()
        .map(PathBuf::from)
        .collect();

    let app = acquisition_app(config)?;
    let check = app.ensure_references(&reference_paths)?;
    for summary in &check.acquisitions {
        print_acquisition_summary(summary);
    }
    println!(
        "references: {} listed, {} missing, {} still missing",
        check.total,
        check.missing.len(),
        check.still_missing()
    );
    if check.still_missing() == 0 {
        Ok(())
    } else {
        Err(miette::Report::msg(format!(
            "{} reference genomes are unavailable",
            check.still_missing()
        )))
    }
}

fn run_classify(args: ClassifyArgs, config: ResolvedConfig) -> miette::Result<()> {
    let app = App::load(config, NopArchive)?;
    let result = app.check(&args.similarity_table, &args.out, args.json)?;

    if args.json {
        JsonOutput::print(&result.classification).into_diagnostic()?;
    } else {
        println!("{}", result.classification.verdict);
    }
    Ok(())
}

fn print_acquisition_summary(summary: &AcquisitionSummary) {
    for outcome in &summary.outcomes {
        println!("{}", outcome.log_line());
    }
    println!(
        "requested {}, already present {}, downloaded {}, failed {}, not found {}",
        summary.requested,
        summary.already_present,
        summary.succeeded,
        summary.failed,
        summary.not_found
    );
}

struct NopArchive;

impl ArchiveClient for NopArchive {
    fn fetch_text(&self, _url: &str) -> Result<String, TaxCheckError> {
        Err(TaxCheckError::Network(
            "archive client not configured".to_string(),
        ))
    }

    fn download(&self, _url: &str, _destination: &mut dyn Write) -> Result<u64, TaxCheckError> {
        Err(TaxCheckError::Network(
            "archive client not configured".to_string(),
        ))
    }
}
