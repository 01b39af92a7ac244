use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, trace};
use molbert::{
    config::{Config, DeviceSpec},
    featurizer::MolBertFeaturizer,
    table::Table,
    Error,
};

/// Featurize SMILES from a CSV file and save embeddings.
#[derive(Parser)]
struct Cli {
    /// Path to the input table. Files ending in .tsv or .tab are read as
    /// tab-separated, anything else as CSV.
    #[arg(long)]
    input: PathBuf,

    /// Name of the SMILES column in the input table.
    #[arg(long)]
    smiles_column: String,

    /// Path to the output table with one vector column per embedding
    /// dimension. Overwritten if it exists.
    #[arg(long)]
    output: PathBuf,

    /// A TOML file configuring the featurizer. Without one, the published
    /// MolBERT settings are used.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides `checkpoint_path` from the config.
    #[arg(long)]
    checkpoint_path: Option<PathBuf>,

    /// Overrides `vocab_path` from the config. Needed whenever the checkpoint
    /// was not trained on the built-in vocabulary.
    #[arg(long)]
    vocab_path: Option<PathBuf>,

    /// Overrides `device` from the config: cpu, cuda[:N] or metal[:N].
    #[arg(long)]
    device: Option<DeviceSpec>,

    /// Overrides `threads` from the config. 0 uses the number of logical CPUs
    /// as detected by rayon.
    #[arg(short, long)]
    threads: Option<usize>,
}

impl Cli {
    fn config(&self) -> Result<Config, Error> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(path) = &self.checkpoint_path {
            config.checkpoint_path.clone_from(path);
        }
        if let Some(path) = &self.vocab_path {
            config.vocab_path = Some(path.clone());
        }
        if let Some(device) = self.device {
            config.device = device;
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        Ok(config)
    }
}

fn featurize(cli: &Cli) -> Result<(), Error> {
    let config = cli.config()?;
    trace!("{config:?}");

    info!("loading input table {:?}", cli.input);
    let table = Table::load(&cli.input)?;
    info!("loaded {} rows", table.len());
    // fail on a bad column before paying for the model
    table.column(&cli.smiles_column)?;

    let featurizer = MolBertFeaturizer::load(&config)?;
    info!("featurizer initialized");

    let summary = molbert::run(
        &table,
        &cli.smiles_column,
        &cli.output,
        &featurizer,
        config.threads,
    )?;
    info!(
        "saved {} of {} molecules to {:?}",
        summary.valid, summary.rows, cli.output
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    match featurize(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("failed to process and save the file");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
