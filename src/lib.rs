use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
};

use featurizer::Featurizer;
use log::{debug, info, warn};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use table::Table;

pub mod config;
pub mod error;
pub mod featurizer;
pub mod matrix;
pub mod smiles;
pub mod table;

pub use error::{Error, FeaturizeError, LoadError, ModelError, WriteError};

/// The outcome of featurizing one molecule. Invalid molecules carry a zero
/// vector of the featurizer's width.
#[derive(Clone, Debug, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub valid: bool,
}

/// Per-row featurization results, parallel to the input rows: entry `i` of
/// both lists belongs to row `i`, whether or not it was valid.
#[derive(Debug, Default, PartialEq)]
pub struct Featurized {
    pub vectors: Vec<Vec<f32>>,
    pub valid: Vec<bool>,
}

impl Featurized {
    pub fn len(&self) -> usize {
        self.valid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valid.is_empty()
    }

    pub fn num_valid(&self) -> usize {
        self.valid.iter().filter(|v| **v).count()
    }
}

impl FromIterator<Embedding> for Featurized {
    fn from_iter<T: IntoIterator<Item = Embedding>>(iter: T) -> Self {
        let mut ret = Self::default();
        for Embedding { vector, valid } in iter {
            ret.vectors.push(vector);
            ret.valid.push(valid);
        }
        ret
    }
}

/// Row counts reported at the end of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Summary {
    pub rows: usize,
    pub valid: usize,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

/// embed a single SMILES as a vector of `dim` values. any failure, including
/// a panic inside the featurizer or a vector of the wrong width, yields an
/// invalid zero vector
pub fn embed<F: Featurizer + ?Sized>(
    featurizer: &F,
    smiles: &str,
    dim: usize,
) -> Embedding {
    let res = catch_unwind(AssertUnwindSafe(|| featurizer.transform(smiles)))
        .unwrap_or_else(|p| Err(FeaturizeError::Panic(panic_message(p))))
        .and_then(|vector| {
            if vector.len() == dim {
                Ok(vector)
            } else {
                Err(FeaturizeError::Dimension {
                    got: vector.len(),
                    want: dim,
                })
            }
        });
    match res {
        Ok(vector) => Embedding {
            vector,
            valid: true,
        },
        Err(e) => {
            debug!("failed to featurize {smiles:?}: {e}");
            Embedding {
                vector: vec![0.0; dim],
                valid: false,
            }
        }
    }
}

/// featurize every entry of `smiles`. `threads` has the same meaning as
/// [config::Config::threads]. whatever the thread count, the result has one
/// entry per input, in input order
pub fn featurize<F: Featurizer + ?Sized>(
    featurizer: &F,
    smiles: &[&str],
    threads: usize,
) -> Featurized {
    let total = smiles.len();
    let step = (total / 10).max(1);
    let progress = AtomicUsize::new(0);
    let dim = featurizer.dim();

    let map_op = |s: &&str| -> Embedding {
        let ret = embed(featurizer, s, dim);
        let cur = progress.fetch_add(1, Ordering::Relaxed) + 1;
        if cur % step == 0 || cur == total {
            info!("{}% complete ({cur}/{total})", cur * 100 / total);
        }
        ret
    };

    if threads == 1 {
        return smiles.iter().map(map_op).collect();
    }
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool.install(|| {
            smiles
                .par_iter()
                .map(map_op)
                .collect::<Vec<_>>()
                .into_iter()
                .collect()
        }),
        Err(e) => {
            warn!("failed to build thread pool, running sequentially: {e}");
            smiles.iter().map(map_op).collect()
        }
    }
}

/// featurize column `smiles_column` of `table` and write the valid rows with
/// their embeddings to `output`
pub fn run<F: Featurizer + ?Sized>(
    table: &Table,
    smiles_column: &str,
    output: impl AsRef<Path>,
    featurizer: &F,
    threads: usize,
) -> Result<Summary, Error> {
    let smiles = table.column(smiles_column)?;
    info!("extracted {} SMILES strings", smiles.len());

    let featurized = featurize(featurizer, &smiles, threads);
    let summary = Summary {
        rows: featurized.len(),
        valid: featurized.num_valid(),
    };
    info!(
        "featurized {} valid molecules out of {} total",
        summary.valid, summary.rows
    );

    let out =
        table::assemble(table, smiles_column, featurized, featurizer.dim())?;
    out.write(output)?;
    Ok(summary)
}

/// load `input`, featurize its `smiles_column`, and write the result to
/// `output`. nothing is written if `input` can't be loaded
pub fn featurize_smiles<F: Featurizer + ?Sized>(
    input: impl AsRef<Path>,
    smiles_column: &str,
    output: impl AsRef<Path>,
    featurizer: &F,
    threads: usize,
) -> Result<Summary, Error> {
    let input = input.as_ref();
    info!("loading input table {input:?}");
    let table = Table::load(input)?;
    info!("loaded {} rows", table.len());
    run(&table, smiles_column, output, featurizer, threads)
}
