//! Reading the input table and writing the embedding table.

use std::path::{Path, PathBuf};

use csv::StringRecord;
use log::{debug, info};

use crate::error::{Error, LoadError, WriteError};
use crate::matrix::Matrix;
use crate::Featurized;

/// Prefix of the vector column names, numbered from 1.
pub const COLUMN_PREFIX: &str = "molbert_";

/// Tab for `.tsv` and `.tab` files, comma for everything else.
pub fn delimiter(path: &Path) -> u8 {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext)
            if ext.eq_ignore_ascii_case("tsv")
                || ext.eq_ignore_ascii_case("tab") =>
        {
            b'\t'
        }
        _ => b',',
    }
}

/// An input table held in memory, one [StringRecord] per row.
#[derive(Debug)]
pub struct Table {
    path: PathBuf,
    headers: Vec<String>,
    rows: Vec<StringRecord>,
}

impl Table {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref().to_path_buf();
        let read_err = |source| LoadError::Read {
            path: path.clone(),
            source,
        };
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter(&path))
            .flexible(true)
            .from_path(&path)
            .map_err(read_err)?;
        let headers = reader
            .headers()
            .map_err(read_err)?
            .iter()
            .map(String::from)
            .collect();
        let rows = reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_err)?;
        debug!("read {} rows from {path:?}", rows.len());
        Ok(Self {
            path,
            headers,
            rows,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// the values of column `name`, in row order
    pub fn column(&self, name: &str) -> Result<Vec<&str>, LoadError> {
        let Some(idx) = self.headers.iter().position(|h| h == name) else {
            return Err(LoadError::MissingColumn {
                column: name.to_owned(),
                path: self.path.clone(),
                available: self.headers.clone(),
            });
        };
        // short rows read as an empty descriptor
        Ok(self
            .rows
            .iter()
            .map(|row| row.get(idx).unwrap_or_default())
            .collect())
    }
}

/// The output of a run: the descriptor of every valid row next to its
/// embedding.
#[derive(Debug)]
pub struct EmbeddingTable {
    column: String,
    ids: Vec<String>,
    vectors: Matrix<f32>,
}

impl EmbeddingTable {
    /// the descriptor column followed by `molbert_1..=molbert_dim`
    pub fn header(&self) -> Vec<String> {
        let (_, dim) = self.vectors.shape();
        std::iter::once(self.column.clone())
            .chain((1..=dim).map(|i| format!("{COLUMN_PREFIX}{i}")))
            .collect()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn vectors(&self) -> &Matrix<f32> {
        &self.vectors
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// write `self` to `path`, replacing any existing file. there is no index
    /// column
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), WriteError> {
        let path = path.as_ref();
        let csv_err = |source| WriteError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter(path))
            .from_path(path)
            .map_err(csv_err)?;
        writer.write_record(self.header()).map_err(csv_err)?;
        for (id, row) in self.ids.iter().zip(self.vectors.rows()) {
            let record = std::iter::once(id.clone())
                .chain(row.iter().map(|x| x.to_string()));
            writer.write_record(record).map_err(csv_err)?;
        }
        writer.flush().map_err(|source| WriteError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("wrote {} rows to {path:?}", self.ids.len());
        Ok(())
    }
}

/// combine the valid rows of `table` with their embeddings. rows marked
/// invalid in `featurized` are dropped, the rest keep their input order. with
/// no valid rows the result is just a header of `dim` vector columns
pub fn assemble(
    table: &Table,
    column: &str,
    featurized: Featurized,
    dim: usize,
) -> Result<EmbeddingTable, Error> {
    let smiles = table.column(column)?;
    debug_assert_eq!(featurized.len(), smiles.len());
    let Featurized { vectors, valid } = featurized;

    let mut ids = Vec::new();
    let mut rows = Vec::new();
    for ((id, vector), ok) in smiles.into_iter().zip(vectors).zip(valid) {
        if ok {
            ids.push(id.to_owned());
            rows.push(vector);
        }
    }

    let vectors = if rows.is_empty() {
        info!("no valid SMILES, writing header only");
        Matrix::zeros(0, dim)
    } else {
        Matrix::from_rows(rows, dim).ok_or(WriteError::Shape { dim })?
    };

    Ok(EmbeddingTable {
        column: column.to_owned(),
        ids,
        vectors,
    })
}
