use std::ops::{Index, IndexMut};

/// A dense row-major matrix. Every row has exactly `cols` entries, so stacking
/// embeddings into one is also the check that they share a width.
#[derive(Debug, PartialEq)]
pub struct Matrix<T> {
    data: Vec<T>,
    cols: usize,
}

impl<T: Default + Clone> Matrix<T> {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![T::default(); rows * cols],
            cols,
        }
    }
}

impl<T> Matrix<T> {
    /// stack `rows` into a matrix with `cols` columns. returns `None` if any
    /// row has a different length
    pub fn from_rows(rows: Vec<Vec<T>>, cols: usize) -> Option<Self> {
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return None;
            }
            data.extend(row);
        }
        Some(Self { data, cols })
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        let rows = if self.cols == 0 {
            0
        } else {
            self.data.len() / self.cols
        };
        (rows, self.cols)
    }

    pub fn row(&self, i: usize) -> &[T] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[T]> {
        // chunks_exact panics on a zero chunk size
        self.data.chunks_exact(self.cols.max(1))
    }
}

impl<T> Index<(usize, usize)> for Matrix<T> {
    type Output = T;

    fn index(&self, (x, y): (usize, usize)) -> &Self::Output {
        &self.data[x * self.cols + y]
    }
}

impl<T> IndexMut<(usize, usize)> for Matrix<T> {
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut Self::Output {
        &mut self.data[x * self.cols + y]
    }
}
