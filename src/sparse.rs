//! Incremental assembly of sparse operator rows in compressed sparse row layout.

#[cfg(feature = "serialization")]
use serde::Serialize;

/// The local rows of a sparse operator in compressed sparse row layout.
///
/// Row `r` covers the half-open range `[row_offsets[r], row_offsets[r + 1])`
/// of the column-index and value sequences. The offsets are nondecreasing and
/// start at zero.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize))]
pub struct CsrBlock<F> {
    row_offsets: Vec<usize>,
    column_indices: Vec<usize>,
    values: Vec<F>,
}

impl<F> CsrBlock<F> {
    /// Assembles a block directly from its three raw sequences.
    ///
    /// # Panics
    ///
    /// If the offsets do not start at zero, or the final offset does not
    /// match the number of stored entries, or the column-index and value
    /// sequences differ in length.
    pub fn from_raw(row_offsets: Vec<usize>, column_indices: Vec<usize>, values: Vec<F>) -> Self {
        assert_eq!(
            row_offsets.first(),
            Some(&0),
            "Row offsets must start at zero"
        );
        assert_eq!(
            column_indices.len(),
            values.len(),
            "Number of column indices does not match number of values"
        );
        assert_eq!(
            row_offsets.last(),
            Some(&values.len()),
            "Final row offset does not match number of stored entries"
        );
        Self {
            row_offsets,
            column_indices,
            values,
        }
    }

    /// Returns the number of rows covered by the block.
    pub fn num_rows(&self) -> usize {
        self.row_offsets.len() - 1
    }

    /// Returns the number of stored entries.
    pub fn num_entries(&self) -> usize {
        self.values.len()
    }

    /// Returns the row-offset sequence, of length `num_rows() + 1`.
    pub fn row_offsets(&self) -> &[usize] {
        &self.row_offsets
    }

    /// Returns the column indices of all stored entries, row by row.
    pub fn column_indices(&self) -> &[usize] {
        &self.column_indices
    }

    /// Returns the values of all stored entries, row by row.
    pub fn values(&self) -> &[F] {
        &self.values
    }

    /// Returns the column indices and values stored for the given local row.
    pub fn row_entries(&self, row: usize) -> (&[usize], &[F]) {
        let span = self.row_offsets[row]..self.row_offsets[row + 1];
        (
            &self.column_indices[span.clone()],
            &self.values[span],
        )
    }
}

/// Accumulates the rows of a [`CsrBlock`] one at a time.
///
/// Entries are appended to the row currently under assembly in the order the
/// caller produces them; no sorting by column takes place. The assembler only
/// ever covers the rows the calling worker is responsible for.
#[derive(Debug)]
pub struct CsrAssembler<F> {
    row_offsets: Vec<usize>,
    column_indices: Vec<usize>,
    values: Vec<F>,
}

impl<F> CsrAssembler<F> {
    /// Creates an assembler for the given number of local rows.
    ///
    /// The row-offset buffer is allocated up front; `entries_hint` sizes the
    /// column-index and value buffers to avoid repeated reallocation.
    pub fn new(local_rows: usize, entries_hint: usize) -> Self {
        let mut row_offsets = Vec::with_capacity(local_rows + 1);
        row_offsets.push(0);
        Self {
            row_offsets,
            column_indices: Vec::with_capacity(entries_hint),
            values: Vec::with_capacity(entries_hint),
        }
    }

    /// Appends one entry to the row currently under assembly.
    pub fn push_entry(&mut self, column: usize, value: F) {
        self.column_indices.push(column);
        self.values.push(value);
    }

    /// Completes the current row by recording the running entry count.
    pub fn finish_row(&mut self) {
        self.row_offsets.push(self.values.len());
    }

    /// Returns the number of rows finished so far.
    pub fn finished_rows(&self) -> usize {
        self.row_offsets.len() - 1
    }

    /// Finalizes assembly into an immutable block.
    pub fn into_block(self) -> CsrBlock<F> {
        CsrBlock {
            row_offsets: self.row_offsets,
            column_indices: self.column_indices,
            values: self.values,
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn incremental_assembly_produces_consistent_offsets() {
        let mut assembler = CsrAssembler::new(3, 4);
        assembler.push_entry(0, 0.5);
        assembler.push_entry(1, 0.5);
        assembler.finish_row();
        assembler.finish_row();
        assembler.push_entry(2, 1.0);
        assembler.finish_row();
        assert_eq!(assembler.finished_rows(), 3);

        let block = assembler.into_block();
        assert_eq!(block.num_rows(), 3);
        assert_eq!(block.num_entries(), 3);
        assert_eq!(block.row_offsets(), &[0, 2, 2, 3]);
        assert_eq!(block.row_entries(0), (&[0, 1][..], &[0.5, 0.5][..]));
        assert_eq!(block.row_entries(1), (&[][..], &[][..]));
        assert_eq!(block.row_entries(2), (&[2][..], &[1.0][..]));
    }

    #[test]
    fn entries_keep_their_insertion_order_within_a_row() {
        let mut assembler = CsrAssembler::new(1, 2);
        assembler.push_entry(7, 0.25);
        assembler.push_entry(3, 0.75);
        assembler.finish_row();

        let block = assembler.into_block();
        assert_eq!(block.column_indices(), &[7, 3]);
        assert_eq!(block.values(), &[0.25, 0.75]);
    }

    #[test]
    fn raw_construction_checks_sequence_consistency() {
        let block = CsrBlock::from_raw(vec![0, 1, 2], vec![0, 1], vec![1.0, 0.5]);
        assert_eq!(block.num_rows(), 2);
    }

    #[test]
    #[should_panic(expected = "Final row offset")]
    fn raw_construction_rejects_inconsistent_offsets() {
        CsrBlock::<f64>::from_raw(vec![0, 3], vec![0, 1], vec![1.0, 0.5]);
    }
}
