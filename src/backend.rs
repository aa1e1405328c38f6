//! In-process model of the distributed linear-algebra backend.
//!
//! Operator construction targets an external distributed-matrix library that
//! is addressed exclusively through collective calls. This module keeps that
//! interface boundary while staying runnable inside a single process: a
//! [`ProcGroup`] handle identifies one rank of a fixed-size worker group,
//! [`DistVector`]s own their locally-held contiguous segment, and the
//! collective creation call of [`DistMatrix`] blocks each rank until every
//! rank of the group has deposited a local block with consistent global
//! dimensions. A rank that never reaches the collective call leaves the rest
//! of the group waiting; builds are all-or-nothing per group.

use std::{
    any::Any,
    cell::Cell,
    fmt,
    ops::Deref,
    result,
    sync::{Arc, Barrier, Mutex, MutexGuard},
    thread,
};

use crate::{
    error::{RegistrationError, Result},
    num::Floating,
    partition::{partition_rows, RowRange},
    sparse::CsrBlock,
};

/// Handle identifying one rank of a fixed-size process group.
///
/// Collective operations must be invoked by all ranks of the group with
/// matching global parameters; each rank blocks until the group is complete.
/// The handle is passed explicitly to every operation that takes part in a
/// collective, never stored as ambient global state.
pub struct ProcGroup {
    rank: usize,
    size: usize,
    shared: Arc<GroupShared>,
}

struct GroupShared {
    barrier: Barrier,
    assembly: Mutex<AssemblyState>,
}

struct AssemblyState {
    call: Option<Box<dyn Any + Send>>,
    failure: Option<String>,
}

struct CollectiveCall<F> {
    global_shape: (usize, usize),
    row_counts: Vec<Option<usize>>,
    deposits: Vec<Option<CsrBlock<F>>>,
    result: Option<Arc<CsrBlock<F>>>,
}

impl<F> CollectiveCall<F> {
    fn new(group_size: usize, global_shape: (usize, usize)) -> Self {
        Self {
            global_shape,
            row_counts: vec![None; group_size],
            deposits: (0..group_size).map(|_| None).collect(),
            result: None,
        }
    }
}

impl ProcGroup {
    /// Creates a group containing only the calling worker.
    pub fn single() -> Self {
        let mut handles = Self::split(1);
        handles.pop().expect("A group of size one has exactly one handle")
    }

    /// Creates the handles for every rank of a new group of the given size.
    ///
    /// # Panics
    ///
    /// If the requested size is zero.
    pub fn split(size: usize) -> Vec<Self> {
        assert!(size > 0, "Cannot create a process group of size zero");
        let shared = Arc::new(GroupShared {
            barrier: Barrier::new(size),
            assembly: Mutex::new(AssemblyState {
                call: None,
                failure: None,
            }),
        });
        (0..size)
            .map(|rank| Self {
                rank,
                size,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// Returns the rank of the calling worker within the group.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Returns the number of workers in the group.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the local row range of this rank for an operator with the
    /// given global row count.
    pub fn row_partition(&self, total_rows: usize) -> RowRange {
        partition_rows(total_rows, self.size, self.rank)
    }

    fn lock_state(&self) -> MutexGuard<'_, AssemblyState> {
        self.shared
            .assembly
            .lock()
            .expect("Collective state was poisoned by a panicked rank")
    }
}

impl fmt::Debug for ProcGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcGroup(rank {} of {})", self.rank, self.size)
    }
}

/// Runs one instance of the given closure per rank of a new process group and
/// collects the per-rank outcomes in rank order.
///
/// Every rank runs on a dedicated thread. Collective calls block until all
/// ranks arrive, so group execution must never be scheduled on a
/// work-stealing pool that may provide fewer threads than ranks.
pub fn run_group<T, W>(size: usize, worker: W) -> Vec<T>
where
    T: Send,
    W: Fn(ProcGroup) -> T + Sync,
{
    let handles = ProcGroup::split(size);
    thread::scope(|scope| {
        let worker = &worker;
        let threads: Vec<_> = handles
            .into_iter()
            .map(|group| scope.spawn(move || worker(group)))
            .collect();
        threads
            .into_iter()
            .map(|thread| thread.join().expect("Group worker panicked"))
            .collect()
    })
}

/// Owned handle to a distributed sparse operator produced by a collective
/// creation call.
///
/// The backend resources behind the handle are released deterministically
/// when the last handle referring to them is dropped; no raw backend pointer
/// ever crosses this boundary.
#[derive(Debug, Clone)]
pub struct DistMatrix<F> {
    global_rows: usize,
    global_cols: usize,
    local_rows: RowRange,
    assembled: Arc<CsrBlock<F>>,
}

impl<F: Floating> DistMatrix<F> {
    /// Collectively creates a distributed operator from the local CSR blocks
    /// deposited by every rank of the group.
    ///
    /// Blocks until all ranks of the group have called with the same global
    /// dimensions. The local row counts must sum to the global row count and
    /// every column index must lie inside `[0, global_cols)`; any violation,
    /// on any rank, fails the creation for the entire group with a
    /// [`RegistrationError::BackendCollective`]. No partial result is
    /// offered. Duplicate column indices within a row, as produced by edge
    /// clamping, are summed during assembly.
    pub fn create_from_csr(
        group: &ProcGroup,
        block: CsrBlock<F>,
        global_rows: usize,
        global_cols: usize,
    ) -> Result<Self> {
        group.shared.barrier.wait();
        {
            let mut state = group.lock_state();
            if let Err(message) = deposit_block(
                &mut state,
                group.rank,
                group.size,
                block,
                global_rows,
                global_cols,
            ) {
                record_failure(&mut state, message);
            }
        }
        if group.shared.barrier.wait().is_leader() {
            let mut state = group.lock_state();
            if state.failure.is_none() {
                if let Err(message) = assemble_deposits::<F>(&mut state) {
                    record_failure(&mut state, message);
                }
            }
        }
        group.shared.barrier.wait();
        let outcome = Self::collect_outcome(group);
        if group.shared.barrier.wait().is_leader() {
            let mut state = group.lock_state();
            state.call = None;
            state.failure = None;
        }
        outcome
    }

    fn collect_outcome(group: &ProcGroup) -> Result<Self> {
        let mut state = group.lock_state();
        if let Some(message) = &state.failure {
            return Err(RegistrationError::BackendCollective(message.clone()));
        }
        let call = match downcast_call::<F>(&mut state.call) {
            Some(call) => call,
            None => {
                return Err(RegistrationError::BackendCollective(
                    "Collective call state disappeared before completion".to_string(),
                ))
            }
        };
        let assembled = match &call.result {
            Some(assembled) => Arc::clone(assembled),
            None => {
                return Err(RegistrationError::BackendCollective(
                    "No assembled operator was produced by the collective call".to_string(),
                ))
            }
        };
        let start: usize = call.row_counts[..group.rank]
            .iter()
            .map(|count| count.unwrap_or(0))
            .sum();
        let count = call.row_counts[group.rank].unwrap_or(0);
        let (global_rows, global_cols) = call.global_shape;
        Ok(Self {
            global_rows,
            global_cols,
            local_rows: RowRange::new(start, start + count),
            assembled,
        })
    }

    /// Returns the global `(rows, cols)` shape of the operator.
    pub fn global_shape(&self) -> (usize, usize) {
        (self.global_rows, self.global_cols)
    }

    /// Returns the range of global rows owned by this rank.
    pub fn local_row_range(&self) -> RowRange {
        self.local_rows
    }

    /// Returns the total number of stored entries across the whole operator.
    pub fn global_nnz(&self) -> usize {
        self.assembled.num_entries()
    }

    /// Returns the column indices and values stored for the given global row.
    pub fn row_entries(&self, global_row: usize) -> (&[usize], &[F]) {
        self.assembled.row_entries(global_row)
    }
}

fn record_failure(state: &mut AssemblyState, message: String) {
    if state.failure.is_none() {
        state.failure = Some(message);
    }
}

fn downcast_call<F: Floating>(
    call: &mut Option<Box<dyn Any + Send>>,
) -> Option<&mut CollectiveCall<F>> {
    call.as_mut()?.downcast_mut()
}

fn deposit_block<F: Floating>(
    state: &mut AssemblyState,
    rank: usize,
    group_size: usize,
    block: CsrBlock<F>,
    global_rows: usize,
    global_cols: usize,
) -> result::Result<(), String> {
    if block.row_offsets().windows(2).any(|pair| pair[0] > pair[1]) {
        return Err(format!(
            "Rank {} deposited a block with decreasing row offsets",
            rank
        ));
    }
    if let Some(&column) = block.column_indices().iter().find(|&&c| c >= global_cols) {
        return Err(format!(
            "Rank {} deposited column index {} outside [0, {})",
            rank, column, global_cols
        ));
    }

    if state.call.is_none() {
        state.call = Some(Box::new(CollectiveCall::<F>::new(
            group_size,
            (global_rows, global_cols),
        )));
    }
    let call = match downcast_call::<F>(&mut state.call) {
        Some(call) => call,
        None => return Err("Ranks disagree on the operator element type".to_string()),
    };
    if call.global_shape != (global_rows, global_cols) {
        return Err(format!(
            "Rank {} requested global shape {}x{} but the group started with {}x{}",
            rank, global_rows, global_cols, call.global_shape.0, call.global_shape.1
        ));
    }
    if call.deposits[rank].is_some() {
        return Err(format!("Rank {} deposited more than one block", rank));
    }
    call.row_counts[rank] = Some(block.num_rows());
    call.deposits[rank] = Some(block);
    Ok(())
}

fn assemble_deposits<F: Floating>(state: &mut AssemblyState) -> result::Result<(), String> {
    let call = match downcast_call::<F>(&mut state.call) {
        Some(call) => call,
        None => return Err("Collective call state missing during assembly".to_string()),
    };
    if call.deposits.iter().any(Option::is_none) {
        return Err("Not every rank deposited a local block".to_string());
    }
    let (global_rows, _) = call.global_shape;
    let total_local_rows: usize = call.row_counts.iter().map(|count| count.unwrap_or(0)).sum();
    if total_local_rows != global_rows {
        return Err(format!(
            "Local row counts sum to {} but the global row count is {}",
            total_local_rows, global_rows
        ));
    }

    let num_entries: usize = call
        .deposits
        .iter()
        .flatten()
        .map(CsrBlock::num_entries)
        .sum();
    let mut row_offsets = Vec::with_capacity(global_rows + 1);
    row_offsets.push(0);
    let mut column_indices = Vec::with_capacity(num_entries);
    let mut values: Vec<F> = Vec::with_capacity(num_entries);

    for deposit in &mut call.deposits {
        let block = match deposit.take() {
            Some(block) => block,
            None => return Err("Rank deposit disappeared during assembly".to_string()),
        };
        for row in 0..block.num_rows() {
            let (columns, row_values) = block.row_entries(row);
            let row_start = column_indices.len();
            for (&column, &value) in columns.iter().zip(row_values) {
                // Clamping at domain edges can place two corners on the same
                // column within a row; duplicates are summed.
                match column_indices[row_start..]
                    .iter()
                    .position(|&c| c == column)
                {
                    Some(offset) => {
                        let index = row_start + offset;
                        values[index] = values[index] + value;
                    }
                    None => {
                        column_indices.push(column);
                        values.push(value);
                    }
                }
            }
            row_offsets.push(column_indices.len());
        }
    }
    call.result = Some(Arc::new(CsrBlock::from_raw(
        row_offsets,
        column_indices,
        values,
    )));
    Ok(())
}

/// Distributed vector of which each rank owns one contiguous segment.
///
/// A handle stores only the values owned by its rank; the segment boundaries
/// follow the same partitioning as operator rows.
#[derive(Debug)]
pub struct DistVector<F> {
    global_len: usize,
    local_range: RowRange,
    values: Vec<F>,
    outstanding_borrows: Cell<usize>,
}

impl<F: Floating> DistVector<F> {
    /// Creates this rank's part of a distributed vector holding the given
    /// global values, partitioned the same way as operator rows.
    pub fn scatter(group: &ProcGroup, global_values: &[F]) -> Self {
        let local_range = group.row_partition(global_values.len());
        Self {
            global_len: global_values.len(),
            local_range,
            values: global_values[local_range.start()..local_range.end()].to_vec(),
            outstanding_borrows: Cell::new(0),
        }
    }

    /// Creates this rank's part of a distributed vector directly from its
    /// locally owned segment.
    ///
    /// # Panics
    ///
    /// If the segment length does not match the owned row range.
    pub fn from_local(global_len: usize, local_range: RowRange, values: Vec<F>) -> Self {
        assert_eq!(
            local_range.len(),
            values.len(),
            "Local segment of length {} does not fill the owned row range of length {}",
            values.len(),
            local_range.len()
        );
        Self {
            global_len,
            local_range,
            values,
            outstanding_borrows: Cell::new(0),
        }
    }

    /// Returns the global number of elements of the vector.
    pub fn global_len(&self) -> usize {
        self.global_len
    }

    /// Returns the range of global element indices owned by this rank.
    pub fn ownership_range(&self) -> RowRange {
        self.local_range
    }

    /// Borrows the locally owned segment for reading.
    ///
    /// The borrow is released when the returned guard is dropped, on every
    /// exit path of the borrowing scope, including unwinding.
    pub fn borrow_local(&self) -> LocalValues<'_, F> {
        self.outstanding_borrows
            .set(self.outstanding_borrows.get() + 1);
        LocalValues { vector: self }
    }

    /// Returns the number of currently outstanding local borrows.
    pub fn active_borrows(&self) -> usize {
        self.outstanding_borrows.get()
    }
}

/// Scoped read access to the locally owned segment of a [`DistVector`].
#[derive(Debug)]
pub struct LocalValues<'a, F> {
    vector: &'a DistVector<F>,
}

impl<F> Deref for LocalValues<'_, F> {
    type Target = [F];

    fn deref(&self) -> &[F] {
        &self.vector.values
    }
}

impl<F> Drop for LocalValues<'_, F> {
    fn drop(&mut self) {
        let outstanding = &self.vector.outstanding_borrows;
        outstanding.set(outstanding.get() - 1);
    }
}
