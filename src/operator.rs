//! Construction of sparse resampling and warp operators.
//!
//! Both builders follow the same row-partitioned scheme: every rank of the
//! process group walks its own contiguous range of operator rows, maps each
//! row to a continuous source coordinate, gathers the multilinear corner
//! weights of that coordinate and appends them to a local CSR block, which is
//! finally handed to the backend in a collective creation call. No data is
//! exchanged between ranks before that call.

use crate::{
    backend::{DistMatrix, DistVector, ProcGroup},
    error::{RegistrationError, Result},
    indexing,
    interpolation::{self, BoundaryPolicy},
    num::Floating,
    sparse::CsrAssembler,
};

/// Builds the sparse operator that resamples a source grid onto a target grid
/// under an element-wise affine coordinate map.
///
/// Each target grid point maps to the source coordinate
/// `scale * target + offset`; its operator row holds the multilinear weights
/// of the surrounding source-grid corners. Corners falling outside the source
/// grid are dropped without renormalization, so rows near the source boundary
/// may sum to less than one. `tile_dim` independently replicated channels
/// share the same spatial weights, stacked block-diagonally: the operator has
/// `tile_dim * target_size` rows and `tile_dim * source_size` columns, and
/// the rows of tile `t` address the columns of tile `t` only.
///
/// # Parameters
///
/// - `group`: Process-group handle of the calling rank.
/// - `source_shape`: Shape of the grid being resampled; only the first
///   `ndim` entries are used.
/// - `target_shape`: Shape of the grid being resampled onto; only the first
///   `ndim` entries are used.
/// - `scale`: Per-dimension ratio of source to target grid spacing.
/// - `offset`: Per-dimension source-coordinate offset of the target origin.
/// - `ndim`: Number of grid dimensions.
/// - `tile_dim`: Number of replicated channels.
///
/// # Returns
///
/// A `Result` which is either:
///
/// - `Ok`: Contains the operator handle owned by the caller.
/// - `Err`: A `Precondition` error if a shape or coefficient sequence is
///   shorter than `ndim` (reported before any parallel work), or a
///   `BackendCollective` error if the group's assembly call failed.
pub fn build_basis_operator<F: Floating>(
    group: &ProcGroup,
    source_shape: &[usize],
    target_shape: &[usize],
    scale: &[F],
    offset: &[F],
    ndim: usize,
    tile_dim: usize,
) -> Result<DistMatrix<F>> {
    if source_shape.len() < ndim || target_shape.len() < ndim {
        return Err(RegistrationError::Precondition(format!(
            "Source shape {:?} and target shape {:?} must both have at least {} dimensions",
            source_shape, target_shape, ndim
        )));
    }
    if scale.len() < ndim || offset.len() < ndim {
        return Err(RegistrationError::Precondition(format!(
            "Scale and offset coefficients must both have at least {} entries",
            ndim
        )));
    }
    let source_shape = indexing::truncated(source_shape, ndim);
    let target_shape = indexing::truncated(target_shape, ndim);
    let scale = &scale[..ndim];
    let offset = &offset[..ndim];

    let source_size = indexing::grid_size(source_shape);
    let target_size = indexing::grid_size(target_shape);
    let global_rows = tile_dim * target_size;
    let global_cols = tile_dim * source_size;

    let local_rows = group.row_partition(global_rows);
    let mut assembler = CsrAssembler::new(local_rows.len(), local_rows.len() << ndim);
    let mut source_coord = vec![F::zero(); ndim];
    let mut corner_buf = vec![0_usize; ndim];

    for global_row in local_rows.iter() {
        let target_index = global_row % target_size;
        let column_offset = source_size * (global_row / target_size);
        let target_coord = indexing::unravel(target_index, target_shape);
        for dim in 0..ndim {
            source_coord[dim] =
                scale[dim] * F::from(target_coord[dim]).unwrap() + offset[dim];
        }
        interpolation::visit_corner_weights(
            &source_coord,
            source_shape,
            BoundaryPolicy::DropOutside,
            |corner, weight| {
                for (buffered, &c) in corner_buf.iter_mut().zip(corner) {
                    *buffered = c as usize;
                }
                let column = indexing::ravel(&corner_buf, source_shape);
                assembler.push_entry(column_offset + column, weight);
            },
        );
        assembler.finish_row();
    }

    DistMatrix::create_from_csr(group, assembler.into_block(), global_rows, global_cols)
}

/// Builds the sparse operator that warps an image under a per-voxel
/// displacement field.
///
/// Each image point maps to the source coordinate `target + displacement`,
/// clamped onto the image, so every row draws from a full corner
/// neighborhood inside the image; near the domain edges clamping can place
/// two corners on the same grid point, in which case the backend sums their
/// weights during assembly. The operator is square, with `image_size` rows
/// and columns, and its row partition is taken directly from the partitioning
/// of the displacement vectors.
///
/// The locally owned segment of every displacement vector is borrowed
/// read-only for the duration of the row loop and released before the
/// collective creation call, on every exit path.
///
/// # Parameters
///
/// - `group`: Process-group handle of the calling rank.
/// - `image_shape`: Shape of the image being warped; only the first `ndim`
///   entries are used.
/// - `ndim`: Number of image dimensions.
/// - `displacements`: One distributed displacement vector per dimension, all
///   sharing one partitioning.
///
/// # Returns
///
/// A `Result` which is either:
///
/// - `Ok`: Contains the operator handle owned by the caller.
/// - `Err`: A `Precondition` error if the image shape or the displacement
///   vector sequence is shorter than `ndim` (reported before any parallel
///   work), or a `BackendCollective` error if the group's assembly call
///   failed.
pub fn build_warp_operator<F: Floating>(
    group: &ProcGroup,
    image_shape: &[usize],
    ndim: usize,
    displacements: &[DistVector<F>],
) -> Result<DistMatrix<F>> {
    if image_shape.len() < ndim {
        return Err(RegistrationError::Precondition(format!(
            "Image shape {:?} must have at least {} dimensions",
            image_shape, ndim
        )));
    }
    if displacements.len() < ndim {
        return Err(RegistrationError::Precondition(format!(
            "One displacement vector is required per image dimension, got {} for {} dimensions",
            displacements.len(),
            ndim
        )));
    }
    let image_shape = indexing::truncated(image_shape, ndim);
    let image_size = indexing::grid_size(image_shape);

    // TODO: verify that all displacement vectors share this partitioning.
    let local_rows = displacements[0].ownership_range();

    let local_segments: Vec<_> = displacements[..ndim]
        .iter()
        .map(DistVector::borrow_local)
        .collect();

    let mut assembler = CsrAssembler::new(local_rows.len(), local_rows.len() << ndim);
    let mut source_coord = vec![F::zero(); ndim];
    let mut corner_buf = vec![0_usize; ndim];

    for global_row in local_rows.iter() {
        let local_index = global_row - local_rows.start();
        let target_coord = indexing::unravel(global_row, image_shape);
        for dim in 0..ndim {
            source_coord[dim] =
                F::from(target_coord[dim]).unwrap() + local_segments[dim][local_index];
        }
        interpolation::visit_corner_weights(
            &source_coord,
            image_shape,
            BoundaryPolicy::ClampToEdge,
            |corner, weight| {
                for (buffered, &c) in corner_buf.iter_mut().zip(corner) {
                    *buffered = c as usize;
                }
                assembler.push_entry(indexing::ravel(&corner_buf, image_shape), weight);
            },
        );
        assembler.finish_row();
    }

    drop(local_segments);

    DistMatrix::create_from_csr(group, assembler.into_block(), image_size, image_size)
}

#[cfg(test)]
mod tests {

    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn basis_rows_hold_the_weights_of_the_shifted_source_points() {
        let group = ProcGroup::single();
        let matrix =
            build_basis_operator(&group, &[4], &[4], &[1.0], &[0.5], 1, 1).unwrap();
        assert_eq!(matrix.global_shape(), (4, 4));

        for target_index in 0..3 {
            let (columns, values) = matrix.row_entries(target_index);
            assert_eq!(columns, &[target_index, target_index + 1]);
            assert_abs_diff_eq!(values[0], 0.5);
            assert_abs_diff_eq!(values[1], 0.5);
        }
    }

    #[test]
    fn basis_rows_near_the_source_boundary_are_truncated_without_renormalization() {
        let group = ProcGroup::single();
        let matrix =
            build_basis_operator(&group, &[4], &[4], &[1.0], &[0.5], 1, 1).unwrap();

        let (columns, values) = matrix.row_entries(3);
        assert_eq!(columns, &[3]);
        assert_abs_diff_eq!(values[0], 0.5);
    }

    #[test]
    fn basis_shapes_are_truncated_to_the_requested_dimensionality() {
        let group = ProcGroup::single();
        let matrix =
            build_basis_operator(&group, &[4, 9, 9], &[4, 7], &[1.0, 2.0], &[0.5, 0.0], 1, 1)
                .unwrap();
        assert_eq!(matrix.global_shape(), (4, 4));
    }

    #[test]
    fn basis_precondition_failures_are_reported_before_any_work() {
        let group = ProcGroup::single();
        assert!(matches!(
            build_basis_operator(&group, &[4], &[4, 4], &[1.0; 2], &[0.0; 2], 2, 1),
            Err(RegistrationError::Precondition(_))
        ));
        assert!(matches!(
            build_basis_operator(&group, &[4, 4], &[4, 4], &[1.0], &[0.0; 2], 2, 1),
            Err(RegistrationError::Precondition(_))
        ));
    }

    #[test]
    fn warp_with_uniform_negative_displacement_shifts_each_row() {
        let group = ProcGroup::single();
        let displacements = [DistVector::scatter(&group, &[-1.0; 5])];
        let matrix = build_warp_operator(&group, &[5], 1, &displacements).unwrap();
        assert_eq!(matrix.global_shape(), (5, 5));

        let (columns, values) = matrix.row_entries(2);
        assert_eq!(columns, &[1]);
        assert_abs_diff_eq!(values[0], 1.0);

        // The first row's source coordinate is clamped back onto the image.
        let (columns, values) = matrix.row_entries(0);
        assert_eq!(columns, &[0]);
        assert_abs_diff_eq!(values[0], 1.0);
    }

    #[test]
    fn warp_releases_displacement_borrows_after_building() {
        let group = ProcGroup::single();
        let displacements = [
            DistVector::scatter(&group, &[0.25; 6]),
            DistVector::scatter(&group, &[-0.25; 6]),
        ];
        let matrix = build_warp_operator(&group, &[2, 3], 2, &displacements).unwrap();
        assert_eq!(matrix.global_shape(), (6, 6));
        for vector in &displacements {
            assert_eq!(vector.active_borrows(), 0);
        }
    }

    #[test]
    fn warp_with_too_few_displacement_vectors_fails_up_front() {
        let group = ProcGroup::single();
        let displacements = [DistVector::scatter(&group, &[0.0; 6])];
        let outcome = build_warp_operator(&group, &[2, 3], 2, &displacements);
        assert!(matches!(
            outcome,
            Err(RegistrationError::Precondition(_))
        ));
        assert_eq!(displacements[0].active_borrows(), 0);
    }
}
