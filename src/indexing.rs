//! Conversion between flat indices and n-dimensional grid coordinates.

/// Returns the first `ndim` entries of the given shape sequence.
///
/// # Panics
///
/// If the shape has fewer than `ndim` entries.
pub fn truncated(shape: &[usize], ndim: usize) -> &[usize] {
    assert!(
        shape.len() >= ndim,
        "Shape {:?} has fewer than {} dimensions",
        shape,
        ndim
    );
    &shape[..ndim]
}

/// Computes the total number of grid points in the given shape.
pub fn grid_size(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Decomposes a flat index into per-dimension coordinates for the given shape.
///
/// Uses row-major ordering, with the last dimension varying fastest.
pub fn unravel(flat: usize, shape: &[usize]) -> Vec<usize> {
    let mut coord = vec![0; shape.len()];
    let mut remainder = flat;
    for (c, &len) in coord.iter_mut().zip(shape).rev() {
        *c = remainder % len;
        remainder /= len;
    }
    coord
}

/// Computes the flat row-major index of the given coordinates.
///
/// Inverse of [`unravel`] for every flat index within the shape. Callers are
/// responsible for bounds-checking coordinates before calling.
///
/// # Panics
///
/// If the coordinate dimensionality does not match the shape, or any
/// coordinate lies outside the shape bounds.
pub fn ravel(coord: &[usize], shape: &[usize]) -> usize {
    assert_eq!(
        coord.len(),
        shape.len(),
        "Coordinate {:?} does not match dimensionality of shape {:?}",
        coord,
        shape
    );
    let mut flat = 0;
    for (&c, &len) in coord.iter().zip(shape) {
        assert!(
            c < len,
            "Coordinate {:?} lies outside shape {:?}",
            coord,
            shape
        );
        flat = flat * len + c;
    }
    flat
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn ravel_inverts_unravel_for_all_indices() {
        for shape in [vec![1], vec![7], vec![3, 4], vec![2, 5, 3], vec![4, 1, 2, 3]] {
            for flat in 0..grid_size(&shape) {
                assert_eq!(ravel(&unravel(flat, &shape), &shape), flat);
            }
        }
    }

    #[test]
    fn unravel_uses_row_major_ordering() {
        assert_eq!(unravel(0, &[2, 3]), vec![0, 0]);
        assert_eq!(unravel(1, &[2, 3]), vec![0, 1]);
        assert_eq!(unravel(3, &[2, 3]), vec![1, 0]);
        assert_eq!(unravel(5, &[2, 3]), vec![1, 2]);
    }

    #[test]
    fn truncation_keeps_leading_dimensions() {
        assert_eq!(truncated(&[4, 5, 6], 2), &[4, 5]);
        assert_eq!(truncated(&[4, 5, 6], 3), &[4, 5, 6]);
    }

    #[test]
    #[should_panic(expected = "fewer than")]
    fn truncation_to_more_dimensions_than_available_panics() {
        truncated(&[4, 5], 3);
    }

    #[test]
    #[should_panic(expected = "outside shape")]
    fn ravel_of_out_of_bounds_coordinate_panics() {
        ravel(&[0, 3], &[2, 3]);
    }
}
