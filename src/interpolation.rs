//! Multilinear interpolation weights over grid-corner neighborhoods.

use crate::num::Floating;

/// Handling of corner neighborhoods extending outside the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryPolicy {
    /// Corners falling outside the grid are dropped silently, without
    /// renormalizing the weights of the remaining corners.
    DropOutside,
    /// Coordinates are clamped onto the grid before the neighborhood is
    /// formed, so every stored corner lands inside the grid.
    ClampToEdge,
}

/// Clamps an interpolation coordinate onto the valid range of one dimension.
///
/// Values below zero map to zero and values above `dim_size - 2` map to
/// `dim_size - 1`, so the corner neighborhood of the clamped coordinate never
/// extends past the last grid point.
pub fn clamp_to_edge<F: Floating>(value: F, dim_size: usize) -> F {
    let upper_cutoff = F::from(dim_size as i64 - 2).unwrap();
    if value < F::zero() {
        F::zero()
    } else if value > upper_cutoff {
        upper_cutoff + F::one()
    } else {
        value
    }
}

/// Computes the multilinear weight of a grid corner relative to a coordinate.
///
/// The weight is the product over dimensions of `1 - |coord - corner|`, which
/// lies in `[0, 1]` whenever the corner belongs to the neighborhood enclosing
/// the coordinate, and equals one exactly when the coordinate coincides with
/// the corner in every dimension.
pub fn corner_weight<F: Floating>(coord: &[F], corner: &[i64]) -> F {
    coord
        .iter()
        .zip(corner)
        .fold(F::one(), |weight, (&c, &corner_coord)| {
            weight * (F::one() - num::Float::abs(c - F::from(corner_coord).unwrap()))
        })
}

/// Visits the stored contributions of the `2^ndim` corner neighborhood
/// enclosing the given continuous coordinate.
///
/// Corners are enumerated in fixed bit-mask order: corner `k` is offset by one
/// grid point in dimension `d` exactly when bit `d` of `k` is set. For every
/// corner that survives the boundary policy and has strictly positive weight,
/// the callback receives the corner coordinates and the multilinear weight.
/// Dropped corners are silent; they are expected sparsity decisions, not
/// failures.
///
/// Under [`BoundaryPolicy::ClampToEdge`] the coordinate is clamped onto the
/// grid dimension-wise before the neighborhood is formed; under
/// [`BoundaryPolicy::DropOutside`] the coordinate is used as given and
/// out-of-bounds corners are discarded.
pub fn visit_corner_weights<F, V>(
    coord: &[F],
    shape: &[usize],
    policy: BoundaryPolicy,
    mut visit: V,
) where
    F: Floating,
    V: FnMut(&[i64], F),
{
    let ndim = shape.len();
    assert_eq!(
        coord.len(),
        ndim,
        "Coordinate {:?} does not match dimensionality of shape {:?}",
        coord,
        shape
    );

    let mut mapped = coord.to_vec();
    if policy == BoundaryPolicy::ClampToEdge {
        for (c, &dim_size) in mapped.iter_mut().zip(shape) {
            *c = clamp_to_edge(*c, dim_size);
        }
    }
    let mut corner: Vec<i64> = mapped
        .iter()
        .map(|&c| {
            c.floor()
                .to_i64()
                .expect("Non-finite interpolation coordinate")
        })
        .collect();

    for point in 0..(1_usize << ndim) {
        for dim in 0..ndim {
            if point & (1 << dim) != 0 {
                corner[dim] += 1;
            }
        }
        if corner_is_inside(&corner, shape) {
            let weight = corner_weight(&mapped, &corner);
            if weight > F::zero() {
                visit(&corner, weight);
            }
        }
        for dim in 0..ndim {
            if point & (1 << dim) != 0 {
                corner[dim] -= 1;
            }
        }
    }
}

fn corner_is_inside(corner: &[i64], shape: &[usize]) -> bool {
    corner
        .iter()
        .zip(shape)
        .all(|(&c, &dim_size)| c >= 0 && c < dim_size as i64)
}

#[cfg(test)]
mod tests {

    use super::*;
    use approx::assert_abs_diff_eq;

    fn collected_corners(
        coord: &[f64],
        shape: &[usize],
        policy: BoundaryPolicy,
    ) -> Vec<(Vec<i64>, f64)> {
        let mut corners = Vec::new();
        visit_corner_weights(coord, shape, policy, |corner, weight| {
            corners.push((corner.to_vec(), weight));
        });
        corners
    }

    #[test]
    fn interior_corner_weights_sum_to_one() {
        let corners = collected_corners(&[1.3, 2.7, 0.1], &[4, 5, 3], BoundaryPolicy::DropOutside);
        assert_eq!(corners.len(), 8);
        let total: f64 = corners.iter().map(|(_, weight)| weight).sum();
        assert_abs_diff_eq!(total, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn coordinate_on_grid_point_stores_single_unit_weight() {
        let corners = collected_corners(&[2.0, 1.0], &[4, 4], BoundaryPolicy::DropOutside);
        assert_eq!(corners.len(), 1);
        assert_eq!(corners[0].0, vec![2, 1]);
        assert_abs_diff_eq!(corners[0].1, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn corners_outside_the_grid_are_dropped_without_renormalization() {
        let corners = collected_corners(&[3.5], &[4], BoundaryPolicy::DropOutside);
        assert_eq!(corners.len(), 1);
        assert_eq!(corners[0].0, vec![3]);
        assert_abs_diff_eq!(corners[0].1, 0.5, epsilon = 1e-12);

        let corners = collected_corners(&[-0.5], &[4], BoundaryPolicy::DropOutside);
        assert_eq!(corners.len(), 1);
        assert_eq!(corners[0].0, vec![0]);
        assert_abs_diff_eq!(corners[0].1, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn corners_are_enumerated_in_bit_mask_order() {
        let corners = collected_corners(&[0.25, 0.75], &[3, 3], BoundaryPolicy::DropOutside);
        let order: Vec<_> = corners.iter().map(|(corner, _)| corner.clone()).collect();
        assert_eq!(
            order,
            vec![vec![0, 0], vec![1, 0], vec![0, 1], vec![1, 1]]
        );
    }

    #[test]
    fn clamping_maps_coordinates_onto_the_grid() {
        assert_abs_diff_eq!(clamp_to_edge(-1.5, 5), 0.0);
        assert_abs_diff_eq!(clamp_to_edge(2.5, 5), 2.5);
        assert_abs_diff_eq!(clamp_to_edge(3.2, 5), 4.0);
        assert_abs_diff_eq!(clamp_to_edge(11.0, 5), 4.0);
        assert_abs_diff_eq!(clamp_to_edge(0.5, 1), 0.0);
    }

    #[test]
    fn clamp_to_edge_policy_keeps_every_stored_corner_inside() {
        let corners = collected_corners(&[-2.0, 6.9], &[4, 4], BoundaryPolicy::ClampToEdge);
        for (corner, _) in &corners {
            assert!(corner.iter().zip(&[4_i64, 4]).all(|(&c, &len)| c >= 0 && c < len));
        }
        let total: f64 = corners.iter().map(|(_, weight)| weight).sum();
        assert_abs_diff_eq!(total, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn zero_weight_corners_are_never_stored() {
        let corners = collected_corners(&[1.0, 0.5], &[4, 4], BoundaryPolicy::DropOutside);
        assert_eq!(corners.len(), 2);
        assert!(corners.iter().all(|&(_, weight)| weight > 0.0));
    }
}
