//! Real-space evaluation of quantities stored as cosine series over the
//! density G vectors.
//!
//! Every density and potential in this library is even under G → -G, so
//! f(r) = Σ_G f(G) cos(G·r) and the coefficients come back from a plain average
//! against cos(G·r) over the grid.

use super::basis::{miller_vector, PlaneWaveBasis};
use nalgebra::Vector3;
use rayon::prelude::*;
use std::f64::consts::PI;

/// Uniform grid points of the unit cell, in fractional coordinates.
pub fn grid_points(basis: &PlaneWaveBasis) -> Vec<Vector3<f64>> {
    let [n0, n1, n2] = basis.grid_size();
    let mut points = Vec::with_capacity(n0 * n1 * n2);
    for i in 0..n0 {
        for j in 0..n1 {
            for k in 0..n2 {
                points.push(Vector3::new(
                    i as f64 / n0 as f64,
                    j as f64 / n1 as f64,
                    k as f64 / n2 as f64,
                ));
            }
        }
    }
    points
}

pub fn to_real_space(basis: &PlaneWaveBasis, points: &[Vector3<f64>], coefficients: &[f64]) -> Vec<f64> {
    let gvectors: Vec<Vector3<f64>> = basis.density_gvectors().iter().map(miller_vector).collect();
    points
        .par_iter()
        .map(|r| {
            gvectors
                .iter()
                .zip(coefficients)
                .map(|(m, c)| c * (2.0 * PI * m.dot(r)).cos())
                .sum()
        })
        .collect()
}

pub fn to_fourier(basis: &PlaneWaveBasis, points: &[Vector3<f64>], values: &[f64]) -> Vec<f64> {
    let n = points.len() as f64;
    basis
        .density_gvectors()
        .par_iter()
        .map(|m| {
            let m = miller_vector(m);
            points
                .iter()
                .zip(values)
                .map(|(r, v)| v * (2.0 * PI * m.dot(r)).cos())
                .sum::<f64>()
                / n
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pw::basis::tests::helium_basis;

    #[test]
    fn transforms_invert_each_other_on_even_series() {
        let basis = helium_basis(1.0);
        let points = grid_points(&basis);
        let coefficients: Vec<f64> = basis
            .density_gvectors()
            .iter()
            .map(|m| {
                let g = basis.gvector(m).norm_squared();
                (-0.3 * g).exp()
            })
            .collect();

        let values = to_real_space(&basis, &points, &coefficients);
        let back = to_fourier(&basis, &points, &values);
        for (a, b) in coefficients.iter().zip(&back) {
            assert!((a - b).abs() < 1e-10, "{a} vs {b}");
        }
    }

    #[test]
    fn constant_series_is_flat() {
        let basis = helium_basis(1.0);
        let points = grid_points(&basis);
        let mut coefficients = vec![0.0; basis.density_gvectors().len()];
        coefficients[0] = 0.25;
        let values = to_real_space(&basis, &points, &coefficients);
        assert!(values.iter().all(|v| (v - 0.25).abs() < 1e-12));
    }
}
