use sparsetools::coo::Coo;

/// Appends the entries of `m` to `acc` with rows shifted by `offset`.
pub(crate) fn extend_shifted(acc: &mut Coo<usize, f64>, m: &Coo<usize, f64>, offset: usize) {
    let rowidx: Vec<usize> = m.rowidx().iter().map(|i| i + offset).collect();
    acc.extend(&rowidx, m.colidx(), m.values());
}

/// Computes a -= b in place.
pub fn sub_inplace(a: &mut [f64], b: &[f64]) {
    assert_eq!(a.len(), b.len());
    a.iter_mut().zip(b).for_each(|(a, b)| *a -= b);
}

/// Largest absolute value of a vector, zero when empty.
pub fn norm_inf(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |m: f64, x| m.max(x.abs()))
}
