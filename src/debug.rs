use pretty_dtoa::{dtoa, FmtFloatConfig};
use sparsetools::coo::Coo;

const FLOAT_CONFIG: FmtFloatConfig = FmtFloatConfig::default()
    .add_point_zero(false)
    .max_significant_digits(9);

pub fn format_f64(f: f64) -> String {
    dtoa(f, FLOAT_CONFIG)
}

pub fn format_f64_vec(v: &[f64]) -> String {
    let a: Vec<String> = v.iter().map(|f| dtoa(*f, FLOAT_CONFIG)).collect();
    format!("[{}]", a.join(", "))
}

/// Formats the entries of a coordinate matrix, one per line.
pub fn format_coo(m: &Coo<usize, f64>) -> String {
    let a: Vec<String> = m
        .iter()
        .map(|(i, j, d)| format!("({}, {}) {}", i, j, dtoa(*d, FLOAT_CONFIG)))
        .collect();
    format!("{}x{} nnz={}\n{}", m.rows(), m.cols(), m.nnz(), a.join("\n"))
}
