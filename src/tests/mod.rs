mod scenarios;

use spsolve::rlu::RLU;
use spsolve::Solver;

use crate::*;

/// Runs analyze and eval at the current point.
pub(crate) fn analyzed(p: &mut Problem) -> anyhow::Result<Vec<f64>> {
    p.analyze();
    let x = p.init_point();
    p.eval(&x)?;
    Ok(x)
}

/// Newton step: solves J·dx = f at the last evaluated point with a sparse
/// LU factorization.
pub(crate) fn newton_step(p: &Problem) -> anyhow::Result<Vec<f64>> {
    let jac = p.j().to_csc();
    let mut dx = p.f().to_vec();
    RLU::default().solve(jac.cols(), jac.rowidx(), jac.colptr(), jac.values(), &mut dx, false)?;
    Ok(dx)
}
