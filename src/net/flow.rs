use crate::walk::LocalTerm;
use crate::Branch;

/// Local variable positions of a branch flow term.
pub const VK: usize = 0;
pub const VM: usize = 1;
pub const WK: usize = 2;
pub const WM: usize = 3;
pub const RATIO: usize = 4;
pub const PHASE: usize = 5;

/// Number of local variables of a branch flow term.
pub const NUM_LOCAL: usize = 6;

/// End of a branch.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Side {
    K,
    M,
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Power {
    Active,
    Reactive,
}

/// Computes the power leaving the branch end `side` and its derivatives.
///
/// `z` holds the local variables (v_k, v_m, θ_k, θ_m, a, φ) in the order
/// given by the position constants. With δ = θ_k − θ_m − φ the flows are
///
///   P_km = a²v_k²(g_k + g) − a v_k v_m (g cos δ + b sin δ)
///   Q_km = −a²v_k²(b_k + b) − a v_k v_m (g sin δ − b cos δ)
///
/// and symmetrically on the `m` side with δ' = −δ and no ratio on the
/// squared term.
pub fn branch_flow(br: &Branch, side: Side, power: Power, z: &[f64; NUM_LOCAL]) -> LocalTerm<NUM_LOCAL> {
    let (vk, vm, a) = (z[VK], z[VM], z[RATIO]);

    // squared voltage term
    let mut dsq = [0.0; NUM_LOCAL];
    let mut d2sq = [[0.0; NUM_LOCAL]; NUM_LOCAL];
    // angle difference coefficients
    let mut dd = [0.0; NUM_LOCAL];

    let (sq, delta) = match side {
        Side::K => {
            dsq[RATIO] = 2.0 * a * vk * vk;
            dsq[VK] = 2.0 * a * a * vk;
            d2sq[RATIO][RATIO] = 2.0 * vk * vk;
            d2sq[VK][VK] = 2.0 * a * a;
            d2sq[RATIO][VK] = 4.0 * a * vk;
            d2sq[VK][RATIO] = 4.0 * a * vk;
            dd[WK] = 1.0;
            dd[WM] = -1.0;
            dd[PHASE] = -1.0;
            (a * a * vk * vk, z[WK] - z[WM] - z[PHASE])
        }
        Side::M => {
            dsq[VM] = 2.0 * vm;
            d2sq[VM][VM] = 2.0;
            dd[WK] = -1.0;
            dd[WM] = 1.0;
            dd[PHASE] = 1.0;
            (vm * vm, z[WM] - z[WK] + z[PHASE])
        }
    };

    let c = match (side, power) {
        (Side::K, Power::Active) => br.g_k + br.g,
        (Side::M, Power::Active) => br.g_m + br.g,
        (Side::K, Power::Reactive) => -(br.b_k + br.b),
        (Side::M, Power::Reactive) => -(br.b_m + br.b),
    };

    let (sin, cos) = delta.sin_cos();
    let (h, hp) = match power {
        Power::Active => (br.g * cos + br.b * sin, -br.g * sin + br.b * cos),
        Power::Reactive => (br.g * sin - br.b * cos, br.g * cos + br.b * sin),
    };

    // product a·v_k·v_m
    let u = a * vk * vm;
    let mut du = [0.0; NUM_LOCAL];
    du[RATIO] = vk * vm;
    du[VK] = a * vm;
    du[VM] = a * vk;
    let mut d2u = [[0.0; NUM_LOCAL]; NUM_LOCAL];
    d2u[RATIO][VK] = vm;
    d2u[VK][RATIO] = vm;
    d2u[RATIO][VM] = vk;
    d2u[VM][RATIO] = vk;
    d2u[VK][VM] = a;
    d2u[VM][VK] = a;

    let mut term = LocalTerm::zero();
    term.value = c * sq - u * h;
    for i in 0..NUM_LOCAL {
        term.grad[i] = c * dsq[i] - h * du[i] - u * hp * dd[i];
        for j in 0..NUM_LOCAL {
            term.hess[i][j] = c * d2sq[i][j] - h * d2u[i][j] - hp * (du[i] * dd[j] + du[j] * dd[i])
                + u * h * dd[i] * dd[j];
        }
    }
    term
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branch() -> Branch {
        let mut br = Branch::new(0, 1, 0.02, 0.1).with_charging(0.04);
        br.g_k = 0.01;
        br.g_m = 0.005;
        br
    }

    #[test]
    fn test_derivatives_match_finite_differences() {
        let br = branch();
        let z = [1.02, 0.97, 0.1, -0.05, 1.03, 0.02];
        let h = 1e-6;

        for side in [Side::K, Side::M] {
            for power in [Power::Active, Power::Reactive] {
                let term = branch_flow(&br, side, power, &z);
                for i in 0..NUM_LOCAL {
                    let mut zp = z;
                    zp[i] += h;
                    let tp = branch_flow(&br, side, power, &zp);

                    let fd = (tp.value - term.value) / h;
                    assert!((fd - term.grad[i]).abs() < 1e-4, "grad {:?} {:?} {}", side, power, i);

                    for j in 0..NUM_LOCAL {
                        let fd = (tp.grad[j] - term.grad[j]) / h;
                        assert!((fd - term.hess[i][j]).abs() < 1e-4, "hess {} {}", i, j);
                    }
                }
            }
        }
    }

    #[test]
    fn test_lossless_flow() {
        let br = Branch::new(0, 1, 0.0, 0.1);
        let z = [1.0, 1.0, 0.1, 0.0, 1.0, 0.0];
        let pk = branch_flow(&br, Side::K, Power::Active, &z);
        let pm = branch_flow(&br, Side::M, Power::Active, &z);
        assert!((pk.value + pm.value).abs() < 1e-12);
        assert!((pk.value - 10.0 * 0.1f64.sin()).abs() < 1e-12);
    }
}
