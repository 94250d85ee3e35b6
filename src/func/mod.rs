mod gen_cost;
mod reg_phase;
mod reg_ratio;
mod reg_susc;
mod reg_vang;
mod reg_vmag;
mod slim_vmag;

pub use gen_cost::*;
pub use reg_phase::*;
pub use reg_ratio::*;
pub use reg_susc::*;
pub use reg_vang::*;
pub use reg_vmag::*;
pub use slim_vmag::*;

use std::any::Any;
use std::fmt;
use std::str::FromStr;

use sparsetools::coo::Coo;

use crate::walk::{BusCounted, LocalTerm, Pass};
use crate::{Network, ProblemError};

/// Function type.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum FuncType {
    /// Generation cost.
    GenCost = 0,
    /// Phase shift regularization.
    RegPhase = 1,
    /// Voltage angle regularization.
    RegVang = 2,
    /// Voltage magnitude regularization.
    RegVmag = 3,
    /// Tap ratio regularization.
    RegRatio = 4,
    /// Shunt susceptance regularization.
    RegSusc = 5,
    /// Soft voltage magnitude limits.
    SlimVmag = 6,
}

impl FuncType {
    pub const ALL: [FuncType; 7] = [
        FuncType::GenCost,
        FuncType::RegPhase,
        FuncType::RegVang,
        FuncType::RegVmag,
        FuncType::RegRatio,
        FuncType::RegSusc,
        FuncType::SlimVmag,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FuncType::GenCost => "GEN_COST",
            FuncType::RegPhase => "REG_PHASE",
            FuncType::RegVang => "REG_VANG",
            FuncType::RegVmag => "REG_VMAG",
            FuncType::RegRatio => "REG_RATIO",
            FuncType::RegSusc => "REG_SUSC",
            FuncType::SlimVmag => "SLIM_VMAG",
        }
    }

    pub fn tag(&self) -> i32 {
        *self as i32
    }
}

impl fmt::Display for FuncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl TryFrom<i32> for FuncType {
    type Error = ProblemError;

    fn try_from(tag: i32) -> Result<Self, Self::Error> {
        FuncType::ALL
            .into_iter()
            .find(|f| f.tag() == tag)
            .ok_or_else(|| ProblemError::UnknownFuncType(tag.to_string()))
    }
}

impl FromStr for FuncType {
    type Err = ProblemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FuncType::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProblemError::UnknownFuncType(s.to_string()))
    }
}

/// Creates a function of the given type and weight.
pub fn new_func(func_type: FuncType, weight: f64) -> Box<dyn Function> {
    match func_type {
        FuncType::GenCost => Box::new(FuncGenCost::new(weight)),
        FuncType::RegPhase => Box::new(FuncRegPhase::new(weight)),
        FuncType::RegVang => Box::new(FuncRegVang::new(weight)),
        FuncType::RegVmag => Box::new(FuncRegVmag::new(weight)),
        FuncType::RegRatio => Box::new(FuncRegRatio::new(weight)),
        FuncType::RegSusc => Box::new(FuncRegSusc::new(weight)),
        FuncType::SlimVmag => Box::new(FuncSlimVmag::new(weight)),
    }
}

/// FuncBase holds the weight, the value and the derivatives of a function.
/// The Hessian is stored with both triangles.
#[derive(Clone)]
pub struct FuncBase {
    weight: f64,
    pub(crate) h_nnz: usize,
    pub(crate) phi: f64,
    pub(crate) gphi: Vec<f64>,
    pub(crate) hphi: Coo<usize, f64>,
    pub(crate) bus_counted: BusCounted,
}

impl fmt::Debug for FuncBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuncBase")
            .field("weight", &self.weight)
            .field("phi", &self.phi)
            .field("hphi_nnz", &self.h_nnz)
            .finish_non_exhaustive()
    }
}

impl FuncBase {
    pub fn new(weight: f64) -> Self {
        Self {
            weight,
            h_nnz: 0,
            phi: 0.0,
            gphi: Vec::new(),
            hphi: Coo::with_size(0, 0),
            bus_counted: BusCounted::default(),
        }
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn phi(&self) -> f64 {
        self.phi
    }

    pub fn gphi(&self) -> &[f64] {
        &self.gphi
    }

    pub fn hphi(&self) -> &Coo<usize, f64> {
        &self.hphi
    }

    pub fn hphi_nnz(&self) -> usize {
        self.h_nnz
    }

    /// Resets the counter, the visited buses, the value and the gradient.
    pub fn clear(&mut self, net: &Network) {
        self.h_nnz = 0;
        self.phi = 0.0;
        self.gphi.iter_mut().for_each(|g| *g = 0.0);
        self.bus_counted
            .reset(net.buses().len(), net.num_periods());
    }

    pub fn allocate(&mut self, n: usize) {
        self.gphi = vec![0.0; n];
        self.hphi = Coo::with_capacity(n, n, self.h_nnz);
    }

    /// Adds a term in `N` local variables. Only locals with a column are
    /// variables; the value always enters φ.
    pub(crate) fn stamp_term<const N: usize>(
        &mut self,
        pass: &Pass,
        cols: &[Option<usize>; N],
        term: impl FnOnce() -> LocalTerm<N>,
    ) {
        let vars: Vec<(usize, usize)> = cols
            .iter()
            .enumerate()
            .filter_map(|(p, c)| c.map(|c| (p, c)))
            .collect();

        match pass {
            Pass::Count => self.h_nnz += vars.len() * vars.len(),
            Pass::Analyze => {
                for &(_, ci) in &vars {
                    for &(_, cj) in &vars {
                        self.hphi.push(ci, cj, 0.0);
                        self.h_nnz += 1;
                    }
                }
            }
            Pass::Eval(_) => {
                let term = term();
                self.phi += term.value;
                for &(p, c) in &vars {
                    self.gphi[c] += term.grad[p];
                }
                let data = self.hphi.values_mut();
                for &(pi, _) in &vars {
                    for &(pj, _) in &vars {
                        data[self.h_nnz] = term.hess[pi][pj];
                        self.h_nnz += 1;
                    }
                }
            }
        }
    }

    /// Adds ½s² with s = Σ c_i·z_i + offset. Terms without variables are
    /// skipped.
    pub(crate) fn stamp_quad<const N: usize>(
        &mut self,
        pass: &Pass,
        cols: &[Option<usize>; N],
        coeffs: [f64; N],
        z: [f64; N],
        offset: f64,
    ) {
        if cols.iter().all(Option::is_none) {
            return;
        }
        self.stamp_term(pass, cols, || {
            let s = coeffs.iter().zip(z).map(|(c, z)| c * z).sum::<f64>() + offset;
            let mut term = LocalTerm::zero();
            term.value = 0.5 * s * s;
            for i in 0..N {
                term.grad[i] = coeffs[i] * s;
                for j in 0..N {
                    term.hess[i][j] = coeffs[i] * coeffs[j];
                }
            }
            term
        });
    }
}

/// Function is a weighted objective term.
///
/// Functions follow the constraint lifecycle: counted and analyzed over a
/// network walk, then evaluated at points.
pub trait Function {
    fn func_type(&self) -> FuncType;

    fn name(&self) -> &str {
        self.func_type().name()
    }

    fn base(&self) -> &FuncBase;

    fn base_mut(&mut self) -> &mut FuncBase;

    fn init(&mut self, _net: &Network) {}

    fn clear(&mut self, net: &Network) {
        self.base_mut().clear(net);
    }

    fn count_step(&mut self, net: &Network, br: usize, t: usize);

    fn allocate(&mut self, net: &Network) {
        self.base_mut().allocate(net.num_vars());
    }

    fn analyze_step(&mut self, net: &Network, br: usize, t: usize);

    fn eval_step(&mut self, net: &Network, br: usize, t: usize, x: &[f64]);

    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub(crate) fn analyze_func(f: &mut dyn Function, net: &Network) {
        f.clear(net);
        walk(net, |br, t| f.count_step(net, br, t));
        let counted = f.base().hphi_nnz();
        f.allocate(net);
        f.clear(net);
        walk(net, |br, t| f.analyze_step(net, br, t));
        assert_eq!(counted, f.base().hphi_nnz());
    }

    pub(crate) fn eval_func(f: &mut dyn Function, net: &Network, x: &[f64]) {
        f.clear(net);
        walk(net, |br, t| f.eval_step(net, br, t, x));
    }

    fn walk(net: &Network, mut step: impl FnMut(usize, usize)) {
        for t in 0..net.num_periods() {
            for br in 0..net.branches().len() {
                step(br, t);
            }
        }
    }

    /// Checks the gradient and the Hessian against finite differences.
    pub(crate) fn check_derivatives(f: &mut dyn Function, net: &Network, x: &[f64]) {
        let h = 1e-7;
        eval_func(f, net, x);
        let phi = f.base().phi();
        let grad = f.base().gphi().to_vec();
        let hess = f.base().hphi().to_dense();

        for i in 0..x.len() {
            let mut xp = x.to_vec();
            xp[i] += h;
            eval_func(f, net, &xp);
            let fd = (f.base().phi() - phi) / h;
            assert!((fd - grad[i]).abs() < 1e-4, "{} grad[{}]: {} != {}", f.name(), i, grad[i], fd);
            for j in 0..x.len() {
                let fd = (f.base().gphi()[j] - grad[j]) / h;
                assert!((fd - hess[i][j]).abs() < 1e-4, "{} hess[{}][{}]", f.name(), i, j);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::{cases, VarValues};

    #[test]
    fn test_type_tags_and_names() {
        for f in FuncType::ALL {
            assert_eq!(FuncType::try_from(f.tag()), Ok(f));
            assert_eq!(f.name().parse::<FuncType>(), Ok(f));
            assert_eq!(new_func(f, 1.0).func_type(), f);
        }
        assert!(FuncType::try_from(-1).is_err());
    }

    #[test]
    fn test_all_derivatives() {
        let mut net = cases::four_bus(2);
        cases::set_all_vars(&mut net);
        let mut x = net.get_var_values(VarValues::Current);
        for (i, xi) in x.iter_mut().enumerate() {
            *xi += 0.01 * ((i % 7) as f64) - 0.02;
        }

        for func_type in FuncType::ALL {
            let mut f = new_func(func_type, 1.0);
            analyze_func(f.as_mut(), &net);
            check_derivatives(f.as_mut(), &net, &x);
        }
    }

    #[test]
    fn test_hessians_are_symmetric() {
        let mut net = cases::four_bus(1);
        cases::set_all_vars(&mut net);
        let x = net.get_var_values(VarValues::Current);

        for func_type in FuncType::ALL {
            let mut f = new_func(func_type, 1.0);
            analyze_func(f.as_mut(), &net);
            eval_func(f.as_mut(), &net, &x);
            let h = f.base().hphi().to_dense();
            for i in 0..h.len() {
                for j in 0..i {
                    assert_eq!(h[i][j], h[j][i]);
                }
            }
        }
    }
}
