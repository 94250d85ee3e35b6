mod acpf;
mod fix;
mod lbound;
mod linpf;
mod par_gen;
mod pvpq_switching;
mod reg;

pub use acpf::*;
pub use fix::*;
pub use lbound::*;
pub use linpf::*;
pub use par_gen::*;
pub use pvpq_switching::*;
pub use reg::*;

use std::any::Any;
use std::fmt;
use std::str::FromStr;

use sparsetools::coo::Coo;

use crate::walk::{BusCounted, LocalTerm, Pass};
use crate::{Network, ProblemError};

/// Constraint type.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum ConstrType {
    /// AC power balance.
    Acpf = 0,
    /// Linearized AC power balance.
    Linpf = 1,
    /// Generator participation.
    ParGen = 2,
    /// PV/PQ switching of generator regulated buses.
    PvpqSwitching = 3,
    /// Voltage regulation by generators.
    RegGen = 4,
    /// Voltage regulation by tap changing transformers.
    RegTran = 5,
    /// Voltage regulation by switched shunts.
    RegShunt = 6,
    /// Fixed variables.
    Fix = 7,
    /// Variable bounds.
    Lbound = 8,
}

impl ConstrType {
    pub const ALL: [ConstrType; 9] = [
        ConstrType::Acpf,
        ConstrType::Linpf,
        ConstrType::ParGen,
        ConstrType::PvpqSwitching,
        ConstrType::RegGen,
        ConstrType::RegTran,
        ConstrType::RegShunt,
        ConstrType::Fix,
        ConstrType::Lbound,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ConstrType::Acpf => "ACPF",
            ConstrType::Linpf => "LINPF",
            ConstrType::ParGen => "PAR_GEN",
            ConstrType::PvpqSwitching => "PVPQ_SWITCHING",
            ConstrType::RegGen => "REG_GEN",
            ConstrType::RegTran => "REG_TRAN",
            ConstrType::RegShunt => "REG_SHUNT",
            ConstrType::Fix => "FIX",
            ConstrType::Lbound => "LBOUND",
        }
    }

    /// Integer tag of the type.
    pub fn tag(&self) -> i32 {
        *self as i32
    }
}

impl fmt::Display for ConstrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl TryFrom<i32> for ConstrType {
    type Error = ProblemError;

    fn try_from(tag: i32) -> Result<Self, Self::Error> {
        ConstrType::ALL
            .into_iter()
            .find(|c| c.tag() == tag)
            .ok_or_else(|| ProblemError::UnknownConstrType(tag.to_string()))
    }
}

impl FromStr for ConstrType {
    type Err = ProblemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConstrType::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProblemError::UnknownConstrType(s.to_string()))
    }
}

/// Creates a constraint of the given type.
pub fn new_constr(constr_type: ConstrType) -> Box<dyn Constraint> {
    match constr_type {
        ConstrType::Acpf => Box::new(ConstrAcpf::new()),
        ConstrType::Linpf => Box::new(ConstrLinpf::new()),
        ConstrType::ParGen => Box::new(ConstrParGen::new()),
        ConstrType::PvpqSwitching => Box::new(ConstrPvpqSwitching::new()),
        ConstrType::RegGen => Box::new(ConstrReg::new(RegControl::Gen)),
        ConstrType::RegTran => Box::new(ConstrReg::new(RegControl::Tran)),
        ConstrType::RegShunt => Box::new(ConstrReg::new(RegControl::Shunt)),
        ConstrType::Fix => Box::new(ConstrFix::new()),
        ConstrType::Lbound => Box::new(ConstrLbound::new()),
    }
}

/// Structural tallies of a constraint walk.
#[derive(Debug, Default, PartialEq, Eq, Copy, Clone)]
pub struct Counters {
    pub a_nnz: usize,
    pub a_row: usize,
    pub g_nnz: usize,
    pub g_row: usize,
    pub j_nnz: usize,
    pub j_row: usize,
    pub h_nnz: usize,
}

/// Dual values handed to a constraint, restricted to its own rows.
#[derive(Debug, Clone, Copy)]
pub struct Sens<'a> {
    /// Duals of the linear equality rows.
    pub sa: &'a [f64],
    /// Duals of the nonlinear equality rows.
    pub sf: &'a [f64],
    /// Duals of the inequality upper bounds.
    pub sgu: &'a [f64],
    /// Duals of the inequality lower bounds.
    pub sgl: &'a [f64],
}

/// ConstrBase holds the counters and the matrices of a constraint.
///
/// Rows of the nonlinear residual keep, for every structural entry of the
/// combined Hessian, the residual row it belongs to and its unweighted
/// value, so that `combine_h` can weight them by the multipliers.
/// Hessians are stored with both triangles.
#[derive(Clone)]
pub struct ConstrBase {
    pub(crate) a_nnz: usize,
    pub(crate) a_row: usize,
    pub(crate) g_nnz: usize,
    pub(crate) g_row: usize,
    pub(crate) j_nnz: usize,
    pub(crate) j_row: usize,
    pub(crate) h_nnz: usize,

    pub(crate) a: Coo<usize, f64>,
    pub(crate) b: Vec<f64>,
    pub(crate) g: Coo<usize, f64>,
    pub(crate) l: Vec<f64>,
    pub(crate) u: Vec<f64>,
    pub(crate) j: Coo<usize, f64>,
    pub(crate) f: Vec<f64>,
    pub(crate) h_comb: Coo<usize, f64>,

    h_row: Vec<usize>,
    h_val: Vec<f64>,

    pub(crate) bus_counted: BusCounted,
}

impl Default for ConstrBase {
    fn default() -> Self {
        Self {
            a_nnz: 0,
            a_row: 0,
            g_nnz: 0,
            g_row: 0,
            j_nnz: 0,
            j_row: 0,
            h_nnz: 0,
            a: Coo::with_size(0, 0),
            b: Vec::new(),
            g: Coo::with_size(0, 0),
            l: Vec::new(),
            u: Vec::new(),
            j: Coo::with_size(0, 0),
            f: Vec::new(),
            h_comb: Coo::with_size(0, 0),
            h_row: Vec::new(),
            h_val: Vec::new(),
            bus_counted: BusCounted::default(),
        }
    }
}

impl fmt::Debug for ConstrBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstrBase")
            .field("counters", &self.counters())
            .field("b", &self.b)
            .field("l", &self.l)
            .field("u", &self.u)
            .field("f", &self.f)
            .finish_non_exhaustive()
    }
}

impl ConstrBase {
    pub fn counters(&self) -> Counters {
        Counters {
            a_nnz: self.a_nnz,
            a_row: self.a_row,
            g_nnz: self.g_nnz,
            g_row: self.g_row,
            j_nnz: self.j_nnz,
            j_row: self.j_row,
            h_nnz: self.h_nnz,
        }
    }

    pub fn a(&self) -> &Coo<usize, f64> {
        &self.a
    }

    pub fn b(&self) -> &[f64] {
        &self.b
    }

    pub fn g(&self) -> &Coo<usize, f64> {
        &self.g
    }

    pub fn l(&self) -> &[f64] {
        &self.l
    }

    pub fn u(&self) -> &[f64] {
        &self.u
    }

    pub fn j(&self) -> &Coo<usize, f64> {
        &self.j
    }

    pub fn f(&self) -> &[f64] {
        &self.f
    }

    pub fn h_comb(&self) -> &Coo<usize, f64> {
        &self.h_comb
    }

    /// Resets the counters and the visited buses and zeroes the residual.
    pub fn clear(&mut self, net: &Network) {
        self.a_nnz = 0;
        self.a_row = 0;
        self.g_nnz = 0;
        self.g_row = 0;
        self.j_nnz = 0;
        self.j_row = 0;
        self.h_nnz = 0;
        self.f.iter_mut().for_each(|f| *f = 0.0);
        self.bus_counted
            .reset(net.buses().len(), net.num_periods());
    }

    /// Creates the matrices and vectors sized by the current counters for
    /// `n` variables. The matrices are empty with room for the counted
    /// entries, which the analyze walk pushes in order.
    pub fn allocate(&mut self, n: usize) {
        self.a = Coo::with_capacity(self.a_row, n, self.a_nnz);
        self.b = vec![0.0; self.a_row];
        self.g = Coo::with_capacity(self.g_row, n, self.g_nnz);
        self.l = vec![0.0; self.g_row];
        self.u = vec![0.0; self.g_row];
        self.j = Coo::with_capacity(self.j_row, n, self.j_nnz);
        self.f = vec![0.0; self.j_row];
        self.h_comb = Coo::with_capacity(n, n, self.h_nnz);
        self.h_row = vec![0; self.h_nnz];
        self.h_val = vec![0.0; self.h_nnz];
    }

    pub(crate) fn new_a_row(&mut self) -> usize {
        self.a_row += 1;
        self.a_row - 1
    }

    pub(crate) fn new_g_row(&mut self) -> usize {
        self.g_row += 1;
        self.g_row - 1
    }

    pub(crate) fn new_j_row(&mut self) -> usize {
        self.j_row += 1;
        self.j_row - 1
    }

    /// Adds the coefficient `d` of variable `col` to linear equality `row`.
    pub(crate) fn stamp_a(&mut self, pass: &Pass, row: usize, col: usize, d: f64) {
        if let Pass::Analyze = pass {
            self.a.push(row, col, d);
        }
        self.a_nnz += 1;
    }

    /// Adds `d` to the right-hand side of linear equality `row`.
    pub(crate) fn add_b(&mut self, pass: &Pass, row: usize, d: f64) {
        if let Pass::Analyze = pass {
            self.b[row] += d;
        }
    }

    /// Adds `coeff·z` to the left-hand side of linear equality `row`. A
    /// quantity that is not a variable moves to the right-hand side.
    pub(crate) fn stamp_a_or_b(
        &mut self,
        pass: &Pass,
        row: usize,
        col: Option<usize>,
        coeff: f64,
        z: f64,
    ) {
        match col {
            Some(col) => self.stamp_a(pass, row, col, coeff),
            None => self.add_b(pass, row, -coeff * z),
        }
    }

    pub(crate) fn stamp_g(&mut self, pass: &Pass, row: usize, col: usize, d: f64) {
        if let Pass::Analyze = pass {
            self.g.push(row, col, d);
        }
        self.g_nnz += 1;
    }

    pub(crate) fn set_bounds(&mut self, pass: &Pass, row: usize, l: f64, u: f64) {
        if let Pass::Analyze = pass {
            self.l[row] = l;
            self.u[row] = u;
        }
    }

    /// Adds the linear term `coeff·z` to residual `row`. The Jacobian entry
    /// exists only if `z` is a variable.
    pub(crate) fn stamp_linear(
        &mut self,
        pass: &Pass,
        row: usize,
        col: Option<usize>,
        coeff: f64,
        z: f64,
    ) {
        if let Pass::Eval(_) = pass {
            self.f[row] += coeff * z;
        }
        if let Some(col) = col {
            match pass {
                Pass::Count => {}
                Pass::Analyze => self.j.push(row, col, coeff),
                Pass::Eval(_) => self.j.values_mut()[self.j_nnz] = coeff,
            }
            self.j_nnz += 1;
        }
    }

    /// Adds a nonlinear term in `N` local variables to residual `row`.
    ///
    /// Only locals with a column are variables. The term is evaluated only
    /// in the evaluation pass; its value always enters the residual.
    pub(crate) fn stamp_term<const N: usize>(
        &mut self,
        pass: &Pass,
        row: usize,
        cols: &[Option<usize>; N],
        term: impl FnOnce() -> LocalTerm<N>,
    ) {
        let vars: Vec<(usize, usize)> = cols
            .iter()
            .enumerate()
            .filter_map(|(p, c)| c.map(|c| (p, c)))
            .collect();

        match pass {
            Pass::Count => {
                self.j_nnz += vars.len();
                self.h_nnz += vars.len() * vars.len();
            }
            Pass::Analyze => {
                for &(_, c) in &vars {
                    self.j.push(row, c, 0.0);
                    self.j_nnz += 1;
                }
                for &(_, ci) in &vars {
                    for &(_, cj) in &vars {
                        self.h_comb.push(ci, cj, 0.0);
                        self.h_row[self.h_nnz] = row;
                        self.h_nnz += 1;
                    }
                }
            }
            Pass::Eval(_) => {
                let term = term();
                self.f[row] += term.value;
                for &(p, _) in &vars {
                    self.j.values_mut()[self.j_nnz] = term.grad[p];
                    self.j_nnz += 1;
                }
                for &(pi, _) in &vars {
                    for &(pj, _) in &vars {
                        self.h_val[self.h_nnz] = term.hess[pi][pj];
                        self.h_nnz += 1;
                    }
                }
            }
        }
    }

    /// Computes H_comb = Σ λ_j ∇²f_j from the stored second derivatives.
    pub fn combine_h(&mut self, lambda: &[f64], ensure_psd: bool) {
        assert_eq!(lambda.len(), self.f.len());

        let data = self.h_comb.values_mut();
        for (k, d) in data.iter_mut().enumerate() {
            *d = lambda[self.h_row[k]] * self.h_val[k];
        }
        if ensure_psd {
            self.shift_diagonal();
        }
    }

    /// Raises diagonal entries until the combined Hessian is diagonally
    /// dominant, hence positive semidefinite.
    fn shift_diagonal(&mut self) {
        let n = self.h_comb.cols();
        let mut diag = vec![0.0; n];
        let mut off = vec![0.0; n];
        let mut first: Vec<Option<usize>> = vec![None; n];

        for (k, (&i, &j, &d)) in self.h_comb.iter().enumerate() {
            if i == j {
                diag[i] += d;
                first[i].get_or_insert(k);
            } else {
                off[i] += d.abs();
            }
        }
        let data = self.h_comb.values_mut();
        for i in 0..n {
            if let Some(k) = first[i] {
                let shift = off[i] - diag[i];
                if shift > 0.0 {
                    data[k] += shift;
                }
            }
        }
    }
}

/// Constraint is a component contributing rows to a problem.
///
/// A network walk visits every branch at every period; each step
/// contributes the rows owned by the branch and by the endpoint buses not
/// visited before in the same walk. The count, analyze and eval walks must
/// produce identical counters.
pub trait Constraint {
    fn constr_type(&self) -> ConstrType;

    fn name(&self) -> &str {
        self.constr_type().name()
    }

    fn base(&self) -> &ConstrBase;

    fn base_mut(&mut self) -> &mut ConstrBase;

    /// Called once when the constraint is added to a problem.
    fn init(&mut self, _net: &Network) {}

    fn clear(&mut self, net: &Network) {
        self.base_mut().clear(net);
    }

    fn count_step(&mut self, net: &Network, br: usize, t: usize);

    fn allocate(&mut self, net: &Network) {
        self.base_mut().allocate(net.num_vars());
    }

    fn analyze_step(&mut self, net: &Network, br: usize, t: usize);

    fn eval_step(&mut self, _net: &Network, _br: usize, _t: usize, _x: &[f64]) {}

    fn store_sens_step(&mut self, _net: &mut Network, _br: usize, _t: usize, _sens: &Sens) {}

    fn combine_h(&mut self, lambda: &[f64], ensure_psd: bool) {
        self.base_mut().combine_h(lambda, ensure_psd);
    }

    /// True if the linear structure depends on state changed by heuristics.
    fn has_switching_structure(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Runs the count and analyze walks of a single constraint over the whole
/// network.
pub(crate) fn analyze_constr(c: &mut dyn Constraint, net: &Network) {
    let nt = net.num_periods();
    let nbr = net.branches().len();

    c.clear(net);
    for t in 0..nt {
        for br in 0..nbr {
            c.count_step(net, br, t);
        }
    }
    let counted = c.base().counters();
    c.allocate(net);
    c.clear(net);
    for t in 0..nt {
        for br in 0..nbr {
            c.analyze_step(net, br, t);
        }
    }
    assert_eq!(
        counted,
        c.base().counters(),
        "{} count and analyze walks differ",
        c.name()
    );
}
