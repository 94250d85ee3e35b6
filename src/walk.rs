use crate::net::var::Quantity;
use crate::{BranchVar, BusVar, GenVar, LoadVar, Network, ShuntVar, VarRef};

/// Mode of a network walk. Counting, analysis and evaluation share one
/// traversal so that they visit entries in identical order.
#[derive(Debug, Clone, Copy)]
pub enum Pass<'x> {
    /// Tally structural entries.
    Count,
    /// Write structural positions and constant coefficients.
    Analyze,
    /// Write values at the given point.
    Eval(&'x [f64]),
}

impl<'x> Pass<'x> {
    pub fn point(&self) -> Option<&'x [f64]> {
        match self {
            Pass::Eval(x) => Some(x),
            _ => None,
        }
    }
}

/// BusCounted records which (bus, period) pairs were already visited
/// during a walk, so that buses shared by several branches contribute once.
#[derive(Debug, Default, Clone)]
pub struct BusCounted {
    counted: Vec<bool>,
    num_periods: usize,
}

impl BusCounted {
    pub fn reset(&mut self, num_buses: usize, num_periods: usize) {
        self.num_periods = num_periods;
        self.counted.clear();
        self.counted.resize(num_buses * num_periods, false);
    }

    /// Marks the bus at period `t` and returns true if it was not marked.
    pub fn mark(&mut self, bus: usize, t: usize) -> bool {
        let i = bus * self.num_periods + t;
        !std::mem::replace(&mut self.counted[i], true)
    }
}

/// Value, gradient and Hessian of a scalar term in `N` local variables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalTerm<const N: usize> {
    pub value: f64,
    pub grad: [f64; N],
    pub hess: [[f64; N]; N],
}

impl<const N: usize> LocalTerm<N> {
    pub fn zero() -> Self {
        Self {
            value: 0.0,
            grad: [0.0; N],
            hess: [[0.0; N]; N],
        }
    }

    pub fn neg(mut self) -> Self {
        self.value = -self.value;
        self.grad.iter_mut().for_each(|g| *g = -*g);
        self.hess
            .iter_mut()
            .for_each(|row| row.iter_mut().for_each(|h| *h = -*h));
        self
    }
}

/// Lists the quantities handled at step (`br`, `t`): those of the branch,
/// then for each endpoint bus not yet visited those of the bus and of its
/// generators, loads and shunts.
pub(crate) fn step_quantities(
    net: &Network,
    br: usize,
    t: usize,
    counted: &mut BusCounted,
) -> Vec<VarRef> {
    let branch = net.branch(br);
    let mut vars: Vec<VarRef> = BranchVar::ALL
        .iter()
        .map(|&v| VarRef::Branch(br, v))
        .collect();

    for bus_index in [branch.bus_k, branch.bus_m] {
        if !counted.mark(bus_index, t) {
            continue;
        }
        let bus = net.bus(bus_index);
        vars.extend(BusVar::ALL.iter().map(|&v| VarRef::Bus(bus_index, v)));
        for &g in bus.gens() {
            vars.extend(GenVar::ALL.iter().map(|&v| VarRef::Gen(g, v)));
        }
        for &l in bus.loads() {
            vars.extend(LoadVar::ALL.iter().map(|&v| VarRef::Load(l, v)));
        }
        for &s in bus.shunts() {
            vars.extend(ShuntVar::ALL.iter().map(|&v| VarRef::Shunt(s, v)));
        }
    }
    vars
}
