use std::any::Any;

use crate::constr::{ConstrAcpf, ConstrBase, ConstrType, Constraint, Sens};
use crate::{Network, VarValues};

/// Power balance linearized at the current network state.
///
/// The rows are those of [`ConstrAcpf`] as linear equalities
/// `J(x0)·x = J(x0)·x0 − f(x0)`, where `x0` holds the variable values
/// stored in the network when the problem is analyzed.
#[derive(Debug, Default)]
pub struct ConstrLinpf {
    base: ConstrBase,
    acpf: ConstrAcpf,
}

impl ConstrLinpf {
    pub fn new() -> Self {
        Self::default()
    }

    fn sync_counters(&mut self) {
        let inner = self.acpf.base();
        self.base.a_nnz = inner.j_nnz;
        self.base.a_row = inner.j_row;
    }

    /// Evaluates the inner power balance at the network point and copies
    /// its Jacobian into A.
    fn linearize(&mut self, net: &Network) {
        let x0 = net.get_var_values(VarValues::Current);

        self.acpf.clear(net);
        for t in 0..net.num_periods() {
            for br in 0..net.branches().len() {
                self.acpf.eval_step(net, br, t, &x0);
            }
        }

        let inner = self.acpf.base();
        self.base.a = inner.j().clone();
        let jx = &inner.j().to_csr() * &x0;
        for (b, (jx, f)) in self.base.b.iter_mut().zip(jx.iter().zip(inner.f())) {
            *b = jx - f;
        }
        log::debug!(
            "linearized power balance: {} rows, {} nonzeros",
            self.base.a_row,
            self.base.a_nnz
        );
    }
}

impl Constraint for ConstrLinpf {
    fn constr_type(&self) -> ConstrType {
        ConstrType::Linpf
    }

    fn base(&self) -> &ConstrBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ConstrBase {
        &mut self.base
    }

    fn clear(&mut self, net: &Network) {
        self.base.clear(net);
        self.acpf.clear(net);
    }

    fn count_step(&mut self, net: &Network, br: usize, t: usize) {
        self.acpf.count_step(net, br, t);
        self.sync_counters();
    }

    fn allocate(&mut self, net: &Network) {
        self.acpf.allocate(net);
        self.base.allocate(net.num_vars());
    }

    fn analyze_step(&mut self, net: &Network, br: usize, t: usize) {
        self.acpf.analyze_step(net, br, t);
        self.sync_counters();

        if t + 1 == net.num_periods() && br + 1 == net.branches().len() {
            self.linearize(net);
        }
    }

    fn store_sens_step(&mut self, net: &mut Network, br: usize, t: usize, sens: &Sens) {
        let branch = net.branch(br);
        for bus_index in [branch.bus_k, branch.bus_m] {
            if !self.base.bus_counted.mark(bus_index, t) {
                continue;
            }
            let row = self.base.new_a_row();
            self.base.new_a_row();

            let bus = net.bus_mut(bus_index);
            bus.sens_p_balance[t] = sens.sa[row];
            bus.sens_q_balance[t] = sens.sa[row + 1];
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases;
    use crate::constr::analyze_constr;

    #[test]
    fn test_linearization_reproduces_residual() {
        let mut net = cases::three_bus(2);
        cases::set_pf_vars(&mut net);
        let x0 = net.get_var_values(VarValues::Current);

        let mut c = ConstrLinpf::new();
        analyze_constr(&mut c, &net);
        let mut acpf = ConstrAcpf::new();
        analyze_constr(&mut acpf, &net);
        acpf.clear(&net);
        for t in 0..2 {
            for br in 0..net.branches().len() {
                acpf.eval_step(&net, br, t, &x0);
            }
        }

        let counters = c.base().counters();
        assert_eq!(counters.a_row, 2 * 3 * 2);
        assert_eq!(counters.a_nnz, acpf.base().counters().j_nnz);
        assert_eq!(counters.j_row, 0);
        assert_eq!(c.base().a().to_dense(), acpf.base().j().to_dense());

        // A·x0 − b = f(x0)
        let ax = &c.base().a().to_csr() * &x0;
        for (i, f) in acpf.base().f().iter().enumerate() {
            assert!((ax[i] - c.base().b()[i] - f).abs() < 1e-10);
        }
    }
}
