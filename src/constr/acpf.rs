use std::any::Any;

use crate::constr::{ConstrBase, ConstrType, Constraint, Sens};
use crate::walk::{LocalTerm, Pass};
use crate::{branch_flow, BusVar, GenVar, LoadVar, Network, Power, ShuntVar, Side, VarRef};

/// AC power balance.
///
/// Every visited bus contributes two residual rows, active then reactive
/// power: generation − load − shunt consumption − power leaving through
/// in-service branches.
#[derive(Debug, Default)]
pub struct ConstrAcpf {
    base: ConstrBase,

    // active power row of each (bus, period); the reactive row follows it
    bus_rows: Vec<Option<usize>>,
}

impl ConstrAcpf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Row of the active power balance of bus `bus` at period `t`.
    pub fn bus_row(&self, net: &Network, bus: usize, t: usize) -> Option<usize> {
        self.bus_rows
            .get(bus * net.num_periods() + t)
            .copied()
            .flatten()
    }

    fn walk(&mut self, net: &Network, br: usize, t: usize, pass: Pass) {
        let nt = net.num_periods();
        let x = pass.point();
        let branch = net.branch(br);
        let base = &mut self.base;

        for bus_index in [branch.bus_k, branch.bus_m] {
            if !base.bus_counted.mark(bus_index, t) {
                continue;
            }
            let p_row = base.new_j_row();
            let q_row = base.new_j_row();
            self.bus_rows[bus_index * nt + t] = Some(p_row);

            let bus = net.bus(bus_index);
            for &g in bus.gens() {
                if net.gen(g).is_on_outage() {
                    continue;
                }
                for (var, row) in [(GenVar::P, p_row), (GenVar::Q, q_row)] {
                    let var = VarRef::Gen(g, var);
                    base.stamp_linear(&pass, row, net.var_index(var, t), 1.0, net.value_at(var, t, x));
                }
            }
            for &l in bus.loads() {
                for (var, row) in [(LoadVar::P, p_row), (LoadVar::Q, q_row)] {
                    let var = VarRef::Load(l, var);
                    base.stamp_linear(&pass, row, net.var_index(var, t), -1.0, net.value_at(var, t, x));
                }
            }
            for &s in bus.shunts() {
                let v_var = VarRef::Bus(bus_index, BusVar::VMag);
                let b_var = VarRef::Shunt(s, ShuntVar::Susc);
                let cols = [net.var_index(v_var, t), net.var_index(b_var, t)];
                let v = net.value_at(v_var, t, x);
                let b = net.value_at(b_var, t, x);
                let g = net.shunt(s).g;

                base.stamp_term(&pass, p_row, &[cols[0]], || LocalTerm {
                    value: -g * v * v,
                    grad: [-2.0 * g * v],
                    hess: [[-2.0 * g]],
                });
                base.stamp_term(&pass, q_row, &cols, || LocalTerm {
                    value: b * v * v,
                    grad: [2.0 * b * v, v * v],
                    hess: [[2.0 * b, 2.0 * v], [2.0 * v, 0.0]],
                });
            }
        }

        if branch.is_on_outage() {
            return;
        }
        let cols = net.flow_cols(br, t);
        let z = net.flow_point(br, t, x);
        for (side, bus_index) in [(Side::K, branch.bus_k), (Side::M, branch.bus_m)] {
            let Some(p_row) = self.bus_rows[bus_index * nt + t] else {
                continue;
            };
            for (power, row) in [(Power::Active, p_row), (Power::Reactive, p_row + 1)] {
                base.stamp_term(&pass, row, &cols, || {
                    branch_flow(branch, side, power, &z).neg()
                });
            }
        }
    }
}

impl Constraint for ConstrAcpf {
    fn constr_type(&self) -> ConstrType {
        ConstrType::Acpf
    }

    fn base(&self) -> &ConstrBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ConstrBase {
        &mut self.base
    }

    fn clear(&mut self, net: &Network) {
        self.base.clear(net);
        self.bus_rows.clear();
        self.bus_rows
            .resize(net.buses().len() * net.num_periods(), None);
    }

    fn count_step(&mut self, net: &Network, br: usize, t: usize) {
        self.walk(net, br, t, Pass::Count);
    }

    fn analyze_step(&mut self, net: &Network, br: usize, t: usize) {
        self.walk(net, br, t, Pass::Analyze);
    }

    fn eval_step(&mut self, net: &Network, br: usize, t: usize, x: &[f64]) {
        self.walk(net, br, t, Pass::Eval(x));
    }

    fn store_sens_step(&mut self, net: &mut Network, br: usize, t: usize, sens: &Sens) {
        let branch = net.branch(br);
        for bus_index in [branch.bus_k, branch.bus_m] {
            if !self.base.bus_counted.mark(bus_index, t) {
                continue;
            }
            let row = self.base.new_j_row();
            self.base.new_j_row();

            let bus = net.bus_mut(bus_index);
            bus.sens_p_balance[t] = sens.sf[row];
            bus.sens_q_balance[t] = sens.sf[row + 1];
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
    use crate::constr::analyze_constr;
    use crate::{cases, VarValues};

    #[test]
    fn test_two_bus_structure() {
        let mut net = cases::two_bus();
        cases::set_pf_vars(&mut net);
        let mut c = ConstrAcpf::new();
        analyze_constr(&mut c, &net);

        let counters = c.base().counters();
        assert_eq!(counters.j_row, 4);
        // gen P and Q, then 4 flow terms over v1 and θ1
        assert_eq!(counters.j_nnz, 2 + 4 * 2);
        assert_eq!(counters.h_nnz, 4 * 4);
        assert_eq!(c.bus_row(&net, 0, 0), Some(0));
        assert_eq!(c.bus_row(&net, 1, 0), Some(2));
    }

    #[test]
    fn test_jacobian_matches_finite_differences() {
        let mut j_nnz = Vec::new();
        for outage in [false, true] {
            let mut net = cases::four_bus(1);
            cases::set_all_vars(&mut net);
            net.branch_mut(3).outage = outage;
            let n = net.num_vars();
            let mut c = ConstrAcpf::new();
            analyze_constr(&mut c, &net);
            j_nnz.push(c.base().counters().j_nnz);

            let eval = |c: &mut ConstrAcpf, x: &[f64]| {
                c.clear(&net);
                for br in 0..net.branches().len() {
                    c.eval_step(&net, br, 0, x);
                }
                c.base().f().to_vec()
            };

            let mut x = net.get_var_values(VarValues::Current);
            for (i, xi) in x.iter_mut().enumerate() {
                *xi += 0.01 * (i % 5) as f64;
            }
            let f0 = eval(&mut c, &x);
            let jac = c.base().j().to_dense();

            let h = 1e-7;
            for col in 0..n {
                let mut xp = x.clone();
                xp[col] += h;
                let fp = eval(&mut c, &xp);
                for row in 0..f0.len() {
                    let fd = (fp[row] - f0[row]) / h;
                    assert!(
                        (fd - jac[row][col]).abs() < 1e-4,
                        "outage {} J[{}][{}]: {} != {}",
                        outage,
                        row,
                        col,
                        jac[row][col],
                        fd
                    );
                }
            }
        }
        // the flows of the outaged branch are left out
        assert!(j_nnz[1] < j_nnz[0]);
    }
}
