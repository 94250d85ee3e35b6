use std::any::Any;

use crate::constr::{ConstrBase, ConstrType, Constraint};
use crate::walk::Pass;
use crate::{BusVar, GenVar, Network, VarRef};

/// Lower bound of participation factors.
const MIN_Q_PAR: f64 = 1e-8;

/// PV/PQ switching of generator regulated buses.
///
/// Every variable carries a fix flag. For a bus regulated by generators
/// the rows are
///
/// - `v = v_set` if the voltage magnitude is flagged fixed,
/// - `Q_i = Q_lim,i` for every flagged reactive power, at the limit closest
///   to its current value,
/// - `α_j·Q_i − α_i·Q_j = 0` for consecutive pairs of unflagged reactive
///   powers, with α the participation factors.
///
/// Each row lists all the participants of its bus, with zero coefficients
/// for those not involved. A heuristic moves the flags between iterations,
/// so the structure is recomputed after heuristics run.
#[derive(Debug, Default)]
pub struct ConstrPvpqSwitching {
    base: ConstrBase,
    fix_flags: Vec<bool>,
}

impl ConstrPvpqSwitching {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether variable `index` is currently fixed.
    pub fn is_fixed(&self, index: usize) -> bool {
        self.fix_flags.get(index).copied().unwrap_or(false)
    }

    pub fn set_fixed(&mut self, index: usize, fixed: bool) {
        if let Some(flag) = self.fix_flags.get_mut(index) {
            *flag = fixed;
        }
    }

    /// Fixes the voltage magnitude of generator regulated buses and frees
    /// everything else.
    fn reset_flags(&mut self, net: &Network) {
        self.fix_flags = vec![false; net.num_vars()];
        for bus in net.buses().iter().filter(|b| b.is_regulated_by_gen()) {
            for t in 0..net.num_periods() {
                if let Some(i) = bus.var_index(BusVar::VMag, t) {
                    self.fix_flags[i] = true;
                }
            }
        }
    }

    fn walk(&mut self, net: &Network, br: usize, t: usize, pass: Pass) {
        let branch = net.branch(br);
        let base = &mut self.base;
        let fixed = |i: usize| self.fix_flags.get(i).copied().unwrap_or(false);

        for bus_index in [branch.bus_k, branch.bus_m] {
            if !base.bus_counted.mark(bus_index, t) {
                continue;
            }
            let bus = net.bus(bus_index);
            if !bus.is_regulated_by_gen() {
                continue;
            }

            let v_col = bus.var_index(BusVar::VMag, t);
            let q_cols: Vec<(usize, usize)> = bus
                .reg_gens()
                .iter()
                .filter(|&&g| !net.gen(g).is_on_outage())
                .filter_map(|&g| net.var_index(VarRef::Gen(g, GenVar::Q), t).map(|c| (g, c)))
                .collect();

            // participants of a row, with the coefficient of each column
            let mut stamp_row = |coeff: &dyn Fn(usize) -> f64, rhs: f64| {
                let row = base.new_a_row();
                if let Some(v) = v_col {
                    base.stamp_a(&pass, row, v, coeff(v));
                }
                for &(_, q) in &q_cols {
                    base.stamp_a(&pass, row, q, coeff(q));
                }
                base.add_b(&pass, row, rhs);
            };

            if let Some(v) = v_col.filter(|&v| fixed(v)) {
                stamp_row(&|c| if c == v { 1.0 } else { 0.0 }, bus.v_set[t]);
            }

            for &(g, q) in q_cols.iter().filter(|(_, q)| fixed(*q)) {
                let gen = net.gen(g);
                let value = gen.q[t];
                let limit = if (value - gen.q_max).abs() <= (value - gen.q_min).abs() {
                    gen.q_max
                } else {
                    gen.q_min
                };
                stamp_row(&|c| if c == q { 1.0 } else { 0.0 }, limit);
            }

            let free: Vec<(usize, usize)> = q_cols.iter().copied().filter(|(_, q)| !fixed(*q)).collect();
            for pair in free.windows(2) {
                let (g1, q1) = pair[0];
                let (g2, q2) = pair[1];
                let a1 = net.gen(g1).q_par.max(MIN_Q_PAR);
                let a2 = net.gen(g2).q_par.max(MIN_Q_PAR);
                stamp_row(
                    &|c| {
                        if c == q1 {
                            a2
                        } else if c == q2 {
                            -a1
                        } else {
                            0.0
                        }
                    },
                    0.0,
                );
            }
        }
    }
}

impl Constraint for ConstrPvpqSwitching {
    fn constr_type(&self) -> ConstrType {
        ConstrType::PvpqSwitching
    }

    fn base(&self) -> &ConstrBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ConstrBase {
        &mut self.base
    }

    fn init(&mut self, net: &Network) {
        self.reset_flags(net);
    }

    fn clear(&mut self, net: &Network) {
        self.base.clear(net);
        if self.fix_flags.len() != net.num_vars() {
            self.reset_flags(net);
        }
    }

    fn count_step(&mut self, net: &Network, br: usize, t: usize) {
        self.walk(net, br, t, Pass::Count);
    }

    fn analyze_step(&mut self, net: &Network, br: usize, t: usize) {
        self.walk(net, br, t, Pass::Analyze);
    }

    fn has_switching_structure(&self) -> bool {
        true
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

    fn setup() -> (Network, ConstrPvpqSwitching) {
        let mut net = cases::four_bus(1);
        cases::set_all_vars(&mut net);
        let mut c = ConstrPvpqSwitching::new();
        c.init(&net);
        (net, c)
    }

    #[test]
    fn test_initial_flags() {
        let (net, c) = setup();
        let v = net.bus(1).var_index(BusVar::VMag, 0).unwrap();
        let q1 = net.gen(1).var_index(GenVar::Q, 0).unwrap();
        let v3 = net.bus(2).var_index(BusVar::VMag, 0).unwrap();
        assert!(c.is_fixed(v));
        assert!(!c.is_fixed(q1));
        assert!(!c.is_fixed(v3));
        assert!(!c.is_fixed(net.num_vars()));
    }

    #[test]
    fn test_voltage_and_pairing_rows() {
        let (net, mut c) = setup();
        analyze_constr(&mut c, &net);

        let v = net.bus(1).var_index(BusVar::VMag, 0).unwrap();
        let q1 = net.gen(1).var_index(GenVar::Q, 0).unwrap();
        let q2 = net.gen(2).var_index(GenVar::Q, 0).unwrap();

        // slack bus voltage row, then voltage and pairing rows of bus 2
        let counters = c.base().counters();
        assert_eq!(counters.a_row, 3);
        assert_eq!(counters.a_nnz, 2 + 3 + 3);

        let a = c.base().a().to_dense();
        assert_eq!((a[1][v], a[1][q1], a[1][q2]), (1.0, 0.0, 0.0));
        assert_eq!(c.base().b()[1], 1.01);
        assert_eq!((a[2][v], a[2][q1], a[2][q2]), (0.0, 2.0, -1.0));
        assert_eq!(c.base().b()[2], 0.0);
    }

    #[test]
    fn test_fixed_reactive_power() {
        let (mut net, mut c) = setup();
        let q1 = net.gen(1).var_index(GenVar::Q, 0).unwrap();
        net.gen_mut(1).q[0] = 0.39;
        c.set_fixed(q1, true);
        analyze_constr(&mut c, &net);

        let counters = c.base().counters();
        assert_eq!(counters.a_row, 3);
        let a = c.base().a().to_dense();
        assert_eq!(a[2][q1], 1.0);
        assert_eq!(c.base().b()[2], 0.4);
    }

    #[test]
    fn test_flags_follow_num_vars() {
        let (mut net, mut c) = setup();
        let q1 = net.gen(1).var_index(GenVar::Q, 0).unwrap();
        c.set_fixed(q1, true);

        // same variables: flags survive
        c.clear(&net);
        assert!(c.is_fixed(q1));

        net.clear_flags();
        cases::set_pf_vars(&mut net);
        c.clear(&net);
        let v = net.bus(2).var_index(BusVar::VMag, 0).unwrap();
        assert!(!c.is_fixed(v));
        let v = net.bus(1).var_index(BusVar::VMag, 0).unwrap();
        assert!(c.is_fixed(v));
    }
}
