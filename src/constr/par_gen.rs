use std::any::Any;

use crate::constr::{ConstrBase, ConstrType, Constraint};
use crate::net::MIN_Q_RANGE;
use crate::walk::Pass;
use crate::{GenVar, Network, VarRef};

/// Generator participation.
///
/// In-service generators at a slack bus share active power equally:
/// P_1 − P_i = 0 for every other generator i. Generators regulating the
/// voltage of a bus sit at the same relative position inside their
/// reactive ranges:
///
///   (Q_1 − Q_min,1)/ΔQ_1 − (Q_i − Q_min,i)/ΔQ_i = 0.
///
/// A quantity that is not a variable contributes to the right-hand side.
#[derive(Debug, Default)]
pub struct ConstrParGen {
    base: ConstrBase,
}

impl ConstrParGen {
    pub fn new() -> Self {
        Self::default()
    }

    fn walk(&mut self, net: &Network, br: usize, t: usize, pass: Pass) {
        let branch = net.branch(br);
        let base = &mut self.base;

        for bus_index in [branch.bus_k, branch.bus_m] {
            if !base.bus_counted.mark(bus_index, t) {
                continue;
            }
            let bus = net.bus(bus_index);

            if bus.is_slack() {
                let gens: Vec<usize> = bus
                    .gens()
                    .iter()
                    .copied()
                    .filter(|&g| !net.gen(g).is_on_outage())
                    .collect();
                if let Some((&first, others)) = gens.split_first() {
                    let p1 = VarRef::Gen(first, GenVar::P);
                    for &g in others {
                        let p = VarRef::Gen(g, GenVar::P);
                        let row = base.new_a_row();
                        base.stamp_a_or_b(&pass, row, net.var_index(p1, t), 1.0, net.value(p1, t));
                        base.stamp_a_or_b(&pass, row, net.var_index(p, t), -1.0, net.value(p, t));
                    }
                }
            }

            if bus.is_regulated_by_gen() {
                let gens: Vec<usize> = bus
                    .reg_gens()
                    .iter()
                    .copied()
                    .filter(|&g| !net.gen(g).is_on_outage())
                    .collect();
                if let Some((&first, others)) = gens.split_first() {
                    let gen1 = net.gen(first);
                    let dq1 = (gen1.q_max - gen1.q_min).max(MIN_Q_RANGE);
                    let q1 = VarRef::Gen(first, GenVar::Q);
                    for &g in others {
                        let gen = net.gen(g);
                        let dq = (gen.q_max - gen.q_min).max(MIN_Q_RANGE);
                        let q = VarRef::Gen(g, GenVar::Q);

                        let row = base.new_a_row();
                        base.add_b(&pass, row, gen1.q_min / dq1 - gen.q_min / dq);
                        base.stamp_a_or_b(&pass, row, net.var_index(q1, t), 1.0 / dq1, net.value(q1, t));
                        base.stamp_a_or_b(&pass, row, net.var_index(q, t), -1.0 / dq, net.value(q, t));
                    }
                }
            }
        }
    }
}

impl Constraint for ConstrParGen {
    fn constr_type(&self) -> ConstrType {
        ConstrType::ParGen
    }

    fn base(&self) -> &ConstrBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ConstrBase {
        &mut self.base
    }

    fn count_step(&mut self, net: &Network, br: usize, t: usize) {
        self.walk(net, br, t, Pass::Count);
    }

    fn analyze_step(&mut self, net: &Network, br: usize, t: usize) {
        self.walk(net, br, t, Pass::Analyze);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
