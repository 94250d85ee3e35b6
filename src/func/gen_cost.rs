use std::any::Any;

use crate::func::{FuncBase, FuncType, Function};
use crate::walk::{LocalTerm, Pass};
use crate::{GenVar, Network, VarRef};

/// Generation cost Σ (Q0 + Q1·P + Q2·P²) of the in-service generators,
/// in $/hr.
#[derive(Debug)]
pub struct FuncGenCost {
    base: FuncBase,
}

impl FuncGenCost {
    pub fn new(weight: f64) -> Self {
        Self {
            base: FuncBase::new(weight),
        }
    }

    fn walk(&mut self, net: &Network, br: usize, t: usize, pass: Pass) {
        let x = pass.point();
        let branch = net.branch(br);
        let base = &mut self.base;

        for bus_index in [branch.bus_k, branch.bus_m] {
            if !base.bus_counted.mark(bus_index, t) {
                continue;
            }
            for &g in net.bus(bus_index).gens() {
                let gen = net.gen(g);
                if gen.is_on_outage() {
                    continue;
                }
                let var = VarRef::Gen(g, GenVar::P);
                let p = net.value_at(var, t, x);
                base.stamp_term(&pass, &[net.var_index(var, t)], || LocalTerm {
                    value: gen.cost(p),
                    grad: [gen.cost_coeff_q1 + 2.0 * gen.cost_coeff_q2 * p],
                    hess: [[2.0 * gen.cost_coeff_q2]],
                });
            }
        }
    }
}

impl Function for FuncGenCost {
    fn func_type(&self) -> FuncType {
        FuncType::GenCost
    }

    fn base(&self) -> &FuncBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut FuncBase {
        &mut self.base
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

    fn as_any(&self) -> &dyn Any {
        self
    }
}
