use std::any::Any;

use crate::func::{FuncBase, FuncType, Function};
use crate::walk::Pass;
use crate::{Network, ShuntVar, VarRef, NET_CONTROL_EPS};

/// Shunt susceptance regularization: ½((b − b₀)/Δb)² plus deviation terms,
/// per shunt.
#[derive(Debug)]
pub struct FuncRegSusc {
    base: FuncBase,
}

impl FuncRegSusc {
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
            for &s in net.bus(bus_index).shunts() {
                let shunt = net.shunt(s);
                let db = (shunt.b_max - shunt.b_min).max(NET_CONTROL_EPS);

                let b = VarRef::Shunt(s, ShuntVar::Susc);
                base.stamp_quad(
                    &pass,
                    &[net.var_index(b, t)],
                    [1.0 / db],
                    [net.value_at(b, t, x)],
                    -shunt.b[t] / db,
                );
                for dev in [ShuntVar::SuscY, ShuntVar::SuscZ] {
                    let dev = VarRef::Shunt(s, dev);
                    base.stamp_quad(&pass, &[net.var_index(dev, t)], [1.0 / db], [net.value_at(dev, t, x)], 0.0);
                }
            }
        }
    }
}

impl Function for FuncRegSusc {
    fn func_type(&self) -> FuncType {
        FuncType::RegSusc
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
