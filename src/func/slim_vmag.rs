use std::any::Any;

use crate::func::{FuncBase, FuncType, Function};
use crate::walk::Pass;
use crate::{BusVar, Network, VarRef, NET_CONTROL_EPS};

/// Soft voltage limits: ½((v − v_mid)/Δv)² per bus, with v_mid the middle
/// of the voltage band and Δv its half width.
#[derive(Debug)]
pub struct FuncSlimVmag {
    base: FuncBase,
}

impl FuncSlimVmag {
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
            let bus = net.bus(bus_index);
            let v_mid = (bus.v_max + bus.v_min) / 2.0;
            let dv = ((bus.v_max - bus.v_min) / 2.0).max(NET_CONTROL_EPS);

            let v = VarRef::Bus(bus_index, BusVar::VMag);
            base.stamp_quad(
                &pass,
                &[net.var_index(v, t)],
                [1.0 / dv],
                [net.value_at(v, t, x)],
                -v_mid / dv,
            );
        }
    }
}

impl Function for FuncSlimVmag {
    fn func_type(&self) -> FuncType {
        FuncType::SlimVmag
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
