use std::any::Any;

use crate::func::{FuncBase, FuncType, Function};
use crate::walk::Pass;
use crate::{BusVar, Network, VarRef, NET_CONTROL_EPS};

/// Voltage magnitude regularization around the set point:
/// ½((v − v_set)/Δv)² + ½(vh/Δv)² + ½(vl/Δv)² per bus, with Δv the
/// voltage band.
#[derive(Debug)]
pub struct FuncRegVmag {
    base: FuncBase,
}

impl FuncRegVmag {
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
            let dv = (bus.v_max - bus.v_min).max(NET_CONTROL_EPS);

            let v = VarRef::Bus(bus_index, BusVar::VMag);
            base.stamp_quad(
                &pass,
                &[net.var_index(v, t)],
                [1.0 / dv],
                [net.value_at(v, t, x)],
                -bus.v_set[t] / dv,
            );
            for dev in [BusVar::VH, BusVar::VL] {
                let dev = VarRef::Bus(bus_index, dev);
                base.stamp_quad(&pass, &[net.var_index(dev, t)], [1.0 / dv], [net.value_at(dev, t, x)], 0.0);
            }
        }
    }
}

impl Function for FuncRegVmag {
    fn func_type(&self) -> FuncType {
        FuncType::RegVmag
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases;
    use crate::func::testing::*;
    use crate::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_deviation_from_set_point() {
        let mut net = cases::three_bus(1);
        net.set_flags(ObjType::Bus, FlagKind::Vars, BUS_PROP_ANY, BUS_VAR_VMAG | BUS_VAR_VDEV);
        let mut f = FuncRegVmag::new(1.0);
        analyze_func(&mut f, &net);
        assert_eq!(f.base().hphi_nnz(), 3 * 3);

        let mut x = net.get_var_values(VarValues::Current);
        let v = net.bus(2).var_index(BusVar::VMag, 0).unwrap();
        let vh = net.bus(2).var_index(BusVar::VH, 0).unwrap();
        x[v] = 1.02;
        x[vh] = 0.02;
        eval_func(&mut f, &net, &x);
        // band of 0.2 p.u.
        let expected = 0.5 * (0.02f64 / 0.2).powi(2) * 2.0;
        assert_abs_diff_eq!(f.base().phi(), expected, epsilon = 1e-12);
    }
}
