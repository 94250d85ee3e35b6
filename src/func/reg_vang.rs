use std::any::Any;

use crate::func::{FuncBase, FuncType, Function};
use crate::walk::Pass;
use crate::{BranchVar, BusVar, Network, VarRef};

/// Normalization of voltage angles (rad).
const ANGLE_RANGE: f64 = 3.1416;

/// Voltage angle regularization: ½(θ/Δθ)² per bus and ½((θ_k − θ_m − φ)/Δθ)²
/// per in-service branch.
#[derive(Debug)]
pub struct FuncRegVang {
    base: FuncBase,
}

impl FuncRegVang {
    pub fn new(weight: f64) -> Self {
        Self {
            base: FuncBase::new(weight),
        }
    }

    fn walk(&mut self, net: &Network, br: usize, t: usize, pass: Pass) {
        let x = pass.point();
        let branch = net.branch(br);
        let base = &mut self.base;
        let k = 1.0 / ANGLE_RANGE;

        for bus_index in [branch.bus_k, branch.bus_m] {
            if !base.bus_counted.mark(bus_index, t) {
                continue;
            }
            let var = VarRef::Bus(bus_index, BusVar::VAng);
            base.stamp_quad(&pass, &[net.var_index(var, t)], [k], [net.value_at(var, t, x)], 0.0);
        }

        if branch.is_on_outage() {
            return;
        }
        let vars = [
            VarRef::Bus(branch.bus_k, BusVar::VAng),
            VarRef::Bus(branch.bus_m, BusVar::VAng),
            VarRef::Branch(br, BranchVar::Phase),
        ];
        base.stamp_quad(
            &pass,
            &vars.map(|v| net.var_index(v, t)),
            [k, -k, -k],
            vars.map(|v| net.value_at(v, t, x)),
            0.0,
        );
    }
}

impl Function for FuncRegVang {
    fn func_type(&self) -> FuncType {
        FuncType::RegVang
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

    #[test]
    fn test_structure() {
        let mut net = cases::three_bus(1);
        net.set_flags(ObjType::Bus, FlagKind::Vars, BUS_PROP_NOT_SLACK, BUS_VAR_VANG);
        let mut f = FuncRegVang::new(1.0);
        analyze_func(&mut f, &net);

        // two bus terms, branches with one and two angle variables
        assert_eq!(f.base().hphi_nnz(), 2 + 1 + 4 + 1);
    }

    #[test]
    fn test_outaged_branch_is_skipped() {
        let mut net = cases::three_bus(1);
        net.set_flags(ObjType::Bus, FlagKind::Vars, BUS_PROP_NOT_SLACK, BUS_VAR_VANG);
        net.branch_mut(1).outage = true;
        let mut f = FuncRegVang::new(1.0);
        analyze_func(&mut f, &net);

        // the bus terms stay, the branch between the two angle variables goes
        assert_eq!(f.base().hphi_nnz(), 2 + 1 + 1);
        check_derivatives(&mut f, &net, &[0.1, -0.2]);
    }
}
