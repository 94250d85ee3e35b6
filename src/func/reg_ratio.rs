use std::any::Any;

use crate::func::{FuncBase, FuncType, Function};
use crate::walk::Pass;
use crate::{BranchVar, Network, VarRef, NET_CONTROL_EPS};

/// Tap ratio regularization: ½((a − a₀)/Δa)² plus ½(y/Δa)² and ½(z/Δa)²
/// for the ratio deviations, per branch.
#[derive(Debug)]
pub struct FuncRegRatio {
    base: FuncBase,
}

impl FuncRegRatio {
    pub fn new(weight: f64) -> Self {
        Self {
            base: FuncBase::new(weight),
        }
    }

    fn walk(&mut self, net: &Network, br: usize, t: usize, pass: Pass) {
        let x = pass.point();
        let branch = net.branch(br);
        if branch.is_on_outage() {
            return;
        }
        let da = (branch.ratio_max - branch.ratio_min).max(NET_CONTROL_EPS);

        let a = VarRef::Branch(br, BranchVar::Ratio);
        self.base.stamp_quad(
            &pass,
            &[net.var_index(a, t)],
            [1.0 / da],
            [net.value_at(a, t, x)],
            -branch.ratio[t] / da,
        );
        for dev in [BranchVar::RatioY, BranchVar::RatioZ] {
            let dev = VarRef::Branch(br, dev);
            self.base
                .stamp_quad(&pass, &[net.var_index(dev, t)], [1.0 / da], [net.value_at(dev, t, x)], 0.0);
        }
    }
}

impl Function for FuncRegRatio {
    fn func_type(&self) -> FuncType {
        FuncType::RegRatio
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
    fn test_outaged_tap_changer_is_skipped() {
        let mut net = cases::four_bus(1);
        net.set_flags(
            ObjType::Branch,
            FlagKind::Vars,
            BRANCH_PROP_TAP_CHANGER,
            BRANCH_VAR_RATIO | BRANCH_VAR_RATIO_DEV,
        );
        let mut x = net.get_var_values(VarValues::Current);
        x[0] += 0.1;

        let mut f = FuncRegRatio::new(1.0);
        analyze_func(&mut f, &net);
        assert_eq!(f.base().hphi_nnz(), 3);
        eval_func(&mut f, &net, &x);
        assert!(f.base().phi() > 0.0);

        net.branch_mut(1).outage = true;
        analyze_func(&mut f, &net);
        assert_eq!(f.base().hphi_nnz(), 0);
        eval_func(&mut f, &net, &x);
        assert_eq!(f.base().phi(), 0.0);
    }
}
