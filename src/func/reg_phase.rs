use std::any::Any;

use crate::func::{FuncBase, FuncType, Function};
use crate::walk::Pass;
use crate::{BranchVar, Network, VarRef};

/// Floor of the phase normalization range (rad).
const MIN_PHASE_RANGE: f64 = 3.1416;

/// Phase shift regularization Σ ½((φ − φ₀)/Δφ)², where φ₀ is the phase
/// stored in the network and Δφ the phase range, floored at π.
#[derive(Debug)]
pub struct FuncRegPhase {
    base: FuncBase,
}

impl FuncRegPhase {
    pub fn new(weight: f64) -> Self {
        Self {
            base: FuncBase::new(weight),
        }
    }

    fn walk(&mut self, net: &Network, br: usize, t: usize, pass: Pass) {
        let branch = net.branch(br);
        if branch.is_on_outage() {
            return;
        }
        let var = VarRef::Branch(br, BranchVar::Phase);
        let dp = (branch.phase_max - branch.phase_min).max(MIN_PHASE_RANGE);
        let phase = net.value_at(var, t, pass.point());

        self.base.stamp_quad(
            &pass,
            &[net.var_index(var, t)],
            [1.0 / dp],
            [phase],
            -branch.phase[t] / dp,
        );
    }
}

impl Function for FuncRegPhase {
    fn func_type(&self) -> FuncType {
        FuncType::RegPhase
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
    fn test_range_is_floored() {
        let mut net = cases::four_bus(1);
        let ps = 2;
        {
            let branch = net.branch_mut(ps);
            branch.phase = vec![0.5];
            branch.phase_min = 0.5;
            branch.phase_max = 0.5;
        }
        net.set_flags(ObjType::Branch, FlagKind::Vars, BRANCH_PROP_PHASE_SHIFTER, BRANCH_VAR_PHASE);
        let mut f = FuncRegPhase::new(1.0);
        analyze_func(&mut f, &net);
        assert_eq!(f.base().hphi_nnz(), 1);

        eval_func(&mut f, &net, &[0.5 + std::f64::consts::PI]);
        assert_abs_diff_eq!(f.base().phi(), 0.5, epsilon = 1e-4);
        assert_abs_diff_eq!(f.base().hphi().values()[0], 1.0 / (3.1416 * 3.1416), epsilon = 1e-12);
    }

    #[test]
    fn test_outaged_shifter_is_skipped() {
        let mut net = cases::four_bus(1);
        net.set_flags(ObjType::Branch, FlagKind::Vars, BRANCH_PROP_PHASE_SHIFTER, BRANCH_VAR_PHASE);
        net.branch_mut(2).outage = true;
        let x = net.get_var_values(VarValues::Current);

        let mut f = FuncRegPhase::new(1.0);
        analyze_func(&mut f, &net);
        assert_eq!(f.base().hphi_nnz(), 0);

        eval_func(&mut f, &net, &[x[0] + 1.0]);
        assert_eq!(f.base().phi(), 0.0);
        assert_eq!(f.base().gphi(), &[0.0]);
    }
}
