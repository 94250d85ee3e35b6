use std::any::Any;

use crate::constr::{ConstrBase, ConstrType, Constraint, Sens};
use crate::walk::{step_quantities, Pass};
use crate::{FlagKind, Network};

/// Simple bounds `l ≤ x_i ≤ u` of the variables flagged bounded, taken
/// from the quantity limits.
#[derive(Debug, Default)]
pub struct ConstrLbound {
    base: ConstrBase,
}

impl ConstrLbound {
    pub fn new() -> Self {
        Self::default()
    }

    fn walk(&mut self, net: &Network, br: usize, t: usize, pass: Pass) {
        let base = &mut self.base;
        for var in step_quantities(net, br, t, &mut base.bus_counted) {
            if !net.has_flags(var, FlagKind::Bounded) {
                continue;
            }
            let Some(col) = net.var_index(var, t) else {
                continue;
            };
            let (l, u) = net.limits(var);
            let row = base.new_g_row();
            base.stamp_g(&pass, row, col, 1.0);
            base.set_bounds(&pass, row, l, u);
        }
    }
}

impl Constraint for ConstrLbound {
    fn constr_type(&self) -> ConstrType {
        ConstrType::Lbound
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

    fn store_sens_step(&mut self, net: &mut Network, br: usize, t: usize, sens: &Sens) {
        for var in step_quantities(net, br, t, &mut self.base.bus_counted) {
            if !net.has_flags(var, FlagKind::Bounded) || net.var_index(var, t).is_none() {
                continue;
            }
            let row = self.base.new_g_row();
            net.set_bound_sens(var, t, sens.sgu[row], sens.sgl[row]);
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
    use crate::cases;
    use crate::constr::analyze_constr;
    use crate::*;

    #[test]
    fn test_generator_bounds_and_sensitivities() {
        let mut net = cases::three_bus(1);
        net.set_flags(ObjType::Gen, FlagKind::Vars, GEN_PROP_ANY, GEN_VAR_P);
        net.set_flags(ObjType::Gen, FlagKind::Bounded, GEN_PROP_NOT_SLACK, GEN_VAR_P);

        let mut c = ConstrLbound::new();
        analyze_constr(&mut c, &net);
        assert_eq!(c.base().counters().g_row, 1);
        assert_eq!(c.base().l(), &[0.1]);
        assert_eq!(c.base().u(), &[1.0]);
        let col = net.gen(1).var_index(GenVar::P, 0).unwrap();
        assert_eq!(c.base().g().colidx(), &[col]);

        c.clear(&net);
        let sens = Sens {
            sa: &[],
            sf: &[],
            sgu: &[3.0],
            sgl: &[0.5],
        };
        for br in 0..net.branches().len() {
            c.store_sens_step(&mut net, br, 0, &sens);
        }
        assert_eq!(net.gen(1).sens_p_u_bound[0], 3.0);
        assert_eq!(net.gen(1).sens_p_l_bound[0], 0.5);
        assert_eq!(net.gen(0).sens_p_u_bound[0], 0.0);
    }
}
