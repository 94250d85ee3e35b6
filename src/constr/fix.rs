use std::any::Any;

use crate::constr::{ConstrBase, ConstrType, Constraint};
use crate::walk::{step_quantities, Pass};
use crate::{FlagKind, Network};

/// Pins every variable flagged fixed to the value currently stored in the
/// network: `x_i = value`.
#[derive(Debug, Default)]
pub struct ConstrFix {
    base: ConstrBase,
}

impl ConstrFix {
    pub fn new() -> Self {
        Self::default()
    }

    fn walk(&mut self, net: &Network, br: usize, t: usize, pass: Pass) {
        let base = &mut self.base;
        for var in step_quantities(net, br, t, &mut base.bus_counted) {
            if !net.has_flags(var, FlagKind::Fixed) {
                continue;
            }
            let Some(col) = net.var_index(var, t) else {
                continue;
            };
            let row = base.new_a_row();
            base.stamp_a(&pass, row, col, 1.0);
            base.add_b(&pass, row, net.value(var, t));
        }
    }
}

impl Constraint for ConstrFix {
    fn constr_type(&self) -> ConstrType {
        ConstrType::Fix
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases;
    use crate::constr::analyze_constr;
    use crate::*;

    #[test]
    fn test_fixed_slack_voltage() {
        let mut net = cases::three_bus(2);
        net.set_flags(ObjType::Bus, FlagKind::Vars, BUS_PROP_ANY, BUS_VAR_VMAG);
        net.set_flags(ObjType::Bus, FlagKind::Fixed, BUS_PROP_SLACK, BUS_VAR_VMAG);
        // fixed but not a variable: no row
        net.set_flags(ObjType::Gen, FlagKind::Fixed, GEN_PROP_ANY, GEN_VAR_P);
        net.bus_mut(0).v_mag[1] = 1.04;

        let mut c = ConstrFix::new();
        analyze_constr(&mut c, &net);
        assert_eq!(c.base().counters().a_row, 2);
        assert_eq!(c.base().counters().a_nnz, 2);

        let a = c.base().a();
        assert_eq!(a.colidx(), &[0, 1]);
        assert_eq!(c.base().b(), &[1.02, 1.04]);
    }
}
