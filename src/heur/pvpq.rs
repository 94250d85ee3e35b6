use crate::constr::{ConstrPvpqSwitching, Constraint};
use crate::heur::{HeurType, Heuristic};
use crate::walk::BusCounted;
use crate::{BusVar, GenVar, Network, PvpqOpt, VarRef};

/// PV/PQ switching.
///
/// Moves the fix flags of [`ConstrPvpqSwitching`]. While the voltage of a
/// regulated bus is fixed, a generator leaving its reactive range is fixed
/// at the violated limit, and the voltage is freed once no generator is
/// left to hold it. While the voltage is free, a generator whose limit
/// pushes the voltage past its set point in the wrong direction is
/// released and the voltage fixed back at its set point.
#[derive(Debug, Default)]
pub struct HeurPvpq {
    opt: PvpqOpt,
    bus_counted: BusCounted,
}

impl HeurPvpq {
    pub fn new(opt: PvpqOpt) -> Self {
        Self {
            opt,
            bus_counted: BusCounted::default(),
        }
    }

    fn switch_bus(
        &self,
        pvpq: &mut ConstrPvpqSwitching,
        net: &mut Network,
        bus_index: usize,
        t: usize,
        x: &mut [f64],
    ) {
        let bus = net.bus(bus_index);
        let Some(v) = bus.var_index(BusVar::VMag, t) else {
            return;
        };
        let v_set = bus.v_set[t];
        let regs: Vec<(usize, usize)> = bus
            .reg_gens()
            .iter()
            .filter(|&&g| !net.gen(g).is_on_outage())
            .filter_map(|&g| net.var_index(VarRef::Gen(g, GenVar::Q), t).map(|q| (g, q)))
            .collect();
        if regs.is_empty() {
            return;
        }

        if pvpq.is_fixed(v) {
            let free: Vec<(usize, usize)> = regs.iter().copied().filter(|(_, q)| !pvpq.is_fixed(*q)).collect();
            for (g, q) in free {
                let gen = net.gen(g);
                let limit = if x[q] > gen.q_max + self.opt.q_tol {
                    gen.q_max
                } else if x[q] < gen.q_min - self.opt.q_tol {
                    gen.q_min
                } else {
                    continue;
                };
                log::debug!("bus {} generator {} fixed at Q = {}", bus_index, g, limit);
                pvpq.set_fixed(q, true);
                x[q] = limit;
                net.gen_mut(g).q[t] = limit;
            }
            if regs.iter().all(|(_, q)| pvpq.is_fixed(*q)) {
                log::debug!("bus {} switched to PQ", bus_index);
                pvpq.set_fixed(v, false);
            }
        } else {
            let fixed: Vec<(usize, usize)> = regs.iter().copied().filter(|(_, q)| pvpq.is_fixed(*q)).collect();
            for (g, q) in fixed {
                let gen = net.gen(g);
                let at_max = (x[q] - gen.q_max).abs() <= (x[q] - gen.q_min).abs();
                let release = if at_max {
                    x[v] > v_set + self.opt.v_tol
                } else {
                    x[v] < v_set - self.opt.v_tol
                };
                if release {
                    log::debug!("bus {} switched to PV, generator {} released", bus_index, g);
                    pvpq.set_fixed(q, false);
                    pvpq.set_fixed(v, true);
                    x[v] = v_set;
                    break;
                }
            }
        }
    }
}

impl Heuristic for HeurPvpq {
    fn heur_type(&self) -> HeurType {
        HeurType::PvpqSwitching
    }

    fn clear(&mut self, net: &Network) {
        self.bus_counted
            .reset(net.buses().len(), net.num_periods());
    }

    fn apply_step(
        &mut self,
        constrs: &mut [Box<dyn Constraint>],
        net: &mut Network,
        br: usize,
        t: usize,
        x: &mut [f64],
    ) {
        let Some(pvpq) = constrs
            .iter_mut()
            .find_map(|c| c.as_any_mut().downcast_mut::<ConstrPvpqSwitching>())
        else {
            return;
        };

        let branch = net.branch(br);
        for bus_index in [branch.bus_k, branch.bus_m] {
            if !self.bus_counted.mark(bus_index, t) {
                continue;
            }
            if net.bus(bus_index).is_regulated_by_gen() {
                self.switch_bus(pvpq, net, bus_index, t, x);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases;
    use crate::constr::{new_constr, ConstrType};
    use crate::VarValues;

    fn apply(h: &mut HeurPvpq, constrs: &mut [Box<dyn Constraint>], net: &mut Network, x: &mut [f64]) {
        h.clear(net);
        for br in 0..net.branches().len() {
            h.apply_step(constrs, net, br, 0, x);
        }
    }

    fn pvpq(constrs: &[Box<dyn Constraint>]) -> &ConstrPvpqSwitching {
        constrs[0]
            .as_any()
            .downcast_ref::<ConstrPvpqSwitching>()
            .unwrap()
    }

    #[test]
    fn test_switching_cycle() {
        let mut net = cases::four_bus(1);
        cases::set_pf_vars(&mut net);
        let mut constrs = vec![new_constr(ConstrType::PvpqSwitching)];
        constrs[0].init(&net);
        let mut h = HeurPvpq::new(PvpqOpt::default());

        let v = net.bus(1).var_index(BusVar::VMag, 0).unwrap();
        let q1 = net.gen(1).var_index(GenVar::Q, 0).unwrap();
        let q2 = net.gen(2).var_index(GenVar::Q, 0).unwrap();
        let mut x = net.get_var_values(VarValues::Current);

        // first generator above its limit
        x[q1] = 0.6;
        apply(&mut h, &mut constrs, &mut net, &mut x);
        assert!(pvpq(&constrs).is_fixed(q1));
        assert!(pvpq(&constrs).is_fixed(v));
        assert_eq!(x[q1], 0.4);
        assert_eq!(net.gen(1).q[0], 0.4);

        // second generator below its limit: no regulator left
        x[q2] = -0.5;
        apply(&mut h, &mut constrs, &mut net, &mut x);
        assert!(pvpq(&constrs).is_fixed(q2));
        assert!(!pvpq(&constrs).is_fixed(v));
        assert_eq!(x[q2], -0.2);

        // voltage above set point while at the upper limit
        x[v] = 1.05;
        apply(&mut h, &mut constrs, &mut net, &mut x);
        assert!(!pvpq(&constrs).is_fixed(q1));
        assert!(pvpq(&constrs).is_fixed(q2));
        assert!(pvpq(&constrs).is_fixed(v));
        assert_eq!(x[v], 1.01);
    }

    #[test]
    fn test_without_switching_constraint() {
        let mut net = cases::four_bus(1);
        cases::set_pf_vars(&mut net);
        let mut constrs = vec![new_constr(ConstrType::Acpf)];
        let mut x = net.get_var_values(VarValues::Current);
        let before = x.clone();
        let mut h = HeurPvpq::new(PvpqOpt::default());
        apply(&mut h, &mut constrs, &mut net, &mut x);
        assert_eq!(x, before);
    }
}
