use std::any::Any;

use crate::constr::{ConstrBase, ConstrType, Constraint, Sens};
use crate::walk::{LocalTerm, Pass};
use crate::{BranchVar, Bus, BusVar, GenVar, Network, ShuntVar, VarRef};

/// Smoothing parameter of the complementarity function.
const PARAM: f64 = 1e-8;

/// Control rooms above this value are treated as unlimited.
const MAX_YZ: f64 = 1e8;

/// Device regulating bus voltage magnitudes.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum RegControl {
    /// Reactive power of generators.
    Gen,
    /// Tap ratio of transformers.
    Tran,
    /// Susceptance of switched shunts.
    Shunt,
}

/// Control quantity of a regulating device together with its limits.
#[derive(Debug, Clone, Copy)]
struct Regulator {
    control: VarRef,
    min: f64,
    max: f64,
    // raising the control lowers the regulated voltage
    reversed: bool,
}

/// Voltage regulation with saturating controls.
///
/// For a regulated bus with voltage magnitude and deviation variables the
/// voltage is split as `v + vl − vh = v_set`. Every regulating device with
/// a variable control adds the complementarity rows
///
///   FB(vl, up room) = 0 and FB(vh, down room) = 0
///
/// with FB(a, b) = √(a² + b² + 2ε) − (a + b), so that the voltage may only
/// drop below its set point once the device has no room left to raise it,
/// and conversely.
#[derive(Debug)]
pub struct ConstrReg {
    base: ConstrBase,
    control: RegControl,
}

impl ConstrReg {
    pub fn new(control: RegControl) -> Self {
        Self {
            base: ConstrBase::default(),
            control,
        }
    }

    pub fn control(&self) -> RegControl {
        self.control
    }

    fn is_regulated(&self, bus: &Bus) -> bool {
        match self.control {
            RegControl::Gen => bus.is_regulated_by_gen(),
            RegControl::Tran => bus.is_regulated_by_tran(),
            RegControl::Shunt => bus.is_regulated_by_shunt(),
        }
    }

    /// Columns of v, vh and vl if bus `bus` has an equation at period `t`.
    fn voltage_cols(&self, net: &Network, bus: usize, t: usize) -> Option<(usize, usize, usize)> {
        let b = net.bus(bus);
        if !self.is_regulated(b) {
            return None;
        }
        Some((
            b.var_index(BusVar::VMag, t)?,
            b.var_index(BusVar::VH, t)?,
            b.var_index(BusVar::VL, t)?,
        ))
    }

    fn regulators(&self, net: &Network, bus: usize) -> Vec<Regulator> {
        let b = net.bus(bus);
        match self.control {
            RegControl::Gen => b
                .reg_gens()
                .iter()
                .filter(|&&g| !net.gen(g).is_on_outage())
                .map(|&g| {
                    let gen = net.gen(g);
                    Regulator {
                        control: VarRef::Gen(g, GenVar::Q),
                        min: gen.q_min,
                        max: gen.q_max,
                        reversed: false,
                    }
                })
                .collect(),
            RegControl::Tran => b
                .reg_trans()
                .iter()
                .filter(|&&br| !net.branch(br).is_on_outage())
                .map(|&br| {
                    let branch = net.branch(br);
                    Regulator {
                        control: VarRef::Branch(br, BranchVar::Ratio),
                        min: branch.ratio_min,
                        max: branch.ratio_max,
                        reversed: branch.bus_k == bus,
                    }
                })
                .collect(),
            RegControl::Shunt => b
                .reg_shunts()
                .iter()
                .map(|&s| {
                    let shunt = net.shunt(s);
                    Regulator {
                        control: VarRef::Shunt(s, ShuntVar::Susc),
                        min: shunt.b_min,
                        max: shunt.b_max,
                        reversed: false,
                    }
                })
                .collect(),
        }
    }

    fn walk(&mut self, net: &Network, br: usize, t: usize, pass: Pass) {
        let x = pass.point();
        let branch = net.branch(br);

        for bus_index in [branch.bus_k, branch.bus_m] {
            if !self.base.bus_counted.mark(bus_index, t) {
                continue;
            }
            let Some((v, vh, vl)) = self.voltage_cols(net, bus_index, t) else {
                continue;
            };
            let base = &mut self.base;

            let row = base.new_a_row();
            base.stamp_a(&pass, row, v, 1.0);
            base.stamp_a(&pass, row, vl, 1.0);
            base.stamp_a(&pass, row, vh, -1.0);
            base.add_b(&pass, row, net.bus(bus_index).v_set[t]);

            let vh_var = VarRef::Bus(bus_index, BusVar::VH);
            let vl_var = VarRef::Bus(bus_index, BusVar::VL);
            for reg in self.regulators(net, bus_index) {
                let Some(col) = net.var_index(reg.control, t) else {
                    continue;
                };
                let z = net.value_at(reg.control, t, x);

                // (sign, offset) of the rooms: room = sign·z + offset
                let up = (-1.0, reg.max);
                let down = (1.0, -reg.min);
                let (up, down) = if reg.reversed { (down, up) } else { (up, down) };

                let base = &mut self.base;
                for (dev_var, dev_col, (sign, offset)) in [(vl_var, vl, up), (vh_var, vh, down)] {
                    let dev = net.value_at(dev_var, t, x);
                    let row = base.new_j_row();
                    base.stamp_term(&pass, row, &[Some(dev_col), Some(col)], || {
                        complementarity(dev, sign * z + offset, sign)
                    });
                }
            }
        }
    }
}

/// Smoothed Fischer–Burmeister function of `a` and the control room `b`,
/// with derivatives taken with respect to `a` and to the control, where
/// d(room)/d(control) = `sign`.
fn complementarity(a: f64, b: f64, sign: f64) -> LocalTerm<2> {
    let (b, db) = if b > MAX_YZ { (MAX_YZ, 0.0) } else { (b, sign) };

    let s = (a * a + b * b + 2.0 * PARAM).sqrt();
    let s3 = s * s * s;
    let fa = a / s - 1.0;
    let fb = b / s - 1.0;
    let faa = (b * b + 2.0 * PARAM) / s3;
    let fbb = (a * a + 2.0 * PARAM) / s3;
    let fab = -a * b / s3;

    LocalTerm {
        value: s - (a + b),
        grad: [fa, fb * db],
        hess: [[faa, fab * db], [fab * db, fbb * db * db]],
    }
}

impl Constraint for ConstrReg {
    fn constr_type(&self) -> ConstrType {
        match self.control {
            RegControl::Gen => ConstrType::RegGen,
            RegControl::Tran => ConstrType::RegTran,
            RegControl::Shunt => ConstrType::RegShunt,
        }
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

    fn eval_step(&mut self, net: &Network, br: usize, t: usize, x: &[f64]) {
        self.walk(net, br, t, Pass::Eval(x));
    }

    fn store_sens_step(&mut self, net: &mut Network, br: usize, t: usize, sens: &Sens) {
        let branch = net.branch(br);
        for bus_index in [branch.bus_k, branch.bus_m] {
            if !self.base.bus_counted.mark(bus_index, t) {
                continue;
            }
            if self.voltage_cols(net, bus_index, t).is_none() {
                continue;
            }
            let s = sens.sa[self.base.new_a_row()];
            let bus = net.bus_mut(bus_index);
            match self.control {
                RegControl::Gen => bus.sens_v_reg_by_gen[t] = s,
                RegControl::Tran => bus.sens_v_reg_by_tran[t] = s,
                RegControl::Shunt => bus.sens_v_reg_by_shunt[t] = s,
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
