use serde::Serialize;

use crate::net::var::{GenVar, VarIndex};
use crate::net::{resize_periods, Bus, NET_CONTROL_EPS};
use crate::{FlagKind, Flags};

pub const GEN_PROP_ANY: u8 = 0x00;
/// Generator connected to a slack bus.
pub const GEN_PROP_SLACK: u8 = 0x01;
/// Generator regulating a bus voltage magnitude.
pub const GEN_PROP_REG: u8 = 0x02;
pub const GEN_PROP_NOT_REG: u8 = 0x04;
pub const GEN_PROP_NOT_SLACK: u8 = 0x08;
pub const GEN_PROP_NOT_OUT: u8 = 0x10;
/// Generator with adjustable active power.
pub const GEN_PROP_P_ADJUST: u8 = 0x20;

/// Default constant cost coefficient ($/hr).
pub const GEN_COST_COEFF_Q0: f64 = 0.0;
/// Default linear cost coefficient ($/(hr p.u.)).
pub const GEN_COST_COEFF_Q1: f64 = 2000.0;
/// Default quadratic cost coefficient ($/(hr p.u.^2)).
pub const GEN_COST_COEFF_Q2: f64 = 100.0;

/// Floor of the reactive power range used to place a regulating
/// generator within its limits (p.u.).
pub(crate) const MIN_Q_RANGE: f64 = 1e-8;

#[derive(Debug, Clone, Serialize)]
pub struct Gen {
    /// Index of the bus the generator is connected to.
    pub bus: usize,

    /// Index of the bus whose voltage magnitude is regulated, if any.
    pub reg_bus: Option<usize>,

    /// Out of service.
    pub outage: bool,

    /// Active power output (p.u.) per period.
    pub p: Vec<f64>,
    /// Reactive power output (p.u.) per period.
    pub q: Vec<f64>,

    pub p_max: f64,
    pub p_min: f64,
    pub q_max: f64,
    pub q_min: f64,

    /// Reactive power participation factor among co-regulating generators.
    pub q_par: f64,

    /// Cost coefficients of c0 + c1 P + c2 P^2.
    pub cost_coeff_q0: f64,
    pub cost_coeff_q1: f64,
    pub cost_coeff_q2: f64,

    pub sens_p_u_bound: Vec<f64>,
    pub sens_p_l_bound: Vec<f64>,

    pub(crate) index: usize,
    #[serde(skip)]
    pub(crate) flags: Flags,
    #[serde(skip)]
    pub(crate) var_index: VarIndex,
}

impl Gen {
    pub fn new(bus: usize) -> Self {
        Self {
            bus,
            reg_bus: None,
            outage: false,
            p: vec![0.0],
            q: vec![0.0],
            p_max: 0.0,
            p_min: 0.0,
            q_max: 0.0,
            q_min: 0.0,
            q_par: 1.0,
            cost_coeff_q0: GEN_COST_COEFF_Q0,
            cost_coeff_q1: GEN_COST_COEFF_Q1,
            cost_coeff_q2: GEN_COST_COEFF_Q2,
            sens_p_u_bound: vec![0.0],
            sens_p_l_bound: vec![0.0],
            index: 0,
            flags: Flags::default(),
            var_index: VarIndex::default(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn is_on_outage(&self) -> bool {
        self.outage
    }

    pub fn is_regulator(&self) -> bool {
        self.reg_bus.is_some()
    }

    pub fn is_p_adjustable(&self) -> bool {
        self.p_max > self.p_min + NET_CONTROL_EPS
    }

    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    pub fn has_flags(&self, kind: FlagKind, mask: u8) -> bool {
        self.flags.has(kind, mask)
    }

    /// Tests the property mask; `bus` is the bus the generator is connected to.
    pub fn has_properties(&self, prop: u8, bus: &Bus) -> bool {
        if prop & GEN_PROP_SLACK != 0 && !bus.is_slack() {
            return false;
        }
        if prop & GEN_PROP_REG != 0 && !self.is_regulator() {
            return false;
        }
        if prop & GEN_PROP_NOT_REG != 0 && self.is_regulator() {
            return false;
        }
        if prop & GEN_PROP_NOT_SLACK != 0 && bus.is_slack() {
            return false;
        }
        if prop & GEN_PROP_NOT_OUT != 0 && self.is_on_outage() {
            return false;
        }
        if prop & GEN_PROP_P_ADJUST != 0 && !self.is_p_adjustable() {
            return false;
        }
        true
    }

    pub fn var_index(&self, var: GenVar, t: usize) -> Option<usize> {
        self.var_index.get(var, t)
    }

    pub fn value(&self, var: GenVar, t: usize) -> f64 {
        match var {
            GenVar::P => self.p[t],
            GenVar::Q => self.q[t],
        }
    }

    pub fn set_value(&mut self, var: GenVar, t: usize, value: f64) {
        match var {
            GenVar::P => self.p[t] = value,
            GenVar::Q => self.q[t] = value,
        }
    }

    pub fn limits(&self, var: GenVar) -> (f64, f64) {
        match var {
            GenVar::P => (self.p_min, self.p_max),
            GenVar::Q => (self.q_min, self.q_max),
        }
    }

    /// Cost ($/hr) at active power `p`.
    pub fn cost(&self, p: f64) -> f64 {
        self.cost_coeff_q0 + self.cost_coeff_q1 * p + self.cost_coeff_q2 * p * p
    }

    pub(crate) fn set_flags(&mut self, kind: FlagKind, mask: u8, index: usize, nt: usize) -> usize {
        self.var_index
            .set_flags::<GenVar>(&mut self.flags, kind, mask, index, nt)
    }

    pub(crate) fn clear_flags(&mut self) {
        self.flags.clear();
        self.var_index.clear();
    }

    pub(crate) fn set_bound_sens(&mut self, var: GenVar, t: usize, upper: f64, lower: f64) {
        if var == GenVar::P {
            self.sens_p_u_bound[t] = upper;
            self.sens_p_l_bound[t] = lower;
        }
    }

    pub(crate) fn clear_sensitivities(&mut self) {
        self.sens_p_u_bound.iter_mut().for_each(|s| *s = 0.0);
        self.sens_p_l_bound.iter_mut().for_each(|s| *s = 0.0);
    }

    pub(crate) fn resize_periods(&mut self, nt: usize) {
        for v in [
            &mut self.p,
            &mut self.q,
            &mut self.sens_p_u_bound,
            &mut self.sens_p_l_bound,
        ] {
            resize_periods(v, nt);
        }
    }
}
