use std::f64::consts::PI;

use serde::Serialize;

use crate::net::resize_periods;
use crate::net::var::{BusVar, VarIndex, BOUND_INF};
use crate::{FlagKind, Flags};

pub const BUS_PROP_ANY: u8 = 0x00;
/// Slack bus.
pub const BUS_PROP_SLACK: u8 = 0x01;
/// Bus with voltage magnitude regulated by generators.
pub const BUS_PROP_REG_BY_GEN: u8 = 0x02;
/// Bus with voltage magnitude regulated by tap changing transformers.
pub const BUS_PROP_REG_BY_TRAN: u8 = 0x04;
/// Bus with voltage magnitude regulated by switched shunts.
pub const BUS_PROP_REG_BY_SHUNT: u8 = 0x08;
pub const BUS_PROP_NOT_REG_BY_GEN: u8 = 0x10;
pub const BUS_PROP_NOT_SLACK: u8 = 0x20;

/// Bus is a node of the network.
///
/// Generators, loads and shunts attached to the bus, as well as the
/// elements regulating its voltage, are referenced by their index in the
/// network arrays.
#[derive(Debug, Clone, Serialize)]
pub struct Bus {
    /// Bus number.
    pub number: usize,

    pub name: String,

    /// Reference bus.
    pub slack: bool,

    /// Voltage magnitude (p.u.) per period.
    pub v_mag: Vec<f64>,

    /// Voltage angle (radians) per period.
    pub v_ang: Vec<f64>,

    /// Voltage magnitude set point (p.u.) per period.
    pub v_set: Vec<f64>,

    /// Voltage deviation above the set point (p.u.) per period.
    pub vh: Vec<f64>,

    /// Voltage deviation below the set point (p.u.) per period.
    pub vl: Vec<f64>,

    /// Maximum voltage magnitude (p.u.).
    pub v_max: f64,

    /// Minimum voltage magnitude (p.u.).
    pub v_min: f64,

    /// Sensitivity of the objective to the active power balance.
    pub sens_p_balance: Vec<f64>,
    /// Sensitivity of the objective to the reactive power balance.
    pub sens_q_balance: Vec<f64>,
    pub sens_v_mag_u_bound: Vec<f64>,
    pub sens_v_mag_l_bound: Vec<f64>,
    pub sens_v_reg_by_gen: Vec<f64>,
    pub sens_v_reg_by_tran: Vec<f64>,
    pub sens_v_reg_by_shunt: Vec<f64>,

    pub(crate) index: usize,
    pub(crate) gens: Vec<usize>,
    pub(crate) reg_gens: Vec<usize>,
    pub(crate) reg_trans: Vec<usize>,
    pub(crate) shunts: Vec<usize>,
    pub(crate) reg_shunts: Vec<usize>,
    pub(crate) loads: Vec<usize>,
    pub(crate) branches: Vec<usize>,

    #[serde(skip)]
    pub(crate) flags: Flags,
    #[serde(skip)]
    pub(crate) var_index: VarIndex,
}

impl Bus {
    pub fn new(number: usize) -> Self {
        Self {
            number,
            name: String::new(),
            slack: false,
            v_mag: vec![1.0],
            v_ang: vec![0.0],
            v_set: vec![1.0],
            vh: vec![0.0],
            vl: vec![0.0],
            v_max: 1.1,
            v_min: 0.9,
            sens_p_balance: vec![0.0],
            sens_q_balance: vec![0.0],
            sens_v_mag_u_bound: vec![0.0],
            sens_v_mag_l_bound: vec![0.0],
            sens_v_reg_by_gen: vec![0.0],
            sens_v_reg_by_tran: vec![0.0],
            sens_v_reg_by_shunt: vec![0.0],
            index: 0,
            gens: Vec::new(),
            reg_gens: Vec::new(),
            reg_trans: Vec::new(),
            shunts: Vec::new(),
            reg_shunts: Vec::new(),
            loads: Vec::new(),
            branches: Vec::new(),
            flags: Flags::default(),
            var_index: VarIndex::default(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// JSON object with the element data and its index.
    pub fn json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn is_slack(&self) -> bool {
        self.slack
    }

    pub fn is_regulated_by_gen(&self) -> bool {
        !self.reg_gens.is_empty()
    }

    pub fn is_regulated_by_tran(&self) -> bool {
        !self.reg_trans.is_empty()
    }

    pub fn is_regulated_by_shunt(&self) -> bool {
        !self.reg_shunts.is_empty()
    }

    /// Generators connected to the bus.
    pub fn gens(&self) -> &[usize] {
        &self.gens
    }

    /// Generators regulating the voltage magnitude of the bus.
    pub fn reg_gens(&self) -> &[usize] {
        &self.reg_gens
    }

    /// Tap changing transformers regulating the voltage magnitude of the bus.
    pub fn reg_trans(&self) -> &[usize] {
        &self.reg_trans
    }

    pub fn shunts(&self) -> &[usize] {
        &self.shunts
    }

    /// Switched shunts regulating the voltage magnitude of the bus.
    pub fn reg_shunts(&self) -> &[usize] {
        &self.reg_shunts
    }

    pub fn loads(&self) -> &[usize] {
        &self.loads
    }

    /// Branches incident to the bus.
    pub fn branches(&self) -> &[usize] {
        &self.branches
    }

    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    pub fn has_flags(&self, kind: FlagKind, mask: u8) -> bool {
        self.flags.has(kind, mask)
    }

    pub fn has_properties(&self, prop: u8) -> bool {
        if prop & BUS_PROP_SLACK != 0 && !self.is_slack() {
            return false;
        }
        if prop & BUS_PROP_REG_BY_GEN != 0 && !self.is_regulated_by_gen() {
            return false;
        }
        if prop & BUS_PROP_REG_BY_TRAN != 0 && !self.is_regulated_by_tran() {
            return false;
        }
        if prop & BUS_PROP_REG_BY_SHUNT != 0 && !self.is_regulated_by_shunt() {
            return false;
        }
        if prop & BUS_PROP_NOT_REG_BY_GEN != 0 && self.is_regulated_by_gen() {
            return false;
        }
        if prop & BUS_PROP_NOT_SLACK != 0 && self.is_slack() {
            return false;
        }
        true
    }

    /// Variable index of a quantity at period `t`, if it is a variable.
    pub fn var_index(&self, var: BusVar, t: usize) -> Option<usize> {
        self.var_index.get(var, t)
    }

    pub fn value(&self, var: BusVar, t: usize) -> f64 {
        match var {
            BusVar::VMag => self.v_mag[t],
            BusVar::VAng => self.v_ang[t],
            BusVar::VH => self.vh[t],
            BusVar::VL => self.vl[t],
        }
    }

    pub fn set_value(&mut self, var: BusVar, t: usize, value: f64) {
        match var {
            BusVar::VMag => self.v_mag[t] = value,
            BusVar::VAng => self.v_ang[t] = value,
            BusVar::VH => self.vh[t] = value,
            BusVar::VL => self.vl[t] = value,
        }
    }

    /// Lower and upper limits of a quantity.
    pub fn limits(&self, var: BusVar) -> (f64, f64) {
        match var {
            BusVar::VMag => (self.v_min, self.v_max),
            BusVar::VAng => (-PI, PI),
            BusVar::VH | BusVar::VL => (0.0, BOUND_INF),
        }
    }

    pub(crate) fn set_flags(&mut self, kind: FlagKind, mask: u8, index: usize, nt: usize) -> usize {
        self.var_index
            .set_flags::<BusVar>(&mut self.flags, kind, mask, index, nt)
    }

    pub(crate) fn clear_flags(&mut self) {
        self.flags.clear();
        self.var_index.clear();
    }

    pub(crate) fn set_bound_sens(&mut self, var: BusVar, t: usize, upper: f64, lower: f64) {
        if var == BusVar::VMag {
            self.sens_v_mag_u_bound[t] = upper;
            self.sens_v_mag_l_bound[t] = lower;
        }
    }

    pub(crate) fn clear_sensitivities(&mut self) {
        for v in [
            &mut self.sens_p_balance,
            &mut self.sens_q_balance,
            &mut self.sens_v_mag_u_bound,
            &mut self.sens_v_mag_l_bound,
            &mut self.sens_v_reg_by_gen,
            &mut self.sens_v_reg_by_tran,
            &mut self.sens_v_reg_by_shunt,
        ] {
            v.iter_mut().for_each(|s| *s = 0.0);
        }
    }

    pub(crate) fn resize_periods(&mut self, nt: usize) {
        for v in [
            &mut self.v_mag,
            &mut self.v_ang,
            &mut self.v_set,
            &mut self.vh,
            &mut self.vl,
            &mut self.sens_p_balance,
            &mut self.sens_q_balance,
            &mut self.sens_v_mag_u_bound,
            &mut self.sens_v_mag_l_bound,
            &mut self.sens_v_reg_by_gen,
            &mut self.sens_v_reg_by_tran,
            &mut self.sens_v_reg_by_shunt,
        ] {
            resize_periods(v, nt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BUS_VAR_VDEV;

    #[test]
    fn test_properties() {
        let mut bus = Bus::new(1);
        bus.slack = true;
        assert!(bus.has_properties(BUS_PROP_ANY));
        assert!(bus.has_properties(BUS_PROP_SLACK | BUS_PROP_NOT_REG_BY_GEN));
        assert!(!bus.has_properties(BUS_PROP_NOT_SLACK));

        bus.reg_gens.push(0);
        assert!(bus.has_properties(BUS_PROP_REG_BY_GEN));
        assert!(!bus.has_properties(BUS_PROP_NOT_REG_BY_GEN));
    }

    #[test]
    fn test_deviation_indices() {
        let mut bus = Bus::new(1);
        let index = bus.set_flags(FlagKind::Vars, BUS_VAR_VDEV, 5, 2);
        assert_eq!(index, 9);
        assert_eq!(bus.var_index(BusVar::VH, 0), Some(5));
        assert_eq!(bus.var_index(BusVar::VH, 1), Some(6));
        assert_eq!(bus.var_index(BusVar::VL, 0), Some(7));
        assert_eq!(bus.var_index(BusVar::VMag, 0), None);

        // already flagged quantities are not indexed again
        let index = bus.set_flags(FlagKind::Vars, BUS_VAR_VDEV, 9, 2);
        assert_eq!(index, 9);
    }
}
