use num_complex::Complex64;
use serde::Serialize;

use crate::net::resize_periods;
use crate::net::var::{BranchVar, VarIndex, BOUND_INF};
use crate::{FlagKind, Flags};

pub const BRANCH_PROP_ANY: u8 = 0x00;
/// Transformer with adjustable tap ratio.
pub const BRANCH_PROP_TAP_CHANGER: u8 = 0x01;
/// Tap changer regulating a bus voltage magnitude.
pub const BRANCH_PROP_TAP_CHANGER_V: u8 = 0x02;
pub const BRANCH_PROP_PHASE_SHIFTER: u8 = 0x04;
pub const BRANCH_PROP_NOT_OUT: u8 = 0x08;

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize)]
pub enum BranchKind {
    /// Transmission line or cable.
    Line,
    /// Transformer with constant tap ratio.
    FixedTran,
    /// Transformer with adjustable tap ratio.
    TapChanger,
    /// Transformer with adjustable phase shift.
    PhaseShifter,
}

/// Branch connects bus `k` (from) to bus `m` (to).
///
/// The model is a π-equivalent with an ideal transformer of ratio `a` and
/// phase shift `φ` on the `k` side.
#[derive(Debug, Clone, Serialize)]
pub struct Branch {
    pub kind: BranchKind,

    /// Index of the "from" bus.
    pub bus_k: usize,

    /// Index of the "to" bus.
    pub bus_m: usize,

    /// Index of the bus whose voltage is regulated, if any.
    pub reg_bus: Option<usize>,

    /// Series conductance (p.u.).
    pub g: f64,
    /// Series susceptance (p.u.).
    pub b: f64,
    /// Shunt conductance on the "from" side (p.u.).
    pub g_k: f64,
    /// Shunt conductance on the "to" side (p.u.).
    pub g_m: f64,
    /// Shunt susceptance on the "from" side (p.u.).
    pub b_k: f64,
    /// Shunt susceptance on the "to" side (p.u.).
    pub b_m: f64,

    /// Tap ratio per period.
    pub ratio: Vec<f64>,
    /// Phase shift (radians) per period.
    pub phase: Vec<f64>,
    /// Tap ratio deviation above its reference per period.
    pub ratio_y: Vec<f64>,
    /// Tap ratio deviation below its reference per period.
    pub ratio_z: Vec<f64>,

    pub ratio_max: f64,
    pub ratio_min: f64,
    pub phase_max: f64,
    pub phase_min: f64,

    /// Out of service.
    pub outage: bool,

    pub(crate) index: usize,
    #[serde(skip)]
    pub(crate) flags: Flags,
    #[serde(skip)]
    pub(crate) var_index: VarIndex,
}

impl Branch {
    /// Creates a line between buses `bus_k` and `bus_m` with series
    /// resistance `r` and reactance `x` (p.u.).
    pub fn new(bus_k: usize, bus_m: usize, r: f64, x: f64) -> Self {
        let y = Complex64::new(1.0, 0.0) / Complex64::new(r, x);
        Self {
            kind: BranchKind::Line,
            bus_k,
            bus_m,
            reg_bus: None,
            g: y.re,
            b: y.im,
            g_k: 0.0,
            g_m: 0.0,
            b_k: 0.0,
            b_m: 0.0,
            ratio: vec![1.0],
            phase: vec![0.0],
            ratio_y: vec![0.0],
            ratio_z: vec![0.0],
            ratio_max: 1.0,
            ratio_min: 1.0,
            phase_max: 0.0,
            phase_min: 0.0,
            outage: false,
            index: 0,
            flags: Flags::default(),
            var_index: VarIndex::default(),
        }
    }

    /// Sets the total line charging susceptance, split between both ends.
    pub fn with_charging(mut self, b_sh: f64) -> Self {
        self.b_k = b_sh / 2.0;
        self.b_m = b_sh / 2.0;
        self
    }

    /// Turns the branch into a tap changer with ratio limits.
    pub fn with_tap_changer(mut self, ratio: f64, ratio_min: f64, ratio_max: f64) -> Self {
        self.kind = BranchKind::TapChanger;
        self.ratio = vec![ratio];
        self.ratio_min = ratio_min;
        self.ratio_max = ratio_max;
        self
    }

    /// Turns the branch into a phase shifter with phase limits.
    pub fn with_phase_shifter(mut self, phase: f64, phase_min: f64, phase_max: f64) -> Self {
        self.kind = BranchKind::PhaseShifter;
        self.phase = vec![phase];
        self.phase_min = phase_min;
        self.phase_max = phase_max;
        self
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// JSON object with the element data and its index.
    pub fn json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn series_admittance(&self) -> Complex64 {
        Complex64::new(self.g, self.b)
    }

    pub fn is_on_outage(&self) -> bool {
        self.outage
    }

    pub fn is_tap_changer(&self) -> bool {
        self.kind == BranchKind::TapChanger
    }

    pub fn is_tap_changer_v(&self) -> bool {
        self.is_tap_changer() && self.reg_bus.is_some()
    }

    pub fn is_phase_shifter(&self) -> bool {
        self.kind == BranchKind::PhaseShifter
    }

    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    pub fn has_flags(&self, kind: FlagKind, mask: u8) -> bool {
        self.flags.has(kind, mask)
    }

    pub fn has_properties(&self, prop: u8) -> bool {
        if prop & BRANCH_PROP_TAP_CHANGER != 0 && !self.is_tap_changer() {
            return false;
        }
        if prop & BRANCH_PROP_TAP_CHANGER_V != 0 && !self.is_tap_changer_v() {
            return false;
        }
        if prop & BRANCH_PROP_PHASE_SHIFTER != 0 && !self.is_phase_shifter() {
            return false;
        }
        if prop & BRANCH_PROP_NOT_OUT != 0 && self.is_on_outage() {
            return false;
        }
        true
    }

    pub fn var_index(&self, var: BranchVar, t: usize) -> Option<usize> {
        self.var_index.get(var, t)
    }

    pub fn value(&self, var: BranchVar, t: usize) -> f64 {
        match var {
            BranchVar::Ratio => self.ratio[t],
            BranchVar::Phase => self.phase[t],
            BranchVar::RatioY => self.ratio_y[t],
            BranchVar::RatioZ => self.ratio_z[t],
        }
    }

    pub fn set_value(&mut self, var: BranchVar, t: usize, value: f64) {
        match var {
            BranchVar::Ratio => self.ratio[t] = value,
            BranchVar::Phase => self.phase[t] = value,
            BranchVar::RatioY => self.ratio_y[t] = value,
            BranchVar::RatioZ => self.ratio_z[t] = value,
        }
    }

    pub fn limits(&self, var: BranchVar) -> (f64, f64) {
        match var {
            BranchVar::Ratio => (self.ratio_min, self.ratio_max),
            BranchVar::Phase => (self.phase_min, self.phase_max),
            BranchVar::RatioY | BranchVar::RatioZ => (0.0, BOUND_INF),
        }
    }

    pub(crate) fn set_flags(&mut self, kind: FlagKind, mask: u8, index: usize, nt: usize) -> usize {
        self.var_index
            .set_flags::<BranchVar>(&mut self.flags, kind, mask, index, nt)
    }

    pub(crate) fn clear_flags(&mut self) {
        self.flags.clear();
        self.var_index.clear();
    }

    pub(crate) fn resize_periods(&mut self, nt: usize) {
        for v in [
            &mut self.ratio,
            &mut self.phase,
            &mut self.ratio_y,
            &mut self.ratio_z,
        ] {
            resize_periods(v, nt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_series_admittance() {
        let br = Branch::new(0, 1, 0.0, 0.1);
        assert_abs_diff_eq!(br.g, 0.0);
        assert_abs_diff_eq!(br.b, -10.0, epsilon = 1e-12);

        let br = Branch::new(0, 1, 0.01, 0.1).with_charging(0.02);
        assert!(br.g > 0.0);
        assert_abs_diff_eq!(br.b_k, 0.01);
    }

    #[test]
    fn test_properties() {
        let mut br = Branch::new(0, 1, 0.0, 0.1).with_tap_changer(1.0, 0.9, 1.1);
        assert!(br.has_properties(BRANCH_PROP_TAP_CHANGER | BRANCH_PROP_NOT_OUT));
        assert!(!br.has_properties(BRANCH_PROP_TAP_CHANGER_V));
        br.reg_bus = Some(1);
        assert!(br.has_properties(BRANCH_PROP_TAP_CHANGER_V));
        br.outage = true;
        assert!(!br.has_properties(BRANCH_PROP_NOT_OUT));
    }
}
