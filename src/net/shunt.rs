use serde::Serialize;

use crate::net::var::{ShuntVar, VarIndex, BOUND_INF};
use crate::net::resize_periods;
use crate::{FlagKind, Flags};

pub const SHUNT_PROP_ANY: u8 = 0x00;
/// Switched shunt regulating a bus voltage magnitude.
pub const SHUNT_PROP_SWITCHED_V: u8 = 0x01;

/// Shunt device at a bus. Susceptance of a switched shunt is adjustable
/// within its limits.
#[derive(Debug, Clone, Serialize)]
pub struct Shunt {
    /// Index of the bus the shunt is connected to.
    pub bus: usize,

    /// Index of the bus whose voltage magnitude is regulated, if any.
    pub reg_bus: Option<usize>,

    /// Conductance (p.u.).
    pub g: f64,

    /// Susceptance (p.u.) per period.
    pub b: Vec<f64>,
    /// Susceptance deviation above its reference per period.
    pub susc_y: Vec<f64>,
    /// Susceptance deviation below its reference per period.
    pub susc_z: Vec<f64>,

    pub b_max: f64,
    pub b_min: f64,

    pub(crate) index: usize,
    #[serde(skip)]
    pub(crate) flags: Flags,
    #[serde(skip)]
    pub(crate) var_index: VarIndex,
}

impl Shunt {
    pub fn new(bus: usize, g: f64, b: f64) -> Self {
        Self {
            bus,
            reg_bus: None,
            g,
            b: vec![b],
            susc_y: vec![0.0],
            susc_z: vec![0.0],
            b_max: b,
            b_min: b,
            index: 0,
            flags: Flags::default(),
            var_index: VarIndex::default(),
        }
    }

    /// Makes the shunt a switched shunt regulating `reg_bus`.
    pub fn with_regulation(mut self, reg_bus: usize, b_min: f64, b_max: f64) -> Self {
        self.reg_bus = Some(reg_bus);
        self.b_min = b_min;
        self.b_max = b_max;
        self
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn is_switched_v(&self) -> bool {
        self.reg_bus.is_some()
    }

    pub fn has_flags(&self, kind: FlagKind, mask: u8) -> bool {
        self.flags.has(kind, mask)
    }

    pub fn has_properties(&self, prop: u8) -> bool {
        !(prop & SHUNT_PROP_SWITCHED_V != 0 && !self.is_switched_v())
    }

    pub fn var_index(&self, var: ShuntVar, t: usize) -> Option<usize> {
        self.var_index.get(var, t)
    }

    pub fn value(&self, var: ShuntVar, t: usize) -> f64 {
        match var {
            ShuntVar::Susc => self.b[t],
            ShuntVar::SuscY => self.susc_y[t],
            ShuntVar::SuscZ => self.susc_z[t],
        }
    }

    pub fn set_value(&mut self, var: ShuntVar, t: usize, value: f64) {
        match var {
            ShuntVar::Susc => self.b[t] = value,
            ShuntVar::SuscY => self.susc_y[t] = value,
            ShuntVar::SuscZ => self.susc_z[t] = value,
        }
    }

    pub fn limits(&self, var: ShuntVar) -> (f64, f64) {
        match var {
            ShuntVar::Susc => (self.b_min, self.b_max),
            ShuntVar::SuscY | ShuntVar::SuscZ => (0.0, BOUND_INF),
        }
    }

    pub(crate) fn set_flags(&mut self, kind: FlagKind, mask: u8, index: usize, nt: usize) -> usize {
        self.var_index
            .set_flags::<ShuntVar>(&mut self.flags, kind, mask, index, nt)
    }

    pub(crate) fn clear_flags(&mut self) {
        self.flags.clear();
        self.var_index.clear();
    }

    pub(crate) fn resize_periods(&mut self, nt: usize) {
        for v in [&mut self.b, &mut self.susc_y, &mut self.susc_z] {
            resize_periods(v, nt);
        }
    }
}
