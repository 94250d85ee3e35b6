use serde::Serialize;

use crate::net::var::{LoadVar, VarIndex};
use crate::net::{resize_periods, NET_CONTROL_EPS};
use crate::{FlagKind, Flags};

pub const LOAD_PROP_ANY: u8 = 0x00;
/// Load with adjustable active power.
pub const LOAD_PROP_P_ADJUST: u8 = 0x01;

#[derive(Debug, Clone, Serialize)]
pub struct Load {
    /// Index of the bus the load is connected to.
    pub bus: usize,

    /// Active power consumption (p.u.) per period.
    pub p: Vec<f64>,
    /// Reactive power consumption (p.u.) per period.
    pub q: Vec<f64>,

    pub p_max: f64,
    pub p_min: f64,

    pub(crate) index: usize,
    #[serde(skip)]
    pub(crate) flags: Flags,
    #[serde(skip)]
    pub(crate) var_index: VarIndex,
}

impl Load {
    pub fn new(bus: usize, p: f64, q: f64) -> Self {
        Self {
            bus,
            p: vec![p],
            q: vec![q],
            p_max: p,
            p_min: p,
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

    pub fn is_p_adjustable(&self) -> bool {
        self.p_max > self.p_min + NET_CONTROL_EPS
    }

    pub fn has_flags(&self, kind: FlagKind, mask: u8) -> bool {
        self.flags.has(kind, mask)
    }

    pub fn has_properties(&self, prop: u8) -> bool {
        !(prop & LOAD_PROP_P_ADJUST != 0 && !self.is_p_adjustable())
    }

    pub fn var_index(&self, var: LoadVar, t: usize) -> Option<usize> {
        self.var_index.get(var, t)
    }

    pub fn value(&self, var: LoadVar, t: usize) -> f64 {
        match var {
            LoadVar::P => self.p[t],
            LoadVar::Q => self.q[t],
        }
    }

    pub fn set_value(&mut self, var: LoadVar, t: usize, value: f64) {
        match var {
            LoadVar::P => self.p[t] = value,
            LoadVar::Q => self.q[t] = value,
        }
    }

    /// Reactive consumption has no limits of its own; it is pinned at the
    /// first period value.
    pub fn limits(&self, var: LoadVar) -> (f64, f64) {
        match var {
            LoadVar::P => (self.p_min, self.p_max),
            LoadVar::Q => (self.q[0], self.q[0]),
        }
    }

    pub(crate) fn set_flags(&mut self, kind: FlagKind, mask: u8, index: usize, nt: usize) -> usize {
        self.var_index
            .set_flags::<LoadVar>(&mut self.flags, kind, mask, index, nt)
    }

    pub(crate) fn clear_flags(&mut self) {
        self.flags.clear();
        self.var_index.clear();
    }

    pub(crate) fn resize_periods(&mut self, nt: usize) {
        resize_periods(&mut self.p, nt);
        resize_periods(&mut self.q, nt);
    }
}
