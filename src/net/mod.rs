mod branch;
mod bus;
pub(crate) mod flow;
mod gen;
mod load;
mod shunt;
pub(crate) mod var;

pub use branch::*;
pub use bus::*;
pub use flow::{branch_flow, Power, Side};
pub use gen::*;
pub use load::*;
pub use shunt::*;
pub use var::*;

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use crate::debug::format_f64;
use crate::net::flow::{NUM_LOCAL, PHASE, RATIO, VK, VM, WK, WM};
use crate::walk::BusCounted;
use crate::{FlagKind, NetOpt, NetworkError, ObjType};

/// Safeguard for small control ranges (p.u.).
pub const NET_CONTROL_EPS: f64 = 1e-4;

/// Change of a control, in percent of its range, counted as an action.
pub const NET_CONTROL_ACTION_PCT: f64 = 2.0;

/// Extends a per-period vector to `nt` entries by repeating its last value.
pub(crate) fn resize_periods(v: &mut Vec<f64>, nt: usize) {
    let last = v.last().copied().unwrap_or(0.0);
    v.resize(nt, last);
}

/// Mutable properties updated while evaluating a problem, one entry per
/// period.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NetProperties {
    /// Largest voltage magnitude (p.u.).
    pub bus_v_max: Vec<f64>,
    /// Smallest voltage magnitude (p.u.).
    pub bus_v_min: Vec<f64>,
    /// Largest voltage magnitude limit violation (p.u.).
    pub bus_v_vio: Vec<f64>,
    /// Largest active power limit violation of a generator (p.u.).
    pub gen_p_vio: Vec<f64>,
    /// Largest reactive power limit violation of a generator (p.u.).
    pub gen_q_vio: Vec<f64>,
    /// Largest deviation from the set point of a generator regulated
    /// bus (p.u.).
    pub gen_v_dev: Vec<f64>,
    /// Largest voltage band violation of a transformer regulated bus (p.u.).
    pub tran_v_vio: Vec<f64>,
    /// Largest tap ratio limit violation.
    pub tran_r_vio: Vec<f64>,
    /// Largest phase shift limit violation (radians).
    pub tran_p_vio: Vec<f64>,
    /// Largest voltage band violation of a shunt regulated bus (p.u.).
    pub shunt_v_vio: Vec<f64>,
    /// Largest susceptance limit violation of a switched shunt (p.u.).
    pub shunt_b_vio: Vec<f64>,
    /// Number of controls moved by more than [`NET_CONTROL_ACTION_PCT`]
    /// percent of their range from the values stored in the network.
    pub num_actions: Vec<usize>,
}

impl NetProperties {
    fn reset(&mut self, nt: usize) {
        self.bus_v_max = vec![f64::NEG_INFINITY; nt];
        self.bus_v_min = vec![f64::INFINITY; nt];
        self.bus_v_vio = vec![0.0; nt];
        self.gen_p_vio = vec![0.0; nt];
        self.gen_q_vio = vec![0.0; nt];
        self.gen_v_dev = vec![0.0; nt];
        self.tran_v_vio = vec![0.0; nt];
        self.tran_r_vio = vec![0.0; nt];
        self.tran_p_vio = vec![0.0; nt];
        self.shunt_v_vio = vec![0.0; nt];
        self.shunt_b_vio = vec![0.0; nt];
        self.num_actions = vec![0; nt];
    }
}

/// True if a control moved from `before` to `after` by more than
/// [`NET_CONTROL_ACTION_PCT`] percent of `range`.
fn is_control_action(after: f64, before: f64, range: f64) -> bool {
    100.0 * (after - before).abs() / range.max(NET_CONTROL_EPS) > NET_CONTROL_ACTION_PCT
}

/// Network is the power system graph and the variable index allocator.
///
/// Elements live in arrays owned by the network and reference each other
/// by array index.
#[derive(Debug, Clone)]
pub struct Network {
    base_power: f64,
    num_periods: usize,

    buses: Vec<Bus>,
    branches: Vec<Branch>,
    gens: Vec<Gen>,
    loads: Vec<Load>,
    shunts: Vec<Shunt>,

    bus_hash: HashMap<usize, usize>,

    // Running counters of flagged quantities, one per flag kind.
    num_flagged: [usize; 4],

    error: Option<String>,

    properties: NetProperties,
    mis_p: Vec<f64>,
    mis_q: Vec<f64>,
    prop_counted: BusCounted,
}

impl Default for Network {
    fn default() -> Self {
        Self::new(NetOpt::default())
    }
}

impl Network {
    pub fn new(opt: NetOpt) -> Self {
        let mut net = Self {
            base_power: opt.base_power,
            num_periods: opt.num_periods.max(1),
            buses: Vec::new(),
            branches: Vec::new(),
            gens: Vec::new(),
            loads: Vec::new(),
            shunts: Vec::new(),
            bus_hash: HashMap::new(),
            num_flagged: [0; 4],
            error: None,
            properties: NetProperties::default(),
            mis_p: Vec::new(),
            mis_q: Vec::new(),
            prop_counted: BusCounted::default(),
        };
        net.clear_properties();
        net
    }

    /// System MVA base.
    pub fn base_power(&self) -> f64 {
        self.base_power
    }

    pub fn num_periods(&self) -> usize {
        self.num_periods
    }

    pub fn buses(&self) -> &[Bus] {
        &self.buses
    }

    pub fn bus(&self, i: usize) -> &Bus {
        &self.buses[i]
    }

    pub fn bus_mut(&mut self, i: usize) -> &mut Bus {
        &mut self.buses[i]
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub fn branch(&self, i: usize) -> &Branch {
        &self.branches[i]
    }

    pub fn branch_mut(&mut self, i: usize) -> &mut Branch {
        &mut self.branches[i]
    }

    pub fn gens(&self) -> &[Gen] {
        &self.gens
    }

    pub fn gen(&self, i: usize) -> &Gen {
        &self.gens[i]
    }

    pub fn gen_mut(&mut self, i: usize) -> &mut Gen {
        &mut self.gens[i]
    }

    pub fn loads(&self) -> &[Load] {
        &self.loads
    }

    pub fn load(&self, i: usize) -> &Load {
        &self.loads[i]
    }

    pub fn load_mut(&mut self, i: usize) -> &mut Load {
        &mut self.loads[i]
    }

    pub fn shunts(&self) -> &[Shunt] {
        &self.shunts
    }

    pub fn shunt(&self, i: usize) -> &Shunt {
        &self.shunts[i]
    }

    pub fn shunt_mut(&mut self, i: usize) -> &mut Shunt {
        &mut self.shunts[i]
    }

    /// Index of the bus with the given number.
    pub fn bus_index(&self, number: usize) -> Option<usize> {
        self.bus_hash.get(&number).copied()
    }

    pub fn add_bus(&mut self, mut bus: Bus) -> usize {
        let index = self.buses.len();
        bus.index = index;
        bus.resize_periods(self.num_periods);
        self.bus_hash.entry(bus.number).or_insert(index);
        self.buses.push(bus);
        self.clear_properties();
        index
    }

    pub fn add_branch(&mut self, mut br: Branch) -> Result<usize, NetworkError> {
        let index = self.branches.len();
        for bus in [Some(br.bus_k), Some(br.bus_m), br.reg_bus].into_iter().flatten() {
            self.check_bus_ref(ObjType::Branch, index, bus)?;
        }
        br.index = index;
        br.resize_periods(self.num_periods);

        self.buses[br.bus_k].branches.push(index);
        if br.bus_m != br.bus_k {
            self.buses[br.bus_m].branches.push(index);
        }
        if let Some(reg_bus) = br.reg_bus {
            self.buses[reg_bus].reg_trans.push(index);
        }
        self.branches.push(br);
        Ok(index)
    }

    pub fn add_gen(&mut self, mut gen: Gen) -> Result<usize, NetworkError> {
        let index = self.gens.len();
        for bus in [Some(gen.bus), gen.reg_bus].into_iter().flatten() {
            self.check_bus_ref(ObjType::Gen, index, bus)?;
        }
        gen.index = index;
        gen.resize_periods(self.num_periods);

        self.buses[gen.bus].gens.push(index);
        if let Some(reg_bus) = gen.reg_bus {
            self.buses[reg_bus].reg_gens.push(index);
        }
        self.gens.push(gen);
        Ok(index)
    }

    pub fn add_load(&mut self, mut load: Load) -> Result<usize, NetworkError> {
        let index = self.loads.len();
        self.check_bus_ref(ObjType::Load, index, load.bus)?;
        load.index = index;
        load.resize_periods(self.num_periods);

        self.buses[load.bus].loads.push(index);
        self.loads.push(load);
        Ok(index)
    }

    pub fn add_shunt(&mut self, mut shunt: Shunt) -> Result<usize, NetworkError> {
        let index = self.shunts.len();
        for bus in [Some(shunt.bus), shunt.reg_bus].into_iter().flatten() {
            self.check_bus_ref(ObjType::Shunt, index, bus)?;
        }
        shunt.index = index;
        shunt.resize_periods(self.num_periods);

        self.buses[shunt.bus].shunts.push(index);
        if let Some(reg_bus) = shunt.reg_bus {
            self.buses[reg_bus].reg_shunts.push(index);
        }
        self.shunts.push(shunt);
        Ok(index)
    }

    fn check_bus_ref(&self, obj: ObjType, index: usize, bus: usize) -> Result<(), NetworkError> {
        if bus >= self.buses.len() {
            return Err(NetworkError::BadBusReference { obj, index, bus });
        }
        Ok(())
    }

    /// Flags quantities `mask` of all elements of type `obj` that have the
    /// properties `prop`. Newly flagged variables receive consecutive
    /// indices, `num_periods` per quantity.
    pub fn set_flags(&mut self, obj: ObjType, kind: FlagKind, prop: u8, mask: u8) {
        let nt = self.num_periods;
        let mut index = self.num_flagged[kind.slot()];

        match obj {
            ObjType::Bus => {
                for bus in self.buses.iter_mut().filter(|b| b.has_properties(prop)) {
                    index = bus.set_flags(kind, mask, index, nt);
                }
            }
            ObjType::Branch => {
                for br in self.branches.iter_mut().filter(|br| br.has_properties(prop)) {
                    index = br.set_flags(kind, mask, index, nt);
                }
            }
            ObjType::Gen => {
                let buses = &self.buses;
                for gen in self
                    .gens
                    .iter_mut()
                    .filter(|g| g.has_properties(prop, &buses[g.bus]))
                {
                    index = gen.set_flags(kind, mask, index, nt);
                }
            }
            ObjType::Load => {
                for load in self.loads.iter_mut().filter(|l| l.has_properties(prop)) {
                    index = load.set_flags(kind, mask, index, nt);
                }
            }
            ObjType::Shunt => {
                for shunt in self.shunts.iter_mut().filter(|s| s.has_properties(prop)) {
                    index = shunt.set_flags(kind, mask, index, nt);
                }
            }
        }

        log::debug!(
            "set {:?} flags {:#04x} on {} elements with properties {:#04x}: {} -> {}",
            kind,
            mask,
            obj,
            prop,
            self.num_flagged[kind.slot()],
            index
        );
        self.num_flagged[kind.slot()] = index;
    }

    /// Clears all flags and variable indices, starting a new configuration.
    pub fn clear_flags(&mut self) {
        self.buses.iter_mut().for_each(|b| b.clear_flags());
        self.branches.iter_mut().for_each(|br| br.clear_flags());
        self.gens.iter_mut().for_each(|g| g.clear_flags());
        self.loads.iter_mut().for_each(|l| l.clear_flags());
        self.shunts.iter_mut().for_each(|s| s.clear_flags());
        self.num_flagged = [0; 4];
    }

    /// Number of variables.
    pub fn num_vars(&self) -> usize {
        self.num_flagged[FlagKind::Vars.slot()]
    }

    /// Number of fixed quantities, counting each period.
    pub fn num_fixed(&self) -> usize {
        self.num_flagged[FlagKind::Fixed.slot()]
    }

    pub fn num_bounded(&self) -> usize {
        self.num_flagged[FlagKind::Bounded.slot()]
    }

    pub fn num_sparse(&self) -> usize {
        self.num_flagged[FlagKind::Sparse.slot()]
    }

    /// Every quantity of every element.
    pub fn var_refs(&self) -> Vec<VarRef> {
        let mut vars = Vec::new();
        for i in 0..self.buses.len() {
            vars.extend(BusVar::ALL.iter().map(|&v| VarRef::Bus(i, v)));
        }
        for i in 0..self.branches.len() {
            vars.extend(BranchVar::ALL.iter().map(|&v| VarRef::Branch(i, v)));
        }
        for i in 0..self.gens.len() {
            vars.extend(GenVar::ALL.iter().map(|&v| VarRef::Gen(i, v)));
        }
        for i in 0..self.loads.len() {
            vars.extend(LoadVar::ALL.iter().map(|&v| VarRef::Load(i, v)));
        }
        for i in 0..self.shunts.len() {
            vars.extend(ShuntVar::ALL.iter().map(|&v| VarRef::Shunt(i, v)));
        }
        vars
    }

    pub fn var_index(&self, var: VarRef, t: usize) -> Option<usize> {
        match var {
            VarRef::Bus(i, q) => self.buses[i].var_index(q, t),
            VarRef::Branch(i, q) => self.branches[i].var_index(q, t),
            VarRef::Gen(i, q) => self.gens[i].var_index(q, t),
            VarRef::Load(i, q) => self.loads[i].var_index(q, t),
            VarRef::Shunt(i, q) => self.shunts[i].var_index(q, t),
        }
    }

    pub fn has_flags(&self, var: VarRef, kind: FlagKind) -> bool {
        match var {
            VarRef::Bus(i, q) => self.buses[i].has_flags(kind, q.mask()),
            VarRef::Branch(i, q) => self.branches[i].has_flags(kind, q.mask()),
            VarRef::Gen(i, q) => self.gens[i].has_flags(kind, q.mask()),
            VarRef::Load(i, q) => self.loads[i].has_flags(kind, q.mask()),
            VarRef::Shunt(i, q) => self.shunts[i].has_flags(kind, q.mask()),
        }
    }

    /// Value of a quantity stored in the network.
    pub fn value(&self, var: VarRef, t: usize) -> f64 {
        match var {
            VarRef::Bus(i, q) => self.buses[i].value(q, t),
            VarRef::Branch(i, q) => self.branches[i].value(q, t),
            VarRef::Gen(i, q) => self.gens[i].value(q, t),
            VarRef::Load(i, q) => self.loads[i].value(q, t),
            VarRef::Shunt(i, q) => self.shunts[i].value(q, t),
        }
    }

    /// Value of a quantity taken from `x` when it is a variable and a point
    /// is given, otherwise from the network.
    pub fn value_at(&self, var: VarRef, t: usize, x: Option<&[f64]>) -> f64 {
        match (x, self.var_index(var, t)) {
            (Some(x), Some(i)) => x[i],
            _ => self.value(var, t),
        }
    }

    pub fn set_value(&mut self, var: VarRef, t: usize, value: f64) {
        match var {
            VarRef::Bus(i, q) => self.buses[i].set_value(q, t, value),
            VarRef::Branch(i, q) => self.branches[i].set_value(q, t, value),
            VarRef::Gen(i, q) => self.gens[i].set_value(q, t, value),
            VarRef::Load(i, q) => self.loads[i].set_value(q, t, value),
            VarRef::Shunt(i, q) => self.shunts[i].set_value(q, t, value),
        }
    }

    /// Lower and upper limits of a quantity.
    pub fn limits(&self, var: VarRef) -> (f64, f64) {
        match var {
            VarRef::Bus(i, q) => self.buses[i].limits(q),
            VarRef::Branch(i, q) => self.branches[i].limits(q),
            VarRef::Gen(i, q) => self.gens[i].limits(q),
            VarRef::Load(i, q) => self.loads[i].limits(q),
            VarRef::Shunt(i, q) => self.shunts[i].limits(q),
        }
    }

    /// Stores the duals of the upper and lower bounds of a quantity. Only
    /// quantities with bound sensitivities keep them.
    pub fn set_bound_sens(&mut self, var: VarRef, t: usize, upper: f64, lower: f64) {
        match var {
            VarRef::Bus(i, q) => self.buses[i].set_bound_sens(q, t, upper, lower),
            VarRef::Gen(i, q) => self.gens[i].set_bound_sens(q, t, upper, lower),
            _ => {}
        }
    }

    /// Returns a vector of length `num_vars` with the current values or the
    /// limits of all variables.
    pub fn get_var_values(&self, code: VarValues) -> Vec<f64> {
        let mut values = vec![0.0; self.num_vars()];
        for var in self.var_refs() {
            for t in 0..self.num_periods {
                if let Some(i) = self.var_index(var, t) {
                    values[i] = match code {
                        VarValues::Current => self.value(var, t),
                        VarValues::UpperLimits => self.limits(var).1,
                        VarValues::LowerLimits => self.limits(var).0,
                    };
                }
            }
        }
        values
    }

    /// Writes the variable values of `x` into the network elements.
    pub fn set_var_values(&mut self, x: &[f64]) -> Result<(), NetworkError> {
        if x.len() != self.num_vars() {
            return Err(NetworkError::InvalidVectorSize {
                expected: self.num_vars(),
                actual: x.len(),
            });
        }
        for var in self.var_refs() {
            for t in 0..self.num_periods {
                if let Some(i) = self.var_index(var, t) {
                    self.set_value(var, t, x[i]);
                }
            }
        }
        Ok(())
    }

    /// Variable indices of the local variables of a branch flow.
    pub(crate) fn flow_cols(&self, br: usize, t: usize) -> [Option<usize>; NUM_LOCAL] {
        let branch = &self.branches[br];
        let mut cols = [None; NUM_LOCAL];
        cols[VK] = self.var_index(VarRef::Bus(branch.bus_k, BusVar::VMag), t);
        cols[VM] = self.var_index(VarRef::Bus(branch.bus_m, BusVar::VMag), t);
        cols[WK] = self.var_index(VarRef::Bus(branch.bus_k, BusVar::VAng), t);
        cols[WM] = self.var_index(VarRef::Bus(branch.bus_m, BusVar::VAng), t);
        cols[RATIO] = self.var_index(VarRef::Branch(br, BranchVar::Ratio), t);
        cols[PHASE] = self.var_index(VarRef::Branch(br, BranchVar::Phase), t);
        cols
    }

    /// Values of the local variables of a branch flow.
    pub(crate) fn flow_point(&self, br: usize, t: usize, x: Option<&[f64]>) -> [f64; NUM_LOCAL] {
        let branch = &self.branches[br];
        let mut z = [0.0; NUM_LOCAL];
        z[VK] = self.value_at(VarRef::Bus(branch.bus_k, BusVar::VMag), t, x);
        z[VM] = self.value_at(VarRef::Bus(branch.bus_m, BusVar::VMag), t, x);
        z[WK] = self.value_at(VarRef::Bus(branch.bus_k, BusVar::VAng), t, x);
        z[WM] = self.value_at(VarRef::Bus(branch.bus_m, BusVar::VAng), t, x);
        z[RATIO] = self.value_at(VarRef::Branch(br, BranchVar::Ratio), t, x);
        z[PHASE] = self.value_at(VarRef::Branch(br, BranchVar::Phase), t, x);
        z
    }

    /// Checks the network for duplicate bus numbers, dangling references
    /// and islands.
    pub fn check(&mut self) -> Result<(), NetworkError> {
        let result = self.check_topology();
        if let Err(err) = &result {
            log::warn!("network check failed: {}", err);
            self.error = Some(err.to_string());
        }
        result
    }

    fn check_topology(&self) -> Result<(), NetworkError> {
        let mut numbers = HashSet::new();
        for bus in &self.buses {
            if !numbers.insert(bus.number) {
                return Err(NetworkError::DuplicateBus(bus.number));
            }
        }

        let nb = self.buses.len();
        for br in &self.branches {
            for bus in [Some(br.bus_k), Some(br.bus_m), br.reg_bus].into_iter().flatten() {
                self.check_bus_ref(ObjType::Branch, br.index, bus)?;
            }
        }
        for gen in &self.gens {
            for bus in [Some(gen.bus), gen.reg_bus].into_iter().flatten() {
                self.check_bus_ref(ObjType::Gen, gen.index, bus)?;
            }
        }
        for load in &self.loads {
            self.check_bus_ref(ObjType::Load, load.index, load.bus)?;
        }
        for shunt in &self.shunts {
            for bus in [Some(shunt.bus), shunt.reg_bus].into_iter().flatten() {
                self.check_bus_ref(ObjType::Shunt, shunt.index, bus)?;
            }
        }

        if nb == 0 {
            return Ok(());
        }
        let mut visited = vec![false; nb];
        let mut queue = VecDeque::from([0]);
        visited[0] = true;
        while let Some(i) = queue.pop_front() {
            for &br in &self.buses[i].branches {
                let br = &self.branches[br];
                if br.is_on_outage() {
                    continue;
                }
                let j = if br.bus_k == i { br.bus_m } else { br.bus_k };
                if !visited[j] {
                    visited[j] = true;
                    queue.push_back(j);
                }
            }
        }
        let unreachable = visited.iter().filter(|v| !**v).count();
        if unreachable > 0 {
            return Err(NetworkError::Disconnected(unreachable, self.buses[0].number));
        }
        Ok(())
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_string(&self) -> &str {
        self.error.as_deref().unwrap_or("")
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn properties(&self) -> &NetProperties {
        &self.properties
    }

    pub fn clear_properties(&mut self) {
        let nt = self.num_periods;
        let nb = self.buses.len();
        self.properties.reset(nt);
        self.mis_p = vec![0.0; nb * nt];
        self.mis_q = vec![0.0; nb * nt];
        self.prop_counted.reset(nb, nt);
    }

    /// Largest active power mismatch (p.u.) over buses at period `t`.
    pub fn bus_p_mis(&self, t: usize) -> f64 {
        let nt = self.num_periods;
        (0..self.buses.len()).fold(0.0, |m: f64, i| m.max(self.mis_p[i * nt + t].abs()))
    }

    /// Largest reactive power mismatch (p.u.) over buses at period `t`.
    pub fn bus_q_mis(&self, t: usize) -> f64 {
        let nt = self.num_periods;
        (0..self.buses.len()).fold(0.0, |m: f64, i| m.max(self.mis_q[i * nt + t].abs()))
    }

    /// Updates the mutable properties with the contributions of branch `br`
    /// at period `t` evaluated at `x`.
    pub fn update_properties_step(&mut self, br: usize, t: usize, x: &[f64]) {
        let nt = self.num_periods;
        let branch = &self.branches[br];
        let (bus_k, bus_m) = (branch.bus_k, branch.bus_m);

        if !branch.is_on_outage() {
            let z = self.flow_point(br, t, Some(x));
            for (side, bus) in [(Side::K, bus_k), (Side::M, bus_m)] {
                let p = branch_flow(branch, side, Power::Active, &z).value;
                let q = branch_flow(branch, side, Power::Reactive, &z).value;
                self.mis_p[bus * nt + t] -= p;
                self.mis_q[bus * nt + t] -= q;
            }

            let props = &mut self.properties;
            if branch.is_tap_changer() {
                let r = z[RATIO];
                let r_vio = (r - branch.ratio_max).max(branch.ratio_min - r).max(0.0);
                props.tran_r_vio[t] = props.tran_r_vio[t].max(r_vio);
                if is_control_action(r, branch.ratio[t], branch.ratio_max - branch.ratio_min) {
                    props.num_actions[t] += 1;
                }
            }
            if branch.is_phase_shifter() {
                let a = z[PHASE];
                let p_vio = (a - branch.phase_max).max(branch.phase_min - a).max(0.0);
                props.tran_p_vio[t] = props.tran_p_vio[t].max(p_vio);
                if is_control_action(a, branch.phase[t], branch.phase_max - branch.phase_min) {
                    props.num_actions[t] += 1;
                }
            }
        }

        for i in [bus_k, bus_m] {
            if !self.prop_counted.mark(i, t) {
                continue;
            }
            let bus = &self.buses[i];
            let v = self.value_at(VarRef::Bus(i, BusVar::VMag), t, Some(x));
            let mut dp = 0.0;
            let mut dq = 0.0;
            let mut p_vio: f64 = 0.0;
            let mut q_vio: f64 = 0.0;
            let mut b_vio: f64 = 0.0;
            let mut actions = 0;

            for &g in bus.gens() {
                let gen = &self.gens[g];
                if gen.is_on_outage() {
                    continue;
                }
                let p = self.value_at(VarRef::Gen(g, GenVar::P), t, Some(x));
                let q = self.value_at(VarRef::Gen(g, GenVar::Q), t, Some(x));
                dp += p;
                dq += q;
                p_vio = p_vio.max(p - gen.p_max).max(gen.p_min - p);
                q_vio = q_vio.max(q - gen.q_max).max(gen.q_min - q);
                if gen.is_regulator() && is_control_action(q, gen.q[t], gen.q_max - gen.q_min) {
                    actions += 1;
                }
            }
            for &l in bus.loads() {
                dp -= self.value_at(VarRef::Load(l, LoadVar::P), t, Some(x));
                dq -= self.value_at(VarRef::Load(l, LoadVar::Q), t, Some(x));
            }
            for &s in bus.shunts() {
                let shunt = &self.shunts[s];
                let b = self.value_at(VarRef::Shunt(s, ShuntVar::Susc), t, Some(x));
                dp -= shunt.g * v * v;
                dq += b * v * v;
                if shunt.is_switched_v() {
                    b_vio = b_vio.max(b - shunt.b_max).max(shunt.b_min - b);
                    if is_control_action(b, shunt.b[t], shunt.b_max - shunt.b_min) {
                        actions += 1;
                    }
                }
            }
            let v_vio = (v - bus.v_max).max(bus.v_min - v).max(0.0);
            let v_dev = if bus.is_regulated_by_gen() {
                (v - bus.v_set[t]).abs()
            } else {
                0.0
            };
            let regulated_vio = |regulated: bool| if regulated { v_vio } else { 0.0 };
            let tran_v_vio = regulated_vio(bus.is_regulated_by_tran());
            let shunt_v_vio = regulated_vio(bus.is_regulated_by_shunt());

            self.mis_p[i * nt + t] += dp;
            self.mis_q[i * nt + t] += dq;
            let props = &mut self.properties;
            props.bus_v_max[t] = props.bus_v_max[t].max(v);
            props.bus_v_min[t] = props.bus_v_min[t].min(v);
            props.bus_v_vio[t] = props.bus_v_vio[t].max(v_vio);
            props.gen_p_vio[t] = props.gen_p_vio[t].max(p_vio);
            props.gen_q_vio[t] = props.gen_q_vio[t].max(q_vio);
            props.gen_v_dev[t] = props.gen_v_dev[t].max(v_dev);
            props.tran_v_vio[t] = props.tran_v_vio[t].max(tran_v_vio);
            props.shunt_v_vio[t] = props.shunt_v_vio[t].max(shunt_v_vio);
            props.shunt_b_vio[t] = props.shunt_b_vio[t].max(b_vio);
            props.num_actions[t] += actions;
        }
    }

    pub fn clear_sensitivities(&mut self) {
        self.buses.iter_mut().for_each(|b| b.clear_sensitivities());
        self.gens.iter_mut().for_each(|g| g.clear_sensitivities());
    }

    /// Sets the voltage set point of generator regulated buses to their
    /// current voltage magnitude.
    pub fn update_set_points(&mut self) {
        for bus in self.buses.iter_mut().filter(|b| b.is_regulated_by_gen()) {
            bus.v_set = bus.v_mag.clone();
        }
    }

    /// Moves the active power of in-service slack generators to an equal
    /// share of their total, and places in-service regulating generators
    /// at the same relative position within their reactive limits while
    /// keeping the total of each regulated bus.
    pub fn adjust_generators(&mut self) {
        let gens = &mut self.gens;
        for bus in &self.buses {
            let slack: Vec<usize> = if bus.is_slack() {
                bus.gens.iter().copied().filter(|&g| !gens[g].is_on_outage()).collect()
            } else {
                Vec::new()
            };
            let reg: Vec<usize> = bus
                .reg_gens
                .iter()
                .copied()
                .filter(|&g| !gens[g].is_on_outage())
                .collect();

            for t in 0..self.num_periods {
                if !slack.is_empty() {
                    let p = slack.iter().map(|&g| gens[g].p[t]).sum::<f64>() / slack.len() as f64;
                    slack.iter().for_each(|&g| gens[g].p[t] = p);
                }
                if !reg.is_empty() {
                    let q: f64 = reg.iter().map(|&g| gens[g].q[t]).sum();
                    let q_min: f64 = reg.iter().map(|&g| gens[g].q_min).sum();
                    let dq: f64 = reg.iter().map(|&g| q_range(&gens[g])).sum();
                    let frac = (q - q_min) / dq;
                    for &g in &reg {
                        gens[g].q[t] = gens[g].q_min + frac * q_range(&gens[g]);
                    }
                }
            }
        }
    }

    /// Total active power of in-service generators (p.u.) at period `t`.
    pub fn total_gen_p(&self, t: usize) -> f64 {
        self.gens.iter().filter(|g| !g.is_on_outage()).map(|g| g.p[t]).sum()
    }

    /// Total reactive power of in-service generators (p.u.) at period `t`.
    pub fn total_gen_q(&self, t: usize) -> f64 {
        self.gens.iter().filter(|g| !g.is_on_outage()).map(|g| g.q[t]).sum()
    }

    pub fn total_load_p(&self, t: usize) -> f64 {
        self.loads.iter().map(|l| l.p[t]).sum()
    }

    pub fn total_load_q(&self, t: usize) -> f64 {
        self.loads.iter().map(|l| l.q[t]).sum()
    }

    /// JSON document with the network dimensions and every element.
    pub fn json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string(&serde_json::json!({
            "base_power": self.base_power,
            "num_periods": self.num_periods,
            "buses": self.buses,
            "branches": self.branches,
            "generators": self.gens,
            "loads": self.loads,
            "shunts": self.shunts,
        }))
    }

    pub fn num_slack_buses(&self) -> usize {
        self.buses.iter().filter(|b| b.is_slack()).count()
    }

    pub fn num_buses_reg_by_gen(&self) -> usize {
        self.buses.iter().filter(|b| b.is_regulated_by_gen()).count()
    }

    pub fn num_reg_gens(&self) -> usize {
        self.gens.iter().filter(|g| g.is_regulator()).count()
    }

    pub fn num_slack_gens(&self) -> usize {
        self.gens
            .iter()
            .filter(|g| self.buses[g.bus].is_slack())
            .count()
    }

    pub fn num_tap_changers_v(&self) -> usize {
        self.branches.iter().filter(|br| br.is_tap_changer_v()).count()
    }

    pub fn num_phase_shifters(&self) -> usize {
        self.branches.iter().filter(|br| br.is_phase_shifter()).count()
    }

    pub fn num_switched_shunts(&self) -> usize {
        self.shunts.iter().filter(|s| s.is_switched_v()).count()
    }
}

fn q_range(gen: &Gen) -> f64 {
    (gen.q_max - gen.q_min).max(MIN_Q_RANGE)
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Network")?;
        writeln!(f, "  base power   : {} MVA", format_f64(self.base_power))?;
        writeln!(f, "  periods      : {}", self.num_periods)?;
        writeln!(f, "  buses        : {}", self.buses.len())?;
        writeln!(f, "    slack      : {}", self.num_slack_buses())?;
        writeln!(f, "    reg by gen : {}", self.num_buses_reg_by_gen())?;
        writeln!(f, "  branches     : {}", self.branches.len())?;
        writeln!(f, "    tap chg v  : {}", self.num_tap_changers_v())?;
        writeln!(f, "    phase shft : {}", self.num_phase_shifters())?;
        writeln!(f, "  generators   : {}", self.gens.len())?;
        writeln!(f, "  loads        : {}", self.loads.len())?;
        writeln!(f, "  shunts       : {}", self.shunts.len())?;
        writeln!(f, "  variables    : {}", self.num_vars())?;
        writeln!(f, "  fixed        : {}", self.num_fixed())?;
        write!(f, "  bounded      : {}", self.num_bounded())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::cases;

    #[test]
    fn test_set_flags_assigns_consecutive_indices() {
        let mut net = cases::three_bus(2);

        net.set_flags(ObjType::Bus, FlagKind::Vars, BUS_PROP_NOT_SLACK, BUS_VAR_VMAG | BUS_VAR_VANG);
        assert_eq!(net.num_vars(), 2 * 2 * 2);
        let bus = net.bus(1);
        assert_eq!(bus.var_index(BusVar::VMag, 0), Some(0));
        assert_eq!(bus.var_index(BusVar::VMag, 1), Some(1));
        assert_eq!(bus.var_index(BusVar::VAng, 0), Some(2));

        // flags are monotonic, so repeating the call allocates nothing
        net.set_flags(ObjType::Bus, FlagKind::Vars, BUS_PROP_ANY, BUS_VAR_VMAG);
        assert_eq!(net.num_vars(), 8 + 2);
        assert_eq!(net.bus(0).var_index(BusVar::VMag, 0), Some(8));

        net.set_flags(ObjType::Gen, FlagKind::Fixed, GEN_PROP_ANY, GEN_VAR_P);
        assert_eq!(net.num_vars(), 10);
        assert_eq!(net.num_fixed(), net.gens().len() * 2);
        assert_eq!(net.gen(0).var_index(GenVar::P, 0), None);

        net.clear_flags();
        assert_eq!(net.num_vars(), 0);
        assert_eq!(net.bus(1).var_index(BusVar::VMag, 0), None);
    }

    #[test]
    fn test_var_values_round_trip() -> Result<(), NetworkError> {
        let mut net = cases::three_bus(1);
        net.set_flags(ObjType::Bus, FlagKind::Vars, BUS_PROP_ANY, BUS_VAR_VMAG | BUS_VAR_VDEV);
        net.set_flags(ObjType::Gen, FlagKind::Vars, GEN_PROP_ANY, GEN_VAR_P | GEN_VAR_Q);

        let x: Vec<f64> = (0..net.num_vars()).map(|i| 0.1 * i as f64).collect();
        net.set_var_values(&x)?;
        assert_eq!(net.get_var_values(VarValues::Current), x);

        let upper = net.get_var_values(VarValues::UpperLimits);
        let lower = net.get_var_values(VarValues::LowerLimits);
        let i = net.bus(0).var_index(BusVar::VMag, 0).unwrap();
        assert_eq!((lower[i], upper[i]), (net.bus(0).v_min, net.bus(0).v_max));

        assert!(net.set_var_values(&x[1..]).is_err());
        Ok(())
    }

    #[test]
    fn test_check() {
        let mut net = cases::three_bus(1);
        assert!(net.check().is_ok());

        net.add_bus(Bus::new(99));
        assert_eq!(net.check(), Err(NetworkError::Disconnected(1, 1)));
        assert!(net.has_error());

        let mut net = cases::three_bus(1);
        net.add_bus(Bus::new(2));
        assert_eq!(net.check(), Err(NetworkError::DuplicateBus(2)));
    }

    #[test]
    fn test_bad_reference() {
        let mut net = cases::three_bus(1);
        let err = net.add_gen(Gen::new(7)).unwrap_err();
        assert_eq!(
            err,
            NetworkError::BadBusReference {
                obj: ObjType::Gen,
                index: net.gens().len(),
                bus: 7
            }
        );
    }

    #[test]
    fn test_properties_at_flat_start() {
        let mut net = cases::two_bus();
        net.clear_properties();
        let x = net.get_var_values(VarValues::Current);
        net.update_properties_step(0, 0, &x);

        let props = net.properties();
        assert_eq!(props.bus_v_max[0], 1.0);
        assert_eq!(props.bus_v_min[0], 1.0);
        // load of 0.5 p.u. not yet supplied
        assert!((net.bus_p_mis(0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_control_properties() {
        let mut net = cases::four_bus(1);
        cases::set_all_vars(&mut net);
        let mut x = net.get_var_values(VarValues::Current);

        let mut set = |net: &Network, var: VarRef, value: f64| {
            x[net.var_index(var, 0).unwrap()] = value;
        };
        set(&net, VarRef::Bus(1, BusVar::VMag), 1.04);
        set(&net, VarRef::Bus(2, BusVar::VMag), 1.15);
        set(&net, VarRef::Branch(1, BranchVar::Ratio), 1.15);
        set(&net, VarRef::Shunt(0, ShuntVar::Susc), 0.35);
        set(&net, VarRef::Gen(1, GenVar::Q), 0.15);
        // slack gen output is not a regulating control action
        set(&net, VarRef::Gen(0, GenVar::P), 0.9);

        net.clear_properties();
        for br in 0..net.branches().len() {
            net.update_properties_step(br, 0, &x);
        }

        let props = net.properties();
        assert_abs_diff_eq!(props.gen_v_dev[0], 0.03, epsilon = 1e-12);
        assert_abs_diff_eq!(props.tran_v_vio[0], 0.05, epsilon = 1e-12);
        assert_abs_diff_eq!(props.tran_r_vio[0], 0.05, epsilon = 1e-12);
        assert_eq!(props.tran_p_vio[0], 0.0);
        assert_eq!(props.shunt_v_vio[0], 0.0);
        assert_abs_diff_eq!(props.shunt_b_vio[0], 0.05, epsilon = 1e-12);
        // ratio, shunt susceptance and one regulating gen
        assert_eq!(props.num_actions[0], 3);

        net.clear_properties();
        let x = net.get_var_values(VarValues::Current);
        for br in 0..net.branches().len() {
            net.update_properties_step(br, 0, &x);
        }
        assert_eq!(net.properties().num_actions[0], 0);
        assert_eq!(net.properties().tran_r_vio[0], 0.0);
    }

    #[test]
    fn test_outaged_branch_controls_are_ignored() {
        let mut net = cases::four_bus(1);
        cases::set_all_vars(&mut net);
        net.branch_mut(1).outage = true;
        let mut x = net.get_var_values(VarValues::Current);
        x[net.var_index(VarRef::Branch(1, BranchVar::Ratio), 0).unwrap()] = 1.2;

        net.clear_properties();
        for br in 0..net.branches().len() {
            net.update_properties_step(br, 0, &x);
        }
        assert_eq!(net.properties().tran_r_vio[0], 0.0);
        assert_eq!(net.properties().num_actions[0], 0);
    }

    #[test]
    fn test_totals() {
        let mut net = cases::four_bus(1);
        assert_abs_diff_eq!(net.total_gen_p(0), 1.3, epsilon = 1e-12);
        assert_abs_diff_eq!(net.total_gen_q(0), 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(net.total_load_p(0), 1.3, epsilon = 1e-12);
        assert_abs_diff_eq!(net.total_load_q(0), 0.45, epsilon = 1e-12);

        net.gen_mut(2).outage = true;
        assert_abs_diff_eq!(net.total_gen_p(0), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(net.total_gen_q(0), 0.05, epsilon = 1e-12);
    }

    #[test]
    fn test_adjust_generators() {
        let mut net = cases::four_bus(1);
        let slack = net
            .add_gen(Gen {
                p: vec![0.3],
                ..Gen::new(0)
            })
            .unwrap();
        net.adjust_generators();

        assert_abs_diff_eq!(net.gen(0).p[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(net.gen(slack).p[0], 0.5, epsilon = 1e-12);

        // both regulators have the range [-0.2, 0.4]: total 0.2 splits evenly
        let (g1, g2) = (net.gen(1), net.gen(2));
        assert_abs_diff_eq!(g1.q[0], 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(g2.q[0], 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(net.total_gen_q(0), 0.2, epsilon = 1e-12);

        net.gen_mut(2).q_max = 1.0;
        net.gen_mut(2).q[0] = 0.3;
        net.adjust_generators();
        let (g1, g2) = (net.gen(1), net.gen(2));
        let pos = |g: &Gen| (g.q[0] - g.q_min) / (g.q_max - g.q_min);
        assert_abs_diff_eq!(pos(g1), pos(g2), epsilon = 1e-12);
        assert_abs_diff_eq!(g1.q[0] + g2.q[0], 0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_json_carries_index() -> serde_json::Result<()> {
        let net = cases::four_bus(2);

        let gen: serde_json::Value = serde_json::from_str(&net.gen(2).json_string()?)?;
        assert_eq!(gen["index"], 2);
        assert_eq!(gen["bus"], 1);
        assert_eq!(gen["q"].as_array().map(|q| q.len()), Some(2));
        assert!(gen.get("flags").is_none());

        let branch: serde_json::Value = serde_json::from_str(&net.branch(1).json_string()?)?;
        assert_eq!(branch["index"], 1);
        assert_eq!(branch["kind"], "TapChanger");

        let doc: serde_json::Value = serde_json::from_str(&net.json_string()?)?;
        assert_eq!(doc["num_periods"], 2);
        assert_eq!(doc["buses"][3]["index"], 3);
        assert_eq!(doc["shunts"][0]["index"], 0);
        assert_eq!(doc["loads"].as_array().map(|l| l.len()), Some(2));
        Ok(())
    }
}
