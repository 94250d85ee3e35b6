use crate::{FlagKind, Flags, ObjType};

/// Bound used for quantities without a natural limit (p.u.).
pub const BOUND_INF: f64 = 1e8;

/// Selects which values `Network::get_var_values` extracts.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum VarValues {
    Current,
    UpperLimits,
    LowerLimits,
}

/// Scalar quantity of an element that may become a variable.
pub trait Quantity: Copy + 'static {
    const ALL: &'static [Self];

    /// Flag bit that controls this quantity.
    fn mask(self) -> u8;

    /// Position of this quantity in the element's index table.
    fn slot(self) -> usize;
}

/// Bus voltage magnitude.
pub const BUS_VAR_VMAG: u8 = 0x01;
/// Bus voltage angle.
pub const BUS_VAR_VANG: u8 = 0x02;
/// Bus voltage deviations above and below the set point.
pub const BUS_VAR_VDEV: u8 = 0x04;

#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum BusVar {
    VMag,
    VAng,
    /// Deviation above the set point.
    VH,
    /// Deviation below the set point.
    VL,
}

impl Quantity for BusVar {
    const ALL: &'static [Self] = &[BusVar::VMag, BusVar::VAng, BusVar::VH, BusVar::VL];

    fn mask(self) -> u8 {
        match self {
            BusVar::VMag => BUS_VAR_VMAG,
            BusVar::VAng => BUS_VAR_VANG,
            BusVar::VH | BusVar::VL => BUS_VAR_VDEV,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// Transformer tap ratio.
pub const BRANCH_VAR_RATIO: u8 = 0x01;
/// Phase shift angle.
pub const BRANCH_VAR_PHASE: u8 = 0x02;
/// Tap ratio deviations.
pub const BRANCH_VAR_RATIO_DEV: u8 = 0x04;

#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum BranchVar {
    Ratio,
    Phase,
    RatioY,
    RatioZ,
}

impl Quantity for BranchVar {
    const ALL: &'static [Self] = &[
        BranchVar::Ratio,
        BranchVar::Phase,
        BranchVar::RatioY,
        BranchVar::RatioZ,
    ];

    fn mask(self) -> u8 {
        match self {
            BranchVar::Ratio => BRANCH_VAR_RATIO,
            BranchVar::Phase => BRANCH_VAR_PHASE,
            BranchVar::RatioY | BranchVar::RatioZ => BRANCH_VAR_RATIO_DEV,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// Generator active power.
pub const GEN_VAR_P: u8 = 0x01;
/// Generator reactive power.
pub const GEN_VAR_Q: u8 = 0x02;

#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum GenVar {
    P,
    Q,
}

impl Quantity for GenVar {
    const ALL: &'static [Self] = &[GenVar::P, GenVar::Q];

    fn mask(self) -> u8 {
        match self {
            GenVar::P => GEN_VAR_P,
            GenVar::Q => GEN_VAR_Q,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// Load active power.
pub const LOAD_VAR_P: u8 = 0x01;
/// Load reactive power.
pub const LOAD_VAR_Q: u8 = 0x02;

#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum LoadVar {
    P,
    Q,
}

impl Quantity for LoadVar {
    const ALL: &'static [Self] = &[LoadVar::P, LoadVar::Q];

    fn mask(self) -> u8 {
        match self {
            LoadVar::P => LOAD_VAR_P,
            LoadVar::Q => LOAD_VAR_Q,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// Shunt susceptance.
pub const SHUNT_VAR_SUSC: u8 = 0x01;
/// Shunt susceptance deviations.
pub const SHUNT_VAR_SUSC_DEV: u8 = 0x02;

#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum ShuntVar {
    Susc,
    SuscY,
    SuscZ,
}

impl Quantity for ShuntVar {
    const ALL: &'static [Self] = &[ShuntVar::Susc, ShuntVar::SuscY, ShuntVar::SuscZ];

    fn mask(self) -> u8 {
        match self {
            ShuntVar::Susc => SHUNT_VAR_SUSC,
            ShuntVar::SuscY | ShuntVar::SuscZ => SHUNT_VAR_SUSC_DEV,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// VarRef addresses one quantity of one network element.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum VarRef {
    Bus(usize, BusVar),
    Branch(usize, BranchVar),
    Gen(usize, GenVar),
    Load(usize, LoadVar),
    Shunt(usize, ShuntVar),
}

impl VarRef {
    pub fn obj_type(&self) -> ObjType {
        match self {
            VarRef::Bus(..) => ObjType::Bus,
            VarRef::Branch(..) => ObjType::Branch,
            VarRef::Gen(..) => ObjType::Gen,
            VarRef::Load(..) => ObjType::Load,
            VarRef::Shunt(..) => ObjType::Shunt,
        }
    }
}

/// Index table of an element: the first variable index of each quantity.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct VarIndex {
    start: [Option<usize>; 4],
}

impl VarIndex {
    pub(crate) fn get<V: Quantity>(&self, var: V, t: usize) -> Option<usize> {
        self.start[var.slot()].map(|i| i + t)
    }

    pub(crate) fn clear(&mut self) {
        self.start = [None; 4];
    }

    /// Sets the bits of `mask` for `kind` and advances `index` by `nt` for
    /// every newly flagged quantity. Start indices are only recorded for
    /// variables.
    pub(crate) fn set_flags<V: Quantity>(
        &mut self,
        flags: &mut Flags,
        kind: FlagKind,
        mask: u8,
        mut index: usize,
        nt: usize,
    ) -> usize {
        let new = flags.insert(kind, mask);
        for &var in V::ALL {
            if new & var.mask() != 0 {
                if kind == FlagKind::Vars {
                    self.start[var.slot()] = Some(index);
                }
                index += nt;
            }
        }
        index
    }
}
