use std::fmt;

/// Kind of flag set on network quantities.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum FlagKind {
    /// Quantity is a decision variable.
    Vars,
    /// Quantity is pinned to its current value.
    Fixed,
    /// Quantity has simple bounds.
    Bounded,
    /// Quantity uses sparse control adjustments.
    Sparse,
}

impl FlagKind {
    pub const ALL: [FlagKind; 4] = [
        FlagKind::Vars,
        FlagKind::Fixed,
        FlagKind::Bounded,
        FlagKind::Sparse,
    ];

    pub(crate) fn slot(self) -> usize {
        match self {
            FlagKind::Vars => 0,
            FlagKind::Fixed => 1,
            FlagKind::Bounded => 2,
            FlagKind::Sparse => 3,
        }
    }
}

/// Network element type.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum ObjType {
    Bus,
    Branch,
    Gen,
    Load,
    Shunt,
}

impl fmt::Display for ObjType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObjType::Bus => "bus",
            ObjType::Branch => "branch",
            ObjType::Gen => "generator",
            ObjType::Load => "load",
            ObjType::Shunt => "shunt",
        };
        write!(f, "{}", s)
    }
}

/// Flags is the set of four quantity bitmasks carried by every element.
///
/// Bits are only ever added within a configuration epoch.
#[derive(Debug, Default, PartialEq, Eq, Copy, Clone)]
pub struct Flags {
    masks: [u8; 4],
}

impl Flags {
    pub fn get(&self, kind: FlagKind) -> u8 {
        self.masks[kind.slot()]
    }

    /// True if every bit of `mask` is set for `kind`.
    pub fn has(&self, kind: FlagKind, mask: u8) -> bool {
        mask != 0 && self.get(kind) & mask == mask
    }

    /// Adds the bits of `mask` and returns the bits that were not set before.
    pub fn insert(&mut self, kind: FlagKind, mask: u8) -> u8 {
        let slot = &mut self.masks[kind.slot()];
        let new = mask & !*slot;
        *slot |= mask;
        new
    }

    pub fn clear(&mut self) {
        self.masks = [0; 4];
    }
}
