use std::fmt;

use serde::{Deserialize, Serialize};

/// Smallest and largest copy number a construct slot may request.
pub const MIN_COPY_NUMBER: u8 = 1;
pub const MAX_COPY_NUMBER: u8 = 8;

/// Subcellular compartment an enzyme is targeted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Compartment {
    #[serde(rename = "c")]
    Cytosol,
    #[serde(rename = "m")]
    Mitochondria,
    #[serde(rename = "p")]
    Peroxisome,
}

impl Compartment {
    pub const ALL: [Compartment; 3] = [
        Compartment::Cytosol,
        Compartment::Mitochondria,
        Compartment::Peroxisome,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn code(self) -> &'static str {
        match self {
            Compartment::Cytosol => "c",
            Compartment::Mitochondria => "m",
            Compartment::Peroxisome => "p",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Compartment::Cytosol => 0,
            Compartment::Mitochondria => 1,
            Compartment::Peroxisome => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Compartment> {
        Self::ALL.get(index).copied()
    }
}

impl fmt::Display for Compartment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One slot of an enzyme construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructSlot {
    /// Index into the enzyme library.
    pub enzyme: usize,
    /// Expression copy number, always in `MIN_COPY_NUMBER..=MAX_COPY_NUMBER`.
    pub copy_number: u8,
    pub compartment: Compartment,
}

impl ConstructSlot {
    /// Round a raw head output to a valid copy number.
    pub fn copy_number_from_raw(raw: f32) -> u8 {
        // Truncation toward zero after adding one half, then clamped.
        let rounded = (raw + 0.5) as i32;
        rounded.clamp(MIN_COPY_NUMBER as i32, MAX_COPY_NUMBER as i32) as u8
    }
}

/// An action taken by either role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// Tumor pressure vector, each component roughly in `[-1, 1]`.
    Continuous(Vec<f32>),
    /// Sink designer construct, one record per slot.
    Construct(Vec<ConstructSlot>),
}

/// Shape of the policy head for a role, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionSpec {
    Continuous { dim: usize },
    Construct { slots: usize, n_enzymes: usize },
}

impl ActionSpec {
    /// Number of policy-head outputs this spec consumes.
    pub fn head_size(&self) -> usize {
        match *self {
            ActionSpec::Continuous { dim } => dim,
            ActionSpec::Construct { slots, n_enzymes } => slots * Self::slot_width(n_enzymes),
        }
    }

    /// Per-slot layout: enzyme logits, one raw copy number, compartment logits.
    pub fn slot_width(n_enzymes: usize) -> usize {
        n_enzymes + 1 + Compartment::COUNT
    }

    /// Whether `action` has the kind and arity this spec produces.
    pub fn accepts(&self, action: &Action) -> bool {
        match (self, action) {
            (ActionSpec::Continuous { dim }, Action::Continuous(values)) => values.len() == *dim,
            (ActionSpec::Construct { slots, n_enzymes }, Action::Construct(records)) => {
                records.len() == *slots && records.iter().all(|r| r.enzyme < *n_enzymes)
            }
            _ => false,
        }
    }
}
