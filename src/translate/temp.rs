use std::fmt;

/// An abstract register. The supply is unbounded; uniqueness within one
/// compilation run is the only contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Temp(u32);

impl fmt::Display for Temp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// A code or data address: either an external symbol referenced by name or a
/// freshly minted local label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Label {
    Named(String),
    Numbered(u32),
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Named(name) => f.write_str(name),
            Label::Numbered(n) => write!(f, "L{n}"),
        }
    }
}

/// Mints unique temps and labels, monotonically, for a whole compilation run.
#[derive(Debug, Default)]
pub struct TempFactory {
    next_temp: u32,
    next_label: u32,
}

impl TempFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_temp(&mut self) -> Temp {
        let temp = Temp(self.next_temp);
        self.next_temp += 1;
        temp
    }

    pub fn new_label(&mut self) -> Label {
        let label = Label::Numbered(self.next_label);
        self.next_label += 1;
        label
    }

    pub fn named_label(&self, name: impl Into<String>) -> Label {
        Label::Named(name.into())
    }
}
