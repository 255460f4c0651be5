/// The two flanking regions around the mutation, each analyzed as an independent haplotype.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, strum_macros::Display, strum_macros::EnumIter)]
pub enum Side {
    /// Markers upstream of the mutation
    #[strum(serialize = "left")]
    Left=0,
    /// Markers downstream of the mutation
    #[strum(serialize = "right")]
    Right
}

impl Side {
    /// Index of this side in any two-element per-side storage
    pub fn index(self) -> usize {
        self as usize
    }
}
