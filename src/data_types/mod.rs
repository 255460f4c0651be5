/// Model file parsing, longest shared segment trimming, and the immutable model
pub mod model;
/// The two flanking sides of the mutation
pub mod side;
