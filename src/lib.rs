
/// CLI functionality and checks
pub mod cli;
/// Contains the model and side types shared by every stage of the estimate
pub mod data_types;
/// Generation search, stop rule, and credible interval
pub mod generation_search;
/// Per-generation likelihood of the sample, split into carrier and non-carrier terms
pub mod likelihood;
/// Closed-form recombination and mutation probabilities, plus Kosambi mapping
pub mod probability;
/// Genetic map loading and mean recombination rates between two positions
pub mod recombination_map;
/// Contains all the various output writer functionality
pub mod writers;
