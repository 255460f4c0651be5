/// Contains the writer for the per-generation likelihood table
pub mod profile_writer;
/// Contains the writer for the final estimate
pub mod summary_writer;
