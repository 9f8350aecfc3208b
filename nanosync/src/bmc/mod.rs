//! Best master clock algorithm: the foreign master table, the dataset
//! comparison and the state decision.

pub mod acceptable_master;
pub(crate) mod bmca;
pub(crate) mod dataset_comparison;
pub(crate) mod foreign_master;
