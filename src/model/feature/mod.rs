//! Feature rows: one table per extractor, owned entirely by the extractor
//! framework (§4.2) and written via whole-table `ReplaceAll`. Each type
//! here is the fixed record the corresponding extractor's SQL is bound
//! to at compile time.

pub mod az;
pub mod capabilities;
pub mod contention;
pub mod noisy_projects;
pub mod utilization;

pub use az::HostAz;
pub use capabilities::HostCapabilities;
pub use contention::HostContention;
pub use noisy_projects::NoisyProject;
pub use utilization::HostUtilization;
