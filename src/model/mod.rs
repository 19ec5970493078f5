//! The data model of §3: datasource tables, feature tables, reservations,
//! sync bookmarks, and persisted decisions, all joined by natural key
//! (hostname / UUID) rather than foreign key — integrity is maintained by
//! each owner's replace-all or delta discipline, not by the schema.

pub mod aggregate;
pub mod decision;
pub mod feature;
pub mod flavor;
pub mod hypervisor;
pub mod ids;
pub mod metric_sample;
pub mod migration;
pub mod reservation;
pub mod resource_provider;
pub mod schema;
pub mod server;
pub mod storage_pool;
pub mod sync_bookmark;

pub use aggregate::Aggregate;
pub use decision::NewDecision;
pub use flavor::Flavor;
pub use hypervisor::Hypervisor;
pub use ids::{FlavorName, HostName, ProjectId, ResourceProviderId};
pub use migration::Migration;
pub use reservation::Reservation;
pub use resource_provider::ResourceProvider;
pub use server::Server;
pub use storage_pool::StoragePool;
pub use sync_bookmark::SyncBookmark;
