//! `shopfloor-recon` - Reconciliation engine for shop-floor imports.
//!
//! Links purchase orders to jobs and regenerates the derived tables (vendor
//! operations, work-center registry, job timelines) from the raw job, SAP
//! operation, purchase-order and shipment-log tables. Storage is behind the
//! `Store` trait; no CLI or database dependencies.

pub mod alias;
pub mod config;
pub mod digest;
pub mod engine;
pub mod error;
pub mod linker;
pub mod matcher;
pub mod memory;
pub mod model;
pub mod raw;
pub mod report;
pub mod schema;
pub mod store;
pub mod timeline;
pub mod vendor_ops;
pub mod work_centers;

pub use alias::{AliasTable, Field, FieldResolver};
pub use config::{ReconConfig, VendorCenters};
pub use engine::{run_all, Reconciler};
pub use error::ReconError;
pub use matcher::{normalize, CanonicalId};
pub use memory::MemoryStore;
pub use report::{Report, StepName, StepReport, StepStatus, Verdict};
pub use store::{ColumnSpec, ColumnType, Filter, Row, Store, StoreError, TableState};
