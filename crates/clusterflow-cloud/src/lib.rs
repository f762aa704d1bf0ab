//! clusterflow resource graph
//!
//! Provider-neutral model of the declarations handed to the orchestrator.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 cflow render                  │
//! └──────────────────────┬───────────────────────┘
//!                        │
//! ┌──────────────────────▼───────────────────────┐
//! │               clusterflow-kube                │
//! │      MicroK8s / Talos flows, add-ons          │
//! └───────┬──────────────┬──────────────┬────────┘
//!         │              │              │
//! ┌───────▼──────┐ ┌─────▼──────┐ ┌─────▼──────┐
//! │   proxmox    │ │ cloudflare │ │  opnsense  │
//! └───────┬──────┘ └─────┬──────┘ └─────┬──────┘
//!         └──────────────┼──────────────┘
//! ┌──────────────────────▼───────────────────────┐
//! │              clusterflow-cloud                │
//! │  Resource · Program · expr · Plan · command   │
//! └──────────────────────────────────────────────┘
//! ```

pub mod action;
pub mod command;
pub mod error;
pub mod expr;
pub mod program;
pub mod resource;

pub use action::{Action, ActionType, Plan, PlanSummary};
pub use command::{CLI_BINARY, CommandSpec, Connection, Logging, delay};
pub use error::{CloudError, Result};
pub use program::{CREDENTIAL_PROPERTIES, ConfigKey, Export, Program, Variable};
pub use resource::{Resource, ResourceOptions, ResourceRef};
