#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod event;
mod is_master;
pub mod message;
pub mod options;
pub mod pool;
pub(crate) mod runtime;
mod sdam;
pub mod selection_criteria;

pub use crate::{
    options::{ClusterSettings, ServerAddress},
    sdam::{
        Cluster,
        ClusterDescription,
        ClusterType,
        MovingAverage,
        Server,
        ServerDescription,
        ServerType,
    },
    selection_criteria::SelectionCriteria,
};
