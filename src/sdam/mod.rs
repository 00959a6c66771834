mod cluster;
mod description;
mod message_manager;
mod monitor;
mod server;

#[cfg(test)]
mod test;

pub use self::{
    cluster::Cluster,
    description::{
        cluster::{ClusterDescription, ClusterType},
        server::{MovingAverage, ServerDescription, ServerType},
    },
    server::Server,
};
