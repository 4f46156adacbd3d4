//! A simulator for the [Dynamic Source Routing](https://www.rfc-editor.org/rfc/rfc4728) protocol.
//!
//! Nodes discover multi-hop paths on demand: a route request floods the network, accumulating the
//! path it travels along, and the destination answers with a route reply that unwinds along the
//! reverse of that path back to the requester.
//!
//! The crate is split in two layers:
//!
//! 1. The protocol and topology logic, which does no I/O: [`DsrRouter`] is a per-node state
//!    machine consuming packets and returning the dispatch the node should perform, and
//!    [`topology::generate`] produces random connected graphs with bounded edge connectivity.
//! 2. The `sync` feature (on by default) adds [`Network`], which runs every node as its own Tokio
//!    task with a private mailbox and reports protocol activity through an [`Observer`].
//!
//! Notable differences with RFC 4728:
//!
//! 1. Only route discovery is simulated, there is no data forwarding or route maintenance.
//! 2. Every discovery starts from empty route caches, cached routes are never used to answer a
//!    request.

#![cfg_attr(doc_cfg, feature(doc_cfg))]

pub mod config;
pub mod dsr;
pub mod error;
#[cfg(feature = "sync")]
#[cfg_attr(doc_cfg, doc(cfg(feature = "sync")))]
pub mod network;
pub mod topology;

mod core;

pub use crate::{
    config::Config,
    core::{
        id::{ids, NodeId, RequestId},
        packet,
        traits::{NoopObserver, Observer},
    },
    dsr::DsrRouter,
    error::{Error, Result},
    topology::{Graph, GraphInfo},
};
#[cfg(feature = "sync")]
pub use crate::network::Network;
