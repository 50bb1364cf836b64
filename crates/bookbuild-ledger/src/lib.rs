//! # bookbuild-ledger
//!
//! In-memory implementations of the collaborators settlement runs against.
//!
//! - [`InMemoryNotary`]: sequencing oracle with a consumed-revision set
//! - [`InMemoryVault`]: one party's view of current records
//! - [`LocalNetwork`]: in-process sessions over tokio channels, plus broadcast
//!
//! They back the integration tests and the simulation binary. Production
//! deployments plug real services in behind the same
//! [`bookbuild_types::ports`] traits.

pub mod network;
pub mod notary;
pub mod vault;

pub use network::{ChannelSession, LocalNetwork};
pub use notary::InMemoryNotary;
pub use vault::InMemoryVault;
