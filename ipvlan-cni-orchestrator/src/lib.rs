pub mod azure;
pub mod config;
pub mod inventory;
pub mod provision;
pub mod run;
pub mod script;
pub mod source;
pub mod subnet;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Cni(#[from] ipvlan_cni::Error),

    #[error("unable to determine node resource group for cluster {0}")]
    NodeResourceGroup(String),

    #[error("failed to push cni config to {failed} node(s)")]
    Bootstrap { failed: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
