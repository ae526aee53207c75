pub mod apply;
pub mod config;
pub mod imds;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Cni(#[from] ipvlan_cni::Error),

    #[error("instance metadata request failed: {0}")]
    Imds(#[from] reqwest::Error),

    #[error("no network interfaces reported by instance metadata")]
    NoInterfaces,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Cni(err.into())
    }
}
