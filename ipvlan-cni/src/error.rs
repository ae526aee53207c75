use ipnetwork::IpNetwork;
use thiserror::Error;

use crate::types::AddressFamily;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} has no usable host range")]
    InsufficientAddressSpace(IpNetwork),

    #[error("missing subnet metadata: {0}")]
    MissingSubnetMetadata(String),

    #[error("provisioning failed: {0}")]
    ProvisioningFailure(String),

    #[error("apply failed: {0}")]
    ApplyFailure(String),

    #[error("{network} is not an {family} network")]
    AddressFamilyMismatch {
        network: IpNetwork,
        family: AddressFamily,
    },

    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<ipnetwork::IpNetworkError> for Error {
    fn from(err: ipnetwork::IpNetworkError) -> Self {
        Self::Parse(err.to_string())
    }
}
