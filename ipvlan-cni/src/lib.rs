pub mod cidr;
pub mod command;
pub mod config;
pub mod error;
pub mod host;
pub mod source;
pub mod types;

use std::fmt::Display;
use std::str::FromStr;

use semver::Version;
use serde::{Deserialize, Deserializer, Serialize};

pub use crate::error::Error;

/// Version written into every generated config. The ipvlan plugin shipped on
/// the nodes only understands the 0.3.x conf format.
pub const CNI_VERSION: Version = Version::new(0, 3, 1);

pub const CNI_CONF_DIR: &str = "/etc/cni/net.d";

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) fn serialize_to_string<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
    T: ToString,
{
    value.to_string().serialize(serializer)
}

pub(crate) fn deserialize_from_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let buf = String::deserialize(deserializer)?;
    T::from_str(&buf).map_err(|e| serde::de::Error::custom(e.to_string()))
}
