//! Read-only model descriptor produced by the model loader.

use crate::version::{policy_channels_for_version, FeatureLayout, VALUE_SLOTS};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Shape summary of a loaded network.
///
/// Produced by whatever component parses model files; this layer only reads
/// channel counts and the version from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub version: i32,
    pub num_input_channels: usize,
    pub num_input_global_channels: usize,
    pub num_policy_channels: usize,
    pub num_value_channels: usize,
    pub num_ownership_channels: usize,
}

impl ModelDescriptor {
    /// Descriptor with the channel counts a model of `version` is expected to have.
    pub fn for_version(name: impl Into<String>, version: i32) -> Result<Self> {
        let layout = FeatureLayout::for_version(version)?;
        Ok(Self {
            name: name.into(),
            version,
            num_input_channels: layout.spatial_channels,
            num_input_global_channels: layout.global_channels,
            num_policy_channels: policy_channels_for_version(version),
            num_value_channels: VALUE_SLOTS,
            num_ownership_channels: 1,
        })
    }

    /// Checks the descriptor against the version table.
    pub fn validate(&self) -> Result<()> {
        let layout = FeatureLayout::for_version(self.version)?;

        if self.num_input_channels != layout.spatial_channels {
            return Err(Error::InvalidModel(format!(
                "{}: version {} expects {} spatial channels, descriptor has {}",
                self.name, self.version, layout.spatial_channels, self.num_input_channels
            )));
        }
        if self.num_input_global_channels != layout.global_channels {
            return Err(Error::InvalidModel(format!(
                "{}: version {} expects {} global channels, descriptor has {}",
                self.name, self.version, layout.global_channels, self.num_input_global_channels
            )));
        }

        let expected_policy = policy_channels_for_version(self.version);
        if self.num_policy_channels != expected_policy {
            return Err(Error::InvalidModel(format!(
                "{}: version {} requires {} policy channel(s), descriptor has {}",
                self.name, self.version, expected_policy, self.num_policy_channels
            )));
        }
        if self.num_value_channels != VALUE_SLOTS {
            return Err(Error::InvalidModel(format!(
                "{}: value head must have {} channels, descriptor has {}",
                self.name, VALUE_SLOTS, self.num_value_channels
            )));
        }
        if self.num_ownership_channels == 0 {
            return Err(Error::InvalidModel(format!(
                "{}: ownership head has no channels",
                self.name
            )));
        }
        Ok(())
    }

    /// True when the policy head carries the optimistic channel.
    pub fn has_optimistic_policy(&self) -> bool {
        self.num_policy_channels == 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_for_version() {
        let desc = ModelDescriptor::for_version("b18c384", 14).unwrap();
        assert_eq!(desc.num_input_channels, 22);
        assert_eq!(desc.num_input_global_channels, 19);
        assert_eq!(desc.num_policy_channels, 2);
        assert!(desc.has_optimistic_policy());
        assert!(desc.validate().is_ok());

        let old = ModelDescriptor::for_version("g170", 8).unwrap();
        assert_eq!(old.num_policy_channels, 1);
        assert!(old.validate().is_ok());
    }

    #[test]
    fn test_policy_channel_invariant() {
        let mut desc = ModelDescriptor::for_version("m", 12).unwrap();
        desc.num_policy_channels = 1;
        assert!(matches!(desc.validate(), Err(Error::InvalidModel(_))));

        let mut desc = ModelDescriptor::for_version("m", 11).unwrap();
        desc.num_policy_channels = 2;
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_channel_mismatch() {
        let mut desc = ModelDescriptor::for_version("m", 10).unwrap();
        desc.num_input_global_channels = 18;
        assert!(desc.validate().is_err());

        let mut desc = ModelDescriptor::for_version("m", 10).unwrap();
        desc.num_value_channels = 4;
        assert!(desc.validate().is_err());
    }
}
