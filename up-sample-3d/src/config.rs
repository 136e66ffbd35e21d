//! Layer configuration.

use crate::{common::*, error::UpSampleError};

pub use data_format::*;
pub use execution_mode::*;
pub use size::*;
pub use up_sampling_3d_config::*;

mod size {
    use super::*;

    /// Upsampling factors of the three spatial axes.
    ///
    /// Deserializes from either a single integer, applied to every axis, or a
    /// list of three integers. All factors are positive.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(try_from = "SizeRepr", into = "SizeRepr")]
    pub struct Size3([usize; 3]);

    impl Size3 {
        pub fn new(s0: usize, s1: usize, s2: usize) -> Result<Self> {
            [s0, s1, s2].try_into()
        }

        pub fn uniform(size: usize) -> Result<Self> {
            Self::new(size, size, size)
        }

        pub fn factors(&self) -> [i64; 3] {
            let [s0, s1, s2] = self.0;
            [s0 as i64, s1 as i64, s2 as i64]
        }
    }

    impl Default for Size3 {
        fn default() -> Self {
            Self([2, 2, 2])
        }
    }

    impl AsRef<[usize]> for Size3 {
        fn as_ref(&self) -> &[usize] {
            &self.0
        }
    }

    impl TryFrom<[usize; 3]> for Size3 {
        type Error = Error;

        fn try_from(from: [usize; 3]) -> Result<Self, Self::Error> {
            if from.iter().any(|&size| size == 0) {
                return Err(UpSampleError::InvalidConfig(format!(
                    "upsampling factors must be positive, but get {:?}",
                    from
                ))
                .into());
            }
            Ok(Self(from))
        }
    }

    impl TryFrom<&[i64]> for Size3 {
        type Error = Error;

        fn try_from(from: &[i64]) -> Result<Self, Self::Error> {
            let sizes: [i64; 3] = from.try_into().map_err(|_| {
                UpSampleError::InvalidConfig(format!(
                    "expect 3 upsampling factors, but get {}",
                    from.len()
                ))
            })?;
            if sizes.iter().any(|&size| size <= 0) {
                return Err(UpSampleError::InvalidConfig(format!(
                    "upsampling factors must be positive, but get {:?}",
                    sizes
                ))
                .into());
            }
            let [s0, s1, s2] = sizes;
            Self::new(s0 as usize, s1 as usize, s2 as usize)
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(untagged)]
    enum SizeRepr {
        Uniform(i64),
        PerAxis(Vec<i64>),
    }

    impl TryFrom<SizeRepr> for Size3 {
        type Error = Error;

        fn try_from(from: SizeRepr) -> Result<Self, Self::Error> {
            match from {
                SizeRepr::Uniform(size) => Size3::try_from(&[size; 3][..]),
                SizeRepr::PerAxis(sizes) => Size3::try_from(sizes.as_slice()),
            }
        }
    }

    impl From<Size3> for SizeRepr {
        fn from(from: Size3) -> Self {
            SizeRepr::PerAxis(from.factors().to_vec())
        }
    }
}

mod data_format {
    use super::*;

    /// Position of the channel axis in a 4-D tensor.
    #[derive(
        Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString,
    )]
    #[serde(rename_all = "snake_case")]
    #[strum(serialize_all = "snake_case")]
    pub enum DataFormat {
        /// `[D0, D1, D2, C]`
        ChannelsLast,
        /// `[C, D0, D1, D2]`
        ChannelsFirst,
    }

    impl Default for DataFormat {
        fn default() -> Self {
            Self::ChannelsLast
        }
    }

    impl DataFormat {
        /// Axes of the three spatial dimensions, in order.
        pub fn spatial_axes(&self) -> [usize; 3] {
            match self {
                Self::ChannelsLast => [0, 1, 2],
                Self::ChannelsFirst => [1, 2, 3],
            }
        }

        /// Permutation moving the channel axis to the end.
        pub fn to_channels_last(&self) -> [i64; 4] {
            match self {
                Self::ChannelsLast => [0, 1, 2, 3],
                Self::ChannelsFirst => [1, 2, 3, 0],
            }
        }

        /// Permutation moving the channel axis from the end back to its place.
        pub fn from_channels_last(&self) -> [i64; 4] {
            match self {
                Self::ChannelsLast => [0, 1, 2, 3],
                Self::ChannelsFirst => [3, 0, 1, 2],
            }
        }
    }
}

mod execution_mode {
    use super::*;

    /// Where the layer computes.
    #[derive(Derivative, Clone)]
    #[derivative(Debug)]
    pub enum ExecutionMode {
        Cpu,
        Gpu(#[derivative(Debug = "ignore")] RuntimeHandle),
    }

    impl ExecutionMode {
        pub fn is_gpu(&self) -> bool {
            matches!(self, Self::Gpu(_))
        }
    }
}

mod up_sampling_3d_config {
    use super::*;

    /// Serialized form of the layer attributes.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct UpSampling3DConfig {
        #[serde(default)]
        pub size: Size3,
        #[serde(default)]
        pub data_format: DataFormat,
        /// Number of downstream consumers of the layer output.
        #[serde(default)]
        pub outbound: usize,
    }

    impl Default for UpSampling3DConfig {
        fn default() -> Self {
            Self {
                size: Size3::default(),
                data_format: DataFormat::default(),
                outbound: 0,
            }
        }
    }

    impl UpSampling3DConfig {
        pub fn open<P>(path: P) -> Result<Self>
        where
            P: AsRef<Path>,
        {
            let path = path.as_ref();
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("unable to read '{}'", path.display()))?;
            Self::from_json5_str(&text)
        }

        pub fn from_json5_str(text: &str) -> Result<Self> {
            let config = json5::from_str(text)
                .map_err(|err| UpSampleError::InvalidConfig(err.to_string()))?;
            Ok(config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_rejects_zero() {
        let err = Size3::new(2, 0, 2).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UpSampleError>(),
            Some(UpSampleError::InvalidConfig(_))
        ));
        assert!(Size3::uniform(0).is_err());
        assert!(Size3::try_from(&[-1i64, 2, 2][..]).is_err());
        assert!(Size3::try_from(&[1i64, 2][..]).is_err());
    }

    #[test]
    fn config_defaults() {
        let config = UpSampling3DConfig::from_json5_str("{}").unwrap();
        assert_eq!(config, UpSampling3DConfig::default());
        assert_eq!(config.size.factors(), [2, 2, 2]);
        assert_eq!(config.data_format, DataFormat::ChannelsLast);
    }

    #[test]
    fn config_size_forms() {
        let config = UpSampling3DConfig::from_json5_str("{ size: 3 }").unwrap();
        assert_eq!(config.size.factors(), [3, 3, 3]);

        let config = UpSampling3DConfig::from_json5_str(
            "{ size: [1, 2, 3], data_format: 'channels_first', outbound: 1 }",
        )
        .unwrap();
        assert_eq!(config.size.factors(), [1, 2, 3]);
        assert_eq!(config.data_format, DataFormat::ChannelsFirst);
        assert_eq!(config.outbound, 1);
    }

    #[test]
    fn config_rejects_invalid_attributes() {
        for text in [
            "{ size: 0 }",
            "{ size: -2 }",
            "{ size: [2, 2] }",
            "{ size: [2, 0, 2] }",
            "{ size: 'two' }",
            "{ data_format: 'channels_middle' }",
            "{ padding: 1 }",
        ] {
            let err = UpSampling3DConfig::from_json5_str(text).unwrap_err();
            assert!(
                matches!(
                    err.downcast_ref::<UpSampleError>(),
                    Some(UpSampleError::InvalidConfig(_))
                ),
                "{} is accepted",
                text
            );
        }
    }

    #[test]
    fn data_format_names() {
        assert_eq!(DataFormat::ChannelsFirst.as_ref(), "channels_first");
        assert_eq!(
            "channels_last".parse::<DataFormat>().unwrap(),
            DataFormat::ChannelsLast
        );
        assert!("channels_middle".parse::<DataFormat>().is_err());
    }
}
