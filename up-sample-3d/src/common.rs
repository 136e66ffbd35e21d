pub use anyhow::{ensure, format_err, Context, Error, Result};
pub use derivative::Derivative;
pub use getset::{CopyGetters, Getters};
pub use itertools::{iproduct, izip};
pub use log::{debug, info};
pub use serde::{Deserialize, Serialize};
pub use std::{
    convert::{TryFrom, TryInto},
    path::Path,
};
pub use strum::{AsRefStr, EnumString};
pub use tch::{Device, Kind, Tensor};
pub use tch_tensor_like::TensorLike;
pub use texture_runtime::{
    ComputeRuntime, LayerTensor, Program, RuntimeHandle, SquareIndices, TensorExt as _, Texture,
    TextureFormat, TextureInput,
};
