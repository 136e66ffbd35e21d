pub use anyhow::{ensure, format_err, Result};
pub use derivative::Derivative;
pub use getset::{CopyGetters, Getters};
pub use itertools::izip;
pub use log::{debug, warn};
pub use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    rc::Rc,
};
pub use strum::AsRefStr;
pub use tch::{Device, Kind, Tensor};
pub use tch_tensor_like::TensorLike;
