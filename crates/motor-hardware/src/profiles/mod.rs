//! Built-in vendor profiles.

use std::sync::Arc;

use anyhow::bail;

use crate::profile::VendorProfile;

pub mod e816;
pub mod maxnet;
pub mod mm4000;

pub use e816::E816;
pub use maxnet::Maxnet;
pub use mm4000::{Mm4000, Mm4000Status};

/// Look up a built-in profile by its config name.
pub fn by_name(name: &str) -> anyhow::Result<Arc<dyn VendorProfile>> {
    match name {
        "mm4000" => Ok(Arc::new(Mm4000)),
        "maxnet" => Ok(Arc::new(Maxnet)),
        "e816" => Ok(Arc::new(E816)),
        other => bail!(
            "unknown vendor profile '{}' (built in: mm4000, maxnet, e816)",
            other
        ),
    }
}
