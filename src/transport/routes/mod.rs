pub mod info;
pub mod surface;

pub use info::{get_health, get_version};
pub use surface::root;
