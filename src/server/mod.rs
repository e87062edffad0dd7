pub mod app_state;
pub mod commands;
pub mod registry;

pub use app_state::{AppState, Collaborators};
pub use commands::CommandError;
pub use registry::SessionRegistry;
