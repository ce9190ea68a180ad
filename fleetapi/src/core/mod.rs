pub mod config;
pub mod error;
pub mod state;

pub mod prelude {
    pub use super::{
        config::{AuthConfig, Config},
        error::{Error, Result},
        state::AppState,
    };
}
