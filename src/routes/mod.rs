mod auth;
mod health_check;
mod profile;

pub use auth::{login, logout, refresh, register, REFRESH_COOKIE_NAME};
pub use health_check::health_check;
pub use profile::profile;
