//! Application state, auth session and theme

pub mod auth;
pub mod state;
pub mod theme;

pub use auth::AuthSession;
pub use state::AppState;
pub use theme::Theme;
