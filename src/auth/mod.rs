use crate::state::AppState;
use axum::Router;

mod claims;
pub mod credentials;
mod dto;
pub mod guard;
pub mod handlers;
pub mod jwt;
pub mod password;

pub use guard::{AuthUser, Authorized, CurrentUser, MaybeUser};

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
