pub mod handlers;
pub mod model;

use axum::Router;

use crate::state::AppState;

pub fn router(state: &AppState) -> Router<AppState> {
    handlers::tour_routes(state)
}
