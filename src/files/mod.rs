pub mod dto;
pub mod handlers;
pub mod repo;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub fn router(max_file_size: usize) -> Router<AppState> {
    handlers::file_routes(max_file_size)
}
