use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod model;
pub mod repo;
pub mod repo_memory;
pub mod repo_pg;
mod repo_types;
pub mod services;

pub use error::UserError;
pub use repo::{StoreError, UserStore};
pub use repo_memory::InMemoryUserStore;
pub use repo_pg::PgUserStore;
pub use services::UserService;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::public_routes())
        .merge(handlers::protected_routes())
}
