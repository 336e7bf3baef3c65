pub mod middleware;
pub mod rest;
pub mod scan_task;
pub mod state;

// Re-export the pieces the server binary wires together.
pub use middleware::require_identity;
pub use scan_task::fallback_scan_loop;
pub use state::AppState;
