//! Funnel builder backend: funnels, A/B tests, leads, templates and admin views.
//!
//! Provides REST API endpoints for the funnel editor and the published funnel runtime.
//! Data stored in DashMap (development); swap to a database for production.

pub mod handlers;
pub mod models;
pub mod router;
pub mod store;

pub use handlers::ManagementState;
pub use router::{management_router, router_with_store};
pub use store::ManagementStore;
