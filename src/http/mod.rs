//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware chain)
//!     → request.rs (assign request id)
//!     → middleware/auth.rs (verify token, populate context)
//!     → security::rate_limit (admission)
//!     → server.rs forward handler (inject x-ca-* set, relay upstream)
//! ```

pub mod middleware;
pub mod request;
pub mod server;

pub use server::GatewayServer;
