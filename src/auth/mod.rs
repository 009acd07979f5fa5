//! Session credentials and anti-forgery tokens.
//!
//! # Data Flow
//! ```text
//! pipeline, before dispatch
//!     → manager.rs ensure_fresh (proactive refresh near expiry)
//!     → manager.rs get_credential → Authorization: Bearer
//!     → csrf.rs attach (state-changing methods only)
//!
//! pipeline, on 401
//!     → manager.rs handle_unauthorized
//!         → stale credential: replay
//!         → otherwise: single-flight refresh → replay once | Auth error
//!     → session.rs broadcast (Refreshed | Invalidated)
//! ```
//!
//! # Design Decisions
//! - One refresh at a time per manager, shared by every waiter
//! - A failed refresh clears credentials; callers must sign in again
//! - A missing CSRF token is not an error; the server decides

pub mod csrf;
pub mod manager;
pub mod session;
pub mod tokens;

pub use csrf::CsrfGuard;
pub use manager::{AuthDecision, AuthTokenManager};
pub use session::{SessionEvent, SessionEvents};
pub use tokens::TokenPair;
