//! Session and impersonation handlers.
//!
//! Everything under this module sits on the trust boundary: the cookie
//! adapter bridges the transport to the session store, the resolver turns
//! cookie values into `(session, user)` pairs, and impersonation mints a
//! session as another user from a stored credential pair.
//!
//! ## Impersonation
//!
//! The impersonation endpoint requires the caller's own resolved session to
//! carry the `admin` role. The service step itself performs no further
//! verification; restricting who can reach it is the handler's job, not the
//! transport layer's.

pub mod cookie;
pub mod impersonate;
pub mod session;
mod state;
mod storage;
pub mod types;
mod utils;

pub use state::{AuthConfig, AuthState};
pub use storage::{PgProfileStore, ProfileRecord, ProfileStore};
