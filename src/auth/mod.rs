// Authentication module
// Session state management against the provider's auth API

mod provider;
mod session;
mod store;
mod suppression;
mod types;

pub use provider::SupabaseAuthClient;
pub use session::{AuthEventPump, AuthSnapshot, SessionManager};
pub use store::SessionStore;
pub use types::{AuthChange, AuthChangeEvent, Session, User};
