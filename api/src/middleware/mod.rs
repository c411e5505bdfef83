mod identity;
mod trigger_auth;

pub use identity::{user_identity_middleware, UserId, USER_ID_HEADER};
pub use trigger_auth::trigger_auth_middleware;
