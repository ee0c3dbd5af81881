//! Shared objects for talking to the giveaway engine.
//!
//! The engine itself lives in `giveaway-core`; this crate only carries the
//! wire types of the admin API and the operator-facing duration syntax, so
//! that bots and dashboards can depend on it without pulling in sqlx.

pub mod duration;
pub mod objects;

/// Header carrying the plaintext admin secret on every admin API request.
pub const ADMIN_AUTH_HEADER: &str = "Giveaway-Admin-Authorization";
