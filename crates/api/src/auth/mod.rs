//! Authentication primitives.
//!
//! Tokens are issued elsewhere (the account service); this server only
//! verifies them to learn which user is on the other end of a request or
//! realtime connection.

pub mod jwt;
