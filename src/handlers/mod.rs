//! HTTP handlers.
//!
//! Handlers only resolve the caller, enforce the operation's policy and open the
//! transaction; all rules live in the repositories and [`crate::identity`].

pub mod auth;
pub mod content;
pub mod crud;
pub mod docs;
pub mod users;
