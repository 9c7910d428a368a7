//! Notification inbox synchronization for the admin/site-manager dashboard.
//!
//! The [`sync::InboxEngine`] owns the cached inbox and merges three update
//! sources: full fetches from the [`directory`], live pushes from a
//! [`transport`] channel, and the user's own read/delete actions.
//! [`session::InboxSession`] wires them together for one signed-in user.

pub mod alerts;
pub mod config;
pub mod credentials;
pub mod directory;
pub mod models;
pub mod session;
pub mod sync;
pub mod transport;
pub mod utils;
pub mod view;

#[cfg(test)]
pub(crate) mod test_support;
