//! Integration-test support crate for VaultFS.
//!
//! The tests themselves live under `integration/`.
