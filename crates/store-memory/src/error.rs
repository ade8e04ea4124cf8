use tailcast_store::StoreError;
use thiserror::Error;

/// Errors that can occur in this crate. The in-memory store has no failure
/// modes; the type exists to satisfy the store seam.
#[derive(Debug, Error)]
pub enum Error {}

impl StoreError for Error {}
