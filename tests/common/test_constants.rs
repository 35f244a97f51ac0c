//! Shared constants for integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Placing shared constants under `tests/common/` avoids creating an
//! additional integration test binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/test_constants.rs"]
//! mod test_constants;
//! ```

/// Flavor used by test group configurations.
pub const DEFAULT_FLAVOR: &str = "flex-4-2";

/// Image used by test group configurations.
pub const DEFAULT_IMAGE: &str = "ubuntu-24.04";

/// Smallest volume size accepted by validation.
pub const DEFAULT_VOLUME_SIZE_GB: u32 = 10;
