//! Hard limits. Everything here surfaces as `EngineError::LimitExceeded`
//! rather than letting a single tenant grow without bound.

use crate::model::Ms;

pub const MAX_APPOINTMENTS_PER_TENANT: usize = 100_000;

pub const MAX_CONTRACT_LEN: usize = 64;
pub const MAX_DRIVER_NAME_LEN: usize = 128;
pub const MAX_DRIVER_ID_LEN: usize = 32;
pub const MAX_PLATE_LEN: usize = 16;

/// Accepted `scheduled_at` range: [1970-01-01, 2100-01-01) in unix ms.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

pub const DAY_MS: Ms = 86_400_000;

/// Appointments older than this (by `created_at`) are eligible for purging.
pub const DEFAULT_RETENTION_MS: Ms = 3 * DAY_MS;

pub const MAX_TENANTS: usize = 128;
pub const MAX_TENANT_NAME_LEN: usize = 128;
