/// Router Module Index
///
/// Routes are split by how the caller is resolved. Finer gates (scope, active, staff,
/// self-or-staff) are applied per operation inside the handlers.

/// Routes reachable without a token: health, login, refresh and registration.
pub mod public;

/// Routes behind the `AuthUser` extractor middleware.
pub mod authenticated;
