/// Router Module Index
///
/// Organizes the application's routing logic into security-segregated modules,
/// enforcing a Defense-in-Depth strategy. This structure ensures that
/// access control is applied explicitly at the module level (via Axum layers),
/// preventing accidental exposure of protected endpoints.

/// Routes accessible to all clients (health, login, refresh). The credential
/// handlers gate themselves through the critical rate-limit windows.
pub mod public;

/// Routes protected by the `AuthUser` extractor middleware.
/// Requires a validated bearer access token.
pub mod authenticated;
