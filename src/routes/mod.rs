/// Router Module Index
///
/// Routes are split by who may call them. Access control is applied per
/// module: nothing for public routes, the `auth_middleware` layer for
/// authenticated routes, and the `AdminUser` extractor inside every admin handler.

/// Routes open to anonymous visitors. Only publicly visible data is served.
pub mod public;

/// Routes that need a resolved identity (any role).
pub mod authenticated;

/// Routes restricted to the admin group, nested under `/admin`.
pub mod admin;
