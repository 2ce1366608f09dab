/// Router Module Index
///
/// Splits the HTTP surface by access level. The split is enforced with layers in
/// `create_router`, so a route cannot end up unguarded by being registered in the wrong place.

/// Routes open to every reader: landing content, single posts, sign-in and sign-out.
pub mod public;

/// Routes behind the session gate, nested under `/admin`.
pub mod admin;
