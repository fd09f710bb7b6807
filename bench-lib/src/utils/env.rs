/// Identifies this crate in user-agent and server headers.
pub const fn client_identifier() -> &'static str {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"))
}
