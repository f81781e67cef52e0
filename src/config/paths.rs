/// Expands a leading `~/` to the user's home directory.
///
/// Every user-supplied path (config file, profile file, TLS certificate
/// and key) goes through this before it is opened.
pub fn expand_home(path: &str) -> String {
    shellexpand::tilde(path).into_owned()
}
