use rand::Rng;

const RANDOM_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// The random URL prefix, generated once at startup. A zero length
/// yields an empty prefix (the server stays at `/`).
pub fn random_url_prefix(length: usize) -> String {
    if length == 0 {
        return String::new();
    }
    format!("/{}", random_string(length))
}

fn random_string(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| RANDOM_ALPHABET[rng.gen_range(0..RANDOM_ALPHABET.len())] as char)
        .collect()
}

/// The URLs to log at startup. With an empty bind address every local
/// interface address is listed, IPv4 and IPv6 alike.
pub fn access_urls(scheme: &str, address: &str, port: u16, prefix: &str) -> Vec<String> {
    if !address.is_empty() {
        return vec![format_url(scheme, address, port, prefix)];
    }
    match local_ip_address::list_afinet_netifas() {
        Ok(interfaces) => interfaces
            .into_iter()
            .map(|(_, ip)| format_url(scheme, &ip.to_string(), port, prefix))
            .collect(),
        Err(err) => {
            tracing::warn!(error = %err, "Failed to enumerate local interfaces");
            vec![format_url(scheme, "127.0.0.1", port, prefix)]
        }
    }
}

fn format_url(scheme: &str, host: &str, port: u16, prefix: &str) -> String {
    if host.contains(':') {
        format!("{}://[{}]:{}{}/", scheme, host, port, prefix)
    } else {
        format!("{}://{}:{}{}/", scheme, host, port, prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_string_length_and_alphabet() {
        let s = random_string(32);
        assert_eq!(s.len(), 32);
        assert!(s.bytes().all(|b| RANDOM_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_zero_length_yields_empty_prefix() {
        assert_eq!(random_url_prefix(0), "");
    }

    #[test]
    fn test_prefix_has_leading_slash() {
        let prefix = random_url_prefix(8);
        assert_eq!(prefix.len(), 9);
        assert!(prefix.starts_with('/'));
    }

    #[test]
    fn test_format_url_ipv4() {
        assert_eq!(
            format_url("http", "192.168.1.5", 8080, ""),
            "http://192.168.1.5:8080/"
        );
    }

    #[test]
    fn test_format_url_ipv6_is_bracketed() {
        assert_eq!(format_url("https", "::1", 8080, ""), "https://[::1]:8080/");
    }

    #[test]
    fn test_format_url_with_prefix() {
        assert_eq!(
            format_url("http", "localhost", 8080, "/a1b2c3d4"),
            "http://localhost:8080/a1b2c3d4/"
        );
    }

    #[test]
    fn test_access_urls_with_explicit_address() {
        let urls = access_urls("http", "127.0.0.1", 9000, "");
        assert_eq!(urls, vec!["http://127.0.0.1:9000/"]);
    }

    #[test]
    fn test_access_urls_all_interfaces_is_nonempty() {
        assert!(!access_urls("http", "", 8080, "").is_empty());
    }
}
