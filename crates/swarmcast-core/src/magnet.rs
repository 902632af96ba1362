//! Shareable magnet links for library files
//!
//! The content id is the SHA-1 of the file's *path string*, not of its bytes.
//! It is stable for a given path and usable as a swarm key, but it is not a
//! content digest: it cannot detect changed or corrupted data.

use sha1::{Digest, Sha1};

/// 40-character hex id derived from `path`
pub fn content_id_for_path(path: &str) -> String {
    hex::encode(Sha1::digest(path.as_bytes()))
}

/// Build `magnet:?xt=urn:btih:<id>&dn=<name>[&ws=<web_seed_base>/<name>]`
pub fn magnet_uri(path: &str, display_name: &str, web_seed_base: Option<&str>) -> String {
    let name = urlencoding::encode(display_name);
    let mut uri = format!(
        "magnet:?xt=urn:btih:{}&dn={}",
        content_id_for_path(path),
        name
    );
    if let Some(base) = web_seed_base {
        uri.push_str(&format!("&ws={}/{}", base.trim_end_matches('/'), name));
    }
    uri
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_id_hashes_the_path_string() {
        // sha1("abc")
        assert_eq!(
            content_id_for_path("abc"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_ne!(
            content_id_for_path("/media/a.mkv"),
            content_id_for_path("/media/b.mkv")
        );
    }

    #[test]
    fn magnet_encodes_name_and_web_seed() {
        let uri = magnet_uri("abc", "My Movie", Some("http://10.0.0.1:6800/files/"));
        assert_eq!(
            uri,
            "magnet:?xt=urn:btih:a9993e364706816aba3e25717850c26c9cd0d89d&dn=My%20Movie\
             &ws=http://10.0.0.1:6800/files/My%20Movie"
        );
        assert!(!magnet_uri("abc", "x", None).contains("&ws="));
    }
}
