//! Picks the file handed to the player once a download completes

use swarmcast_types::EngineFile;

/// First file, in engine order, whose path ends with one of `extensions`
/// (case-insensitive). Extensions may be given with or without the dot.
pub fn select_media_file<'a>(files: &'a [EngineFile], extensions: &[String]) -> Option<&'a EngineFile> {
    let suffixes: Vec<String> = extensions
        .iter()
        .map(|ext| ext.trim().to_lowercase())
        .filter(|ext| !ext.is_empty() && ext != ".")
        .map(|ext| {
            if ext.starts_with('.') {
                ext
            } else {
                format!(".{}", ext)
            }
        })
        .collect();

    files.iter().find(|file| {
        let path = file.path.to_lowercase();
        suffixes.iter().any(|suffix| path.ends_with(suffix.as_str()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmcast_types::default_media_extensions;

    fn files(paths: &[&str]) -> Vec<EngineFile> {
        paths
            .iter()
            .map(|p| EngineFile {
                path: p.to_string(),
                ..EngineFile::default()
            })
            .collect()
    }

    #[test]
    fn picks_first_match_in_engine_order() {
        let list = files(&["/x/readme.txt", "/x/sample.MKV", "/x/movie.mp4"]);
        let chosen = select_media_file(&list, &default_media_extensions()).unwrap();
        assert_eq!(chosen.path, "/x/sample.MKV");
    }

    #[test]
    fn no_match_yields_none() {
        let list = files(&["/x/readme.txt", "/x/cover.jpg", "/x/mkv"]);
        assert!(select_media_file(&list, &default_media_extensions()).is_none());
        assert!(select_media_file(&[], &default_media_extensions()).is_none());
    }

    #[test]
    fn extensions_without_dot_are_normalized() {
        let list = files(&["/x/track.flac", "/x/notflac"]);
        let exts = vec!["FLAC".to_string(), "".to_string()];
        assert_eq!(select_media_file(&list, &exts).unwrap().path, "/x/track.flac");
    }
}
