use std::path::Path;

/// Extensions always served through the range-capable path.
const RANGE_EXTENSIONS: [&str; 4] = ["mp4", "mkv", "mp3", "wav"];

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Content type for a file. Web assets get an explicit UTF-8 charset, the
/// rest comes from the `mime_guess` table.
pub fn content_type_for(path: &Path) -> String {
    match extension(path).as_str() {
        "html" | "htm" => "text/html; charset=UTF-8".to_string(),
        "css" => "text/css; charset=UTF-8".to_string(),
        "js" => "application/javascript; charset=UTF-8".to_string(),
        "appcache" => "text/cache-manifest".to_string(),
        _ => mime_guess::from_path(path).first_or_octet_stream().to_string(),
    }
}

/// Media files seekable through `Range` requests.
pub fn is_range_capable(path: &Path) -> bool {
    RANGE_EXTENSIONS.contains(&extension(path).as_str())
}

/// Html, css and javascript receive an `Expires` header.
pub fn is_static_asset(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    ["application/javascript", "text/css", "text/html"]
        .iter()
        .any(|prefix| content_type.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_web_types() {
        assert_eq!(content_type_for(Path::new("a/index.HTML")), "text/html; charset=UTF-8");
        assert_eq!(content_type_for(Path::new("app.js")), "application/javascript; charset=UTF-8");
        assert_eq!(content_type_for(Path::new("x.appcache")), "text/cache-manifest");
        assert_eq!(content_type_for(Path::new("logo.png")), "image/png");
        assert_eq!(content_type_for(Path::new("blob")), "application/octet-stream");
    }

    #[test]
    fn media_is_range_capable() {
        assert!(is_range_capable(Path::new("movie.MP4")));
        assert!(is_range_capable(Path::new("song.mp3")));
        assert!(!is_range_capable(Path::new("page.html")));
    }
}
