use crate::platform::MediaPlatform;

/// Default encoding preference: primary codec, then two fallbacks
pub const DEFAULT_MIME_PREFERENCES: [&str; 3] =
    ["audio/webm;codecs=opus", "audio/mp4", "audio/wav"];

/// Used when the encoder does not report its own type
pub const FALLBACK_MIME_TYPE: &str = "audio/webm";

/// First preference the platform can encode, or `None` for the platform default
pub fn select_mime_type(platform: &dyn MediaPlatform, preferences: &[String]) -> Option<String> {
    preferences
        .iter()
        .find(|mime| platform.supports_mime_type(mime))
        .cloned()
}

/// Download extension for a negotiated mime type
pub fn file_extension(mime_type: &str) -> &'static str {
    if mime_type.contains("webm") {
        "webm"
    } else if mime_type.contains("mp4") {
        "m4a"
    } else if mime_type.contains("wav") {
        "wav"
    } else {
        "webm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_mapping() {
        assert_eq!(file_extension("audio/webm;codecs=opus"), "webm");
        assert_eq!(file_extension("audio/mp4"), "m4a");
        assert_eq!(file_extension("audio/wav"), "wav");
        assert_eq!(file_extension("audio/ogg"), "webm");
        assert_eq!(file_extension(""), "webm");
    }
}
