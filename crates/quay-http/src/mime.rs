use mime_guess::mime;

/// How a file's bytes are treated on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Text,
    Binary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    pub essence: String,
    pub mode: TransferMode,
}

impl ContentType {
    /// Value for the `Content-Type` header.
    pub fn header_value(&self) -> String {
        match self.mode {
            TransferMode::Text => format!("{}; charset=utf-8", self.essence),
            TransferMode::Binary => self.essence.clone(),
        }
    }
}

/// Classify a file extension, without the leading dot.
///
/// Unknown extensions are served as opaque binary data.
pub fn classify(extension: &str) -> ContentType {
    let Some(guess) = mime_guess::from_ext(extension).first() else {
        return ContentType {
            essence: mime::APPLICATION_OCTET_STREAM.essence_str().to_string(),
            mode: TransferMode::Binary,
        };
    };

    let mode = if guess.type_() == mime::TEXT {
        TransferMode::Text
    } else {
        TransferMode::Binary
    };

    ContentType {
        essence: guess.essence_str().to_string(),
        mode,
    }
}

#[cfg(test)]
mod tests {
    use super::{classify, TransferMode};

    #[test]
    fn html_is_text() {
        let content_type = classify("html");
        assert_eq!(content_type.mode, TransferMode::Text);
        assert_eq!(content_type.header_value(), "text/html; charset=utf-8");
    }

    #[test]
    fn css_is_text() {
        let content_type = classify("css");
        assert_eq!(content_type.header_value(), "text/css; charset=utf-8");
    }

    #[test]
    fn images_are_binary() {
        for (extension, expected) in [
            ("png", "image/png"),
            ("jpg", "image/jpeg"),
            ("jpeg", "image/jpeg"),
            ("gif", "image/gif"),
        ] {
            let content_type = classify(extension);
            assert_eq!(content_type.mode, TransferMode::Binary, "{extension}");
            assert_eq!(content_type.header_value(), expected);
        }
    }

    #[test]
    fn unknown_fails_closed() {
        let content_type = classify("definitely-not-a-type");
        assert_eq!(content_type.mode, TransferMode::Binary);
        assert_eq!(content_type.header_value(), "application/octet-stream");
    }
}
