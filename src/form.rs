//! Url-encoded and multipart form body construction

use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::error::Error;

enum Field {
    Text(String),
    File {
        filename: String,
        content_type: Option<String>,
        content: Bytes,
    },
}

/// An ordered set of form fields to send as a request body.
///
/// With only text fields the body is url-encoded; as soon as one file field
/// is present the whole form is encoded as `multipart/form-data`. File
/// contents are carried as raw bytes and never decoded as text.
#[derive(Default)]
pub struct FormData {
    fields: Vec<(String, Field)>,
}

impl FormData {
    /// Creates an empty form
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a text field
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), Field::Text(value.into())));
        self
    }

    /// Appends a file field without a part-level content type
    pub fn file(
        self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        self.push_file(name.into(), filename.into(), None, content.into())
    }

    /// Appends a file field with its own content type
    pub fn file_with_type(
        self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        self.push_file(name.into(), filename.into(), Some(content_type.into()), content.into())
    }

    fn push_file(
        mut self,
        name: String,
        filename: String,
        content_type: Option<String>,
        content: Bytes,
    ) -> Self {
        self.fields.push((name, Field::File { filename, content_type, content }));
        self
    }

    /// Encodes the form into a body and its `Content-Type` header value
    pub fn encode(&self) -> Result<(Bytes, String), Error> {
        let has_files = self.fields
            .iter()
            .any(|(_, field)| matches!(field, Field::File { .. }));

        if has_files {
            Ok(self.encode_multipart())
        } else {
            self.encode_urlencoded()
        }
    }

    fn encode_urlencoded(&self) -> Result<(Bytes, String), Error> {
        let pairs = self.fields
            .iter()
            .map(|(name, field)| match field {
                Field::Text(value) => (name.as_str(), value.as_str()),
                Field::File { .. } => unreachable!("file fields take the multipart branch"),
            })
            .collect::<Vec<_>>();
        let encoded = serde_urlencoded::to_string(pairs)
            .map_err(Error::decode)?;
        Ok((
            Bytes::from(encoded.into_bytes()),
            mime::APPLICATION_WWW_FORM_URLENCODED.to_string(),
        ))
    }

    fn encode_multipart(&self) -> (Bytes, String) {
        let boundary = self.pick_boundary();
        let mut body = BytesMut::new();

        for (name, field) in &self.fields {
            body.put_slice(format!("--{boundary}\r\n").as_bytes());
            body.put_slice(format!("Content-Disposition: form-data; name=\"{name}\"").as_bytes());

            match field {
                Field::Text(value) => {
                    body.put_slice(b"\r\n\r\n");
                    body.put_slice(value.as_bytes());
                }
                Field::File { filename, content_type, content } => {
                    body.put_slice(format!("; filename=\"{filename}\"").as_bytes());
                    if let Some(content_type) = content_type {
                        body.put_slice(format!("\r\nContent-Type: {content_type}").as_bytes());
                    }
                    body.put_slice(b"\r\n\r\n");
                    body.put_slice(content);
                }
            }
            body.put_slice(b"\r\n");
        }
        body.put_slice(format!("--{boundary}--\r\n").as_bytes());

        let content_type = format!("{}; boundary={boundary}", mime::MULTIPART_FORM_DATA);
        (body.freeze(), content_type)
    }

    /// Picks a random boundary, regenerating until it collides with nothing
    /// in the payload
    fn pick_boundary(&self) -> String {
        loop {
            let boundary = Uuid::new_v4().simple().to_string();
            if !self.collides(&boundary) {
                return boundary;
            }
        }
    }

    fn collides(&self, boundary: &str) -> bool {
        let needle = boundary.as_bytes();
        self.fields.iter().any(|(name, field)| {
            contains(name.as_bytes(), needle)
                || match field {
                    Field::Text(value) => contains(value.as_bytes(), needle),
                    Field::File { filename, content_type, content } => {
                        contains(filename.as_bytes(), needle)
                            || content_type
                                .as_deref()
                                .is_some_and(|ct| contains(ct.as_bytes(), needle))
                            || contains(content, needle)
                    }
                }
        })
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_url_encodes_text_only_forms() {
        let (body, content_type) = FormData::new()
            .text("name", "jane doe")
            .text("lang", "rust")
            .encode()
            .unwrap();

        assert_eq!(&body[..], b"name=jane+doe&lang=rust");
        assert_eq!(content_type, "application/x-www-form-urlencoded");
    }

    #[test]
    fn it_switches_to_multipart_with_a_file() {
        let (body, content_type) = FormData::new()
            .text("note", "hello")
            .file_with_type("upload", "data.bin", "application/octet-stream", vec![0xff, 0x00, 0xfe])
            .encode()
            .unwrap();

        let boundary = content_type
            .strip_prefix("multipart/form-data; boundary=")
            .unwrap()
            .to_owned();

        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("Content-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n"));
        assert!(text.contains("Content-Disposition: form-data; name=\"upload\"; filename=\"data.bin\"\r\n"));
        assert!(text.contains("Content-Type: application/octet-stream\r\n"));
        assert!(text.ends_with(&format!("--{boundary}--\r\n")));

        // raw file bytes are embedded untouched
        assert!(contains(&body, &[0xff, 0x00, 0xfe]));
    }

    #[test]
    fn it_detects_boundary_collisions() {
        let form = FormData::new().text("field", "the-boundary-value");

        assert!(form.collides("boundary-value"));
        assert!(!form.collides("something-else"));
    }
}
