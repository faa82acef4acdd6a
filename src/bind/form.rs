//! Form bodies: `application/x-www-form-urlencoded` and `multipart/form-data`.

use std::collections::BTreeMap;
use std::io;

use bytes::Bytes;

use super::BindingError;
use crate::error::Error;

/// Field values and uploaded files parsed from a form body.
#[derive(Clone, Debug, Default)]
pub struct Form {
    values: BTreeMap<String, Vec<String>>,
    files: Vec<FormFile>,
}

/// One uploaded file from a multipart body.
#[derive(Clone, Debug)]
pub struct FormFile {
    /// Name of the form field carrying the file.
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl Form {
    /// First value for `key`.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.first()).map(String::as_str)
    }

    /// Every value for `key`, in body order.
    pub fn values(&self, key: &str) -> &[String] {
        self.values.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// First file uploaded under `field`.
    pub fn file(&self, field: &str) -> Option<&FormFile> {
        self.files.iter().find(|f| f.field == field)
    }

    pub fn files(&self) -> &[FormFile] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.files.is_empty()
    }

    fn push(&mut self, key: String, value: String) {
        self.values.entry(key).or_default().push(value);
    }
}

/// How a request's `content-type` says its body should be read as a form.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum FormKind {
    UrlEncoded,
    Multipart { boundary: Option<String> },
    Other,
}

pub(crate) fn form_kind(content_type: Option<&str>) -> FormKind {
    let Some(content_type) = content_type else {
        return FormKind::Other;
    };
    let essence = content_type.split(';').next().unwrap_or_default().trim();

    if essence.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
        FormKind::UrlEncoded
    } else if essence.eq_ignore_ascii_case("multipart/form-data") {
        FormKind::Multipart { boundary: multer::parse_boundary(content_type).ok() }
    } else {
        FormKind::Other
    }
}

pub(crate) fn parse_urlencoded(body: &[u8]) -> Form {
    let mut form = Form::default();
    for (key, value) in url::form_urlencoded::parse(body) {
        form.push(key.into_owned(), value.into_owned());
    }
    form
}

/// Splits an already buffered multipart body. Parts with a file name become
/// [`FormFile`]s, the rest become values.
pub(crate) async fn parse_multipart(boundary: &str, body: Bytes) -> Result<Form, Error> {
    let stream = futures_util::stream::once(async move { Ok::<_, io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);
    let mut form = Form::default();

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_owned();
        match field.file_name().map(str::to_owned) {
            Some(file_name) => {
                let content_type = field.content_type().map(ToString::to_string);
                let data = field.bytes().await.map_err(malformed)?;
                form.files.push(FormFile { field: name, file_name, content_type, data });
            }
            None => {
                let text = field.text().await.map_err(malformed)?;
                form.push(name, text);
            }
        }
    }

    Ok(form)
}

fn malformed(e: multer::Error) -> Error {
    BindingError::new(format!("body contains malformed multipart data: {e}")).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multipart_body(boundary: &str, parts: &[(&str, Option<&str>, &str)]) -> Bytes {
        let mut body = String::new();
        for (name, file_name, data) in parts {
            body.push_str(&format!("--{boundary}\r\n"));
            match file_name {
                Some(f) => {
                    body.push_str(&format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\nContent-Type: text/plain\r\n\r\n"
                    ));
                }
                None => body.push_str(&format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")),
            }
            body.push_str(data);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{boundary}--\r\n"));
        Bytes::from(body)
    }

    #[test]
    fn kinds_follow_the_content_type() {
        assert_eq!(form_kind(Some("application/x-www-form-urlencoded; charset=utf-8")), FormKind::UrlEncoded);
        assert_eq!(
            form_kind(Some("multipart/form-data; boundary=xyz")),
            FormKind::Multipart { boundary: Some("xyz".to_owned()) }
        );
        assert_eq!(form_kind(Some("multipart/form-data")), FormKind::Multipart { boundary: None });
        assert_eq!(form_kind(Some("application/json")), FormKind::Other);
        assert_eq!(form_kind(None), FormKind::Other);
    }

    #[test]
    fn urlencoded_keeps_repeats() {
        let form = parse_urlencoded(b"name=ada+lovelace&tag=a&tag=b&empty=");
        assert_eq!(form.value("name"), Some("ada lovelace"));
        assert_eq!(form.values("tag"), ["a", "b"]);
        assert_eq!(form.value("empty"), Some(""));
        assert_eq!(form.value("missing"), None);
        assert!(form.values("missing").is_empty());
    }

    #[tokio::test]
    async fn multipart_splits_values_and_files() {
        let body = multipart_body("XyZ", &[("title", None, "notes"), ("upload", Some("a.txt"), "hello")]);
        let form = parse_multipart("XyZ", body).await.unwrap();

        assert_eq!(form.value("title"), Some("notes"));
        let file = form.file("upload").unwrap();
        assert_eq!(file.file_name, "a.txt");
        assert_eq!(file.content_type.as_deref(), Some("text/plain"));
        assert_eq!(file.data.as_ref(), b"hello");
        assert_eq!(form.files().len(), 1);
    }

    #[tokio::test]
    async fn truncated_multipart_is_a_binding_error() {
        let err = parse_multipart("XyZ", Bytes::from_static(b"--XyZ\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nunterminated"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::Binding(ref b) if b.message.starts_with("body contains malformed multipart data")),
            "{err:?}"
        );
    }
}
