use bytes::Bytes;
use gale_instruments::prelude::TagSet;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;

/// One field of a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq)]
pub enum MultipartField {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        filename: String,
        content_type: String,
        data: Bytes,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Bytes(Bytes),
    Multipart(Vec<MultipartField>),
}

/// Everything needed to issue one request.
///
/// ```rust
/// use gale_http_client::prelude::RequestSpec;
///
/// let spec = RequestSpec::get("http://localhost:8080/api/v1/deals/D0001").name("get_deal");
/// assert_eq!("get_deal", spec.request_name());
/// ```
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
    pub tags: TagSet,
    pub name: Option<String>,
}

impl RequestSpec {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            tags: TagSet::new(),
            name: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Add a header. Names or values that aren't valid HTTP are rejected.
    pub fn header(mut self, name: &str, value: &str) -> anyhow::Result<Self> {
        self.headers.insert(
            HeaderName::from_bytes(name.as_bytes())?,
            HeaderValue::from_str(value)?,
        );
        Ok(self)
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = RequestBody::Bytes(body.into());
        self
    }

    /// Add a text field, switching the body to multipart if it isn't already.
    pub fn text_field(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.multipart_field(MultipartField::Text {
            name: name.into(),
            value: value.into(),
        })
    }

    /// Add a file field, switching the body to multipart if it isn't already.
    pub fn file_field(
        self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: Bytes,
    ) -> Self {
        self.multipart_field(MultipartField::File {
            name: name.into(),
            filename: filename.into(),
            content_type: content_type.into(),
            data,
        })
    }

    fn multipart_field(mut self, field: MultipartField) -> Self {
        match &mut self.body {
            RequestBody::Multipart(fields) => fields.push(field),
            _ => self.body = RequestBody::Multipart(vec![field]),
        }
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key, value);
        self
    }

    /// Group requests under this name in metrics instead of their URL.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The value of the `name` tag, which is the URL unless a name was set.
    pub fn request_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }

    /// Tags for the sample of this request: the user tags, `method`, `url` and `name`, then any of
    /// `base` that are not already set.
    pub(crate) fn sample_tags(&self, base: &TagSet) -> TagSet {
        let mut tags = self
            .tags
            .clone()
            .with_tag("method", self.method.as_str())
            .with_tag("url", self.url.clone())
            .with_tag("name", self.request_name().to_string());
        tags.merge_missing(base);
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn name_defaults_to_url() {
        let spec = RequestSpec::get("http://deals-app:8080/api/v1/deals");
        assert_eq!("http://deals-app:8080/api/v1/deals", spec.request_name());

        let tags = spec.sample_tags(&TagSet::new().with_tag("scenario", "stress"));
        assert_eq!(Some("GET"), tags.get("method"));
        assert_eq!(Some("http://deals-app:8080/api/v1/deals"), tags.get("name"));
        assert_eq!(Some("stress"), tags.get("scenario"));
    }

    #[test]
    fn user_tags_win_over_base_tags() {
        let spec = RequestSpec::get("http://localhost/health")
            .name("health")
            .tag("scenario", "custom");
        let tags = spec.sample_tags(&TagSet::new().with_tag("scenario", "stress"));
        assert_eq!(Some("custom"), tags.get("scenario"));
        assert_eq!(Some("health"), tags.get("name"));
    }

    #[test]
    fn fields_accumulate_into_multipart_body() {
        let spec = RequestSpec::post("http://localhost/import")
            .text_field("source", "k6")
            .file_field("file", "a.csv", "text/csv", Bytes::from_static(b"dealId\n"));

        match spec.body {
            RequestBody::Multipart(fields) => assert_eq!(2, fields.len()),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn invalid_header_is_rejected() {
        assert!(RequestSpec::get("http://localhost")
            .header("bad header", "x")
            .is_err());
    }
}
