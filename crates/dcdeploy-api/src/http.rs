use std::time::Duration;

use dcdeploy_engine::{ApiError, ApiResult};
use reqwest::Method;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::decode::decode_error;

/// Authenticated JSON client shared by every API surface.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    access_token: String,
}

fn transport(url: &Url, error: &reqwest::Error) -> ApiError {
    ApiError::Transport {
        url: url.to_string(),
        message: error.to_string(),
    }
}

impl HttpClient {
    /// # Errors
    ///
    /// Returns an error when the TLS backend cannot be initialised.
    pub fn new(access_token: String, timeout: Duration) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dcdeploy/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| ApiError::Transport {
                url: String::new(),
                message: error.to_string(),
            })?;
        Ok(Self {
            client,
            access_token,
        })
    }

    pub(crate) fn get<T: DeserializeOwned>(&self, url: &Url) -> ApiResult<T> {
        self.send(Method::GET, url, None::<&()>)
    }

    pub(crate) fn post<B, T>(&self, url: &Url, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(Method::POST, url, Some(body))
    }

    pub(crate) fn patch<B, T>(&self, url: &Url, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(Method::PATCH, url, Some(body))
    }

    pub(crate) fn delete<T: DeserializeOwned>(&self, url: &Url) -> ApiResult<T> {
        self.send(Method::DELETE, url, None::<&()>)
    }

    fn send<B, T>(&self, method: Method, url: &Url, body: Option<&B>) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        tracing::debug!(%method, %url, "api request");
        let mut request = self
            .client
            .request(method, url.clone())
            .bearer_auth(&self.access_token);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().map_err(|error| transport(url, &error))?;
        let status = response.status();
        let text = response.text().map_err(|error| transport(url, &error))?;
        if !status.is_success() {
            tracing::debug!(%url, status = status.as_u16(), "api request failed");
            return Err(decode_error(status.as_u16(), &text));
        }
        let text = if text.trim().is_empty() { "{}" } else { text.as_str() };
        serde_json::from_str(text).map_err(|error| ApiError::Decode {
            url: url.to_string(),
            message: error.to_string(),
        })
    }
}

/// Join `path` below `origin` and append `query`.
///
/// # Errors
///
/// Returns a transport error when the result is not a valid URL.
pub(crate) fn endpoint(origin: &Url, path: &str, query: &[(&str, &str)]) -> ApiResult<Url> {
    let mut url = origin.join(path).map_err(|error| ApiError::Transport {
        url: format!("{origin}{path}"),
        message: error.to_string(),
    })?;
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url)
}

/// One page of a list call. Google APIs name the item field after the resource.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
pub(crate) struct Page<T> {
    #[serde(default, alias = "services", alias = "connectors")]
    pub items: Vec<T>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Follow `nextPageToken` until the listing is exhausted.
pub(crate) fn collect_pages<T, F>(mut fetch: F) -> ApiResult<Vec<T>>
where
    F: FnMut(Option<&str>) -> ApiResult<Page<T>>,
{
    let mut items = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let page = fetch(token.as_deref())?;
        items.extend(page.items);
        match page.next_page_token.filter(|next| !next.is_empty()) {
            Some(next) => token = Some(next),
            None => return Ok(items),
        }
    }
}

pub(crate) fn page_query(token: Option<&str>) -> Vec<(&'static str, &str)> {
    token.map(|token| vec![("pageToken", token)]).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use dcdeploy_engine::ApiError;
    use serde_json::json;

    use super::{Page, collect_pages, endpoint, page_query};
    use crate::config::origin;

    #[test]
    fn endpoint_appends_encoded_query() {
        let base = origin("https://firebasedataconnect.googleapis.com").expect("origin");
        let url = endpoint(
            &base,
            "v1/projects/p/locations/l/services",
            &[("service_id", "movies"), ("pageToken", "a b")],
        )
        .expect("url");
        assert_eq!(
            url.as_str(),
            "https://firebasedataconnect.googleapis.com/v1/projects/p/locations/l/services?service_id=movies&pageToken=a+b"
        );
    }

    #[test]
    fn pages_are_followed_until_the_token_runs_out() {
        let pages = [
            json!({ "services": [{ "n": 1 }, { "n": 2 }], "nextPageToken": "second" }),
            json!({ "services": [{ "n": 3 }], "nextPageToken": "" }),
        ];
        let mut tokens = Vec::new();

        let items: Vec<serde_json::Value> = collect_pages(|token| {
            tokens.push(token.map(ToString::to_string));
            let page = &pages[tokens.len() - 1];
            Ok(serde_json::from_value::<Page<serde_json::Value>>(page.clone()).expect("page"))
        })
        .expect("listing");

        assert_eq!(items.len(), 3);
        assert_eq!(tokens, vec![None, Some("second".to_string())]);
    }

    #[test]
    fn empty_listing_has_no_items_field() {
        let page: Page<serde_json::Value> = serde_json::from_value(json!({})).expect("page");
        assert!(page.items.is_empty());
        assert!(page.next_page_token.is_none());
        assert!(page_query(None).is_empty());
        assert_eq!(page_query(Some("t")), vec![("pageToken", "t")]);
    }

    #[test]
    fn page_failures_stop_the_listing() {
        let result: Result<Vec<serde_json::Value>, ApiError> = collect_pages(|_| {
            Err(ApiError::PermissionDenied {
                message: "nope".to_string(),
            })
        });
        assert!(matches!(result, Err(ApiError::PermissionDenied { .. })));
    }
}
