//! Generic "list with pagination then flatten" (§9): parameterized by the
//! element type and a `(url, next_link)` pair; the concrete datasource
//! only supplies the element type and the base path.

use reqwest::Client;
use serde::de::DeserializeOwned;

use super::Error;

/// A single page of a paginated collection, with an optional link to the
/// next page. Adapters deserialize their upstream's page shape into this
/// via a small wrapper that implements `Page`.
pub trait Page<T> {
    fn items(self) -> Vec<T>;
    fn next_link(&self) -> Option<&str>;
}

/// Follows `next_link` until exhaustion, materializing the full
/// collection before returning — callers persist the aggregate inside one
/// transaction, never a partial page at a time (§4.1).
pub async fn fetch_all<T, P>(
    client: &Client,
    bearer_token: &str,
    first_url: &str,
) -> Result<Vec<T>, Error>
where
    T: DeserializeOwned,
    P: Page<T> + DeserializeOwned,
{
    let mut items = Vec::new();
    let mut next = Some(first_url.to_string());

    while let Some(url) = next.take() {
        let response = client
            .get(&url)
            .bearer_auth(bearer_token)
            .send()
            .await?
            .error_for_status()?;
        let page: P = response
            .json()
            .await
            .map_err(|e| Error::Malformed(e.to_string()))?;
        next = page.next_link().map(str::to_string);
        items.extend(page.items());
    }

    Ok(items)
}
