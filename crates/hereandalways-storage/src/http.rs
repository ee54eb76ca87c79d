use reqwest::{Response, StatusCode};

/// Pull a human-readable message out of a failed response.
///
/// Both the backend and Supabase put it in `message` or `error`; anything
/// else falls back to the raw body.
pub(crate) async fn error_message(resp: Response) -> (StatusCode, String) {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();

    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|json| {
            json.get("message")
                .or_else(|| json.get("error"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string()
            } else {
                body
            }
        });

    (status, message)
}
