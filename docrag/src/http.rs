//! Status classification shared by the REST providers.

use reqwest::{Response, StatusCode};
use serde::Deserialize;

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Rate limiting, request timeouts and server errors are worth retrying.
pub(crate) fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// Consume a non-success response into `(message, transient)`.
///
/// Both Gemini and OpenAI wrap failures as `{"error": {"message": ...}}`;
/// anything else is reported as the raw body.
pub(crate) async fn failure(response: Response) -> (String, bool) {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail =
        serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
    (format!("API returned {status}: {detail}"), is_transient_status(status))
}
