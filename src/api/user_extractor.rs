use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
};

use crate::model::{Id, UserContext};

/// Axum extractor for UserContext from request headers
///
/// Session handling lives in front of this service; it forwards the
/// signed-in user as:
/// - X-User-Id: Required, positive integer
///
/// Requests without a usable user id are rejected with 401.
#[async_trait]
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;

        let user_id = extract_header_value(headers, "x-user-id")
            .as_deref()
            .and_then(parse_user_id)
            .ok_or(StatusCode::UNAUTHORIZED)?;

        Ok(UserContext::new(user_id))
    }
}

/// Extract header value as string
fn extract_header_value(headers: &HeaderMap, header_name: &str) -> Option<String> {
    headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .map(|s| s.to_string())
}

fn parse_user_id(value: &str) -> Option<Id> {
    value.trim().parse::<Id>().ok().filter(|id| *id > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue, Request};

    async fn extract(headers: &[(&'static str, &'static str)]) -> Result<UserContext, StatusCode> {
        let mut request = Request::builder().uri("/plan");
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let (mut parts, _) = request.body(()).unwrap().into_parts();
        UserContext::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_user_context_extraction() {
        let ctx = extract(&[("x-user-id", "42")]).await.unwrap();
        assert_eq!(ctx, UserContext::new(42));
    }

    #[tokio::test]
    async fn test_missing_or_invalid_user_is_unauthorized() {
        assert_eq!(extract(&[]).await, Err(StatusCode::UNAUTHORIZED));
        assert_eq!(extract(&[("x-user-id", "anna")]).await, Err(StatusCode::UNAUTHORIZED));
        assert_eq!(extract(&[("x-user-id", "0")]).await, Err(StatusCode::UNAUTHORIZED));
        assert_eq!(extract(&[("x-user-id", "-7")]).await, Err(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_header_lookup() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-user-id"),
            HeaderValue::from_static(" 7 "),
        );

        let raw = extract_header_value(&headers, "x-user-id");
        assert_eq!(raw.as_deref().and_then(parse_user_id), Some(7));
        assert_eq!(extract_header_value(&headers, "x-session"), None);
    }
}
