use crate::{error::AppError, utils::validation::validate_document_id};
use axum::{
    body::Body,
    http::{request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use tracing::{debug, info};

/// 客户端自报的用户 ID 请求头（系统不做认证，只信任客户端提供的 ID）
pub const USER_ID_HEADER: &str = "x-user-id";

/// 请求日志中间件
pub async fn request_logging_middleware(request: Request<Body>, next: Next<Body>) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client_ip = get_client_ip(request.headers());

    let start_time = std::time::Instant::now();

    debug!("Incoming request: {} {} from {}", method, uri, client_ip);

    let response = next.run(request).await;

    let elapsed = start_time.elapsed();
    let status = response.status();

    info!(
        "Request completed: {} {} {} - {}ms",
        method,
        uri,
        status.as_u16(),
        elapsed.as_millis()
    );

    response
}

fn get_client_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded_for) = headers.get("x-forwarded-for") {
        if let Ok(ip_str) = forwarded_for.to_str() {
            if let Some(ip) = ip_str.split(',').next() {
                return ip.trim().to_string();
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return ip_str.to_string();
        }
    }

    "unknown".to_string()
}

fn user_id_from_headers(headers: &HeaderMap) -> Result<Option<String>, AppError> {
    let Some(raw) = headers.get(USER_ID_HEADER) else {
        return Ok(None);
    };

    let user_id = raw
        .to_str()
        .map_err(|_| AppError::bad_request("Invalid X-User-Id header"))?
        .trim()
        .to_string();

    validate_document_id(&user_id)?;
    Ok(Some(user_id))
}

/// 必须携带用户 ID 的请求
#[derive(Debug, Clone)]
pub struct ClientUser(pub String);

#[async_trait::async_trait]
impl<S> axum::extract::FromRequestParts<S> for ClientUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        user_id_from_headers(&parts.headers)?
            .map(ClientUser)
            .ok_or_else(|| AppError::bad_request("Missing X-User-Id header"))
    }
}

/// 可匿名访问的请求
#[derive(Debug, Clone)]
pub struct OptionalClientUser(pub Option<String>);

#[async_trait::async_trait]
impl<S> axum::extract::FromRequestParts<S> for OptionalClientUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalClientUser(user_id_from_headers(&parts.headers)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_user_id_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(matches!(user_id_from_headers(&headers), Ok(None)));

        headers.insert(USER_ID_HEADER, HeaderValue::from_static(" user_1 "));
        assert_eq!(user_id_from_headers(&headers).unwrap(), Some("user_1".to_string()));

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("user:1"));
        assert!(user_id_from_headers(&headers).is_err());
    }

    #[test]
    fn test_get_client_ip() {
        let mut headers = HeaderMap::new();
        assert_eq!(get_client_ip(&headers), "unknown");

        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 10.0.0.2"));
        assert_eq!(get_client_ip(&headers), "10.0.0.1");
    }
}
