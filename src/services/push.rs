use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::notification::PushMessage;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// 推送网关；调用失败只影响推送，不影响已写入的通知
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(&self, message: &PushMessage) -> Result<()>;
}

pub fn create_push_gateway(config: &Config) -> Result<Arc<dyn PushGateway>> {
    if !config.push_enabled {
        info!("Push delivery disabled; notifications will only be stored");
        return Ok(Arc::new(DisabledPushGateway));
    }

    Ok(Arc::new(HttpPushGateway::new(
        &config.push_endpoint,
        config.push_access_token.clone(),
    )?))
}

/// Expo 风格的 HTTP 推送接口
#[derive(Debug, Clone)]
pub struct HttpPushGateway {
    endpoint: String,
    access_token: Option<String>,
    http_client: reqwest::Client,
}

impl HttpPushGateway {
    pub fn new(endpoint: &str, access_token: Option<String>) -> Result<Self> {
        url::Url::parse(endpoint)
            .map_err(|e| AppError::Internal(format!("Invalid push endpoint {}: {}", endpoint, e)))?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            access_token: access_token.filter(|token| !token.is_empty()),
            http_client,
        })
    }
}

#[async_trait]
impl PushGateway for HttpPushGateway {
    async fn send(&self, message: &PushMessage) -> Result<()> {
        let payload = json!({
            "to": message.token,
            "title": message.title,
            "body": message.body,
            "data": message.data,
            "sound": "default",
        });

        let mut request = self
            .http_client
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .json(&payload);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Push(format!("gateway returned {}: {}", status, body)));
        }

        debug!("Push delivered: {}", message.title);
        Ok(())
    }
}

/// 关闭推送时使用
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledPushGateway;

#[async_trait]
impl PushGateway for DisabledPushGateway {
    async fn send(&self, message: &PushMessage) -> Result<()> {
        debug!("Push disabled, dropping message: {}", message.title);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message() -> PushMessage {
        PushMessage {
            token: "ExponentPushToken[abc]".to_string(),
            title: "New like".to_string(),
            body: "alice liked your post".to_string(),
            data: json!({"type": "like", "postId": "p1"}),
        }
    }

    #[tokio::test]
    async fn test_http_gateway_posts_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/push/send"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(json!({
                "to": "ExponentPushToken[abc]",
                "title": "New like",
                "data": {"type": "like", "postId": "p1"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"status": "ok"}})))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = HttpPushGateway::new(&format!("{}/push/send", server.uri()), Some("secret".to_string())).unwrap();
        gateway.send(&message()).await.unwrap();
    }

    #[tokio::test]
    async fn test_http_gateway_reports_failure_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let gateway = HttpPushGateway::new(&server.uri(), None).unwrap();
        let err = gateway.send(&message()).await.unwrap_err();
        assert!(matches!(err, AppError::Push(_)));
    }

    #[test]
    fn test_rejects_invalid_endpoint() {
        assert!(HttpPushGateway::new("not a url", None).is_err());
    }
}
