//! HTTP adapters for the hotline, emergency-services and contact notifier ports.
//!
//! Each adapter POSTs the port's request as JSON to one configured endpoint.
//! Retries and credentials belong to the remote service; these adapters only
//! classify the response.

use std::time::Duration;

use async_trait::async_trait;
use beacon_core::escalation::{
    ContactMessage, ContactNotifier, ContactReceipt, EmergencyDispatch, EmergencyNotifier,
    EmergencyRequest, HotlineNotifier, HotlineRequest, HotlineSession, NotifierError,
};
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// HTTP client shared by the adapters, with the per-request timeout it was
/// built with.
#[derive(Debug, Clone)]
pub struct NotifierClient {
    http: reqwest::Client,
    timeout: Duration,
}

pub fn http_client(timeout: Duration) -> Result<NotifierClient, reqwest::Error> {
    let http = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("beacon-api/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(NotifierClient { http, timeout })
}

/// Shared client and endpoint. An adapter without an endpoint always reports
/// the service as unreachable so escalation falls back to direct-dial guidance.
#[derive(Debug, Clone)]
struct Endpoint {
    client: NotifierClient,
    url: Option<String>,
    name: &'static str,
}

impl Endpoint {
    async fn post<B, R>(&self, body: &B, recipient_errors: bool) -> Result<R, NotifierError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let Some(url) = &self.url else {
            return Err(NotifierError::Unreachable(format!(
                "no {} endpoint configured",
                self.name
            )));
        };

        let response = self
            .client
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if recipient_errors && status == StatusCode::UNPROCESSABLE_ENTITY {
            let detail = response.text().await.unwrap_or_default();
            return Err(NotifierError::InvalidRecipient(truncate(&detail)));
        }
        if !status.is_success() {
            return Err(NotifierError::Rejected(format!(
                "{} returned {}",
                self.name,
                status.as_u16()
            )));
        }

        response.json::<R>().await.map_err(|e| {
            if e.is_timeout() {
                self.transport_error(e)
            } else {
                NotifierError::Rejected(format!("{} returned an unreadable body: {e}", self.name))
            }
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> NotifierError {
        if e.is_timeout() {
            NotifierError::Timeout(self.client.timeout)
        } else {
            NotifierError::Unreachable(format!("{} request failed: {e}", self.name))
        }
    }
}

fn truncate(detail: &str) -> String {
    const MAX: usize = 200;
    if detail.chars().count() <= MAX {
        detail.to_string()
    } else {
        detail.chars().take(MAX).collect()
    }
}

#[derive(Debug, Clone)]
pub struct HttpHotlineNotifier(Endpoint);

impl HttpHotlineNotifier {
    pub fn new(client: NotifierClient, url: Option<String>) -> Self {
        Self(Endpoint {
            client,
            url,
            name: "hotline",
        })
    }
}

#[async_trait]
impl HotlineNotifier for HttpHotlineNotifier {
    async fn connect(&self, request: HotlineRequest) -> Result<HotlineSession, NotifierError> {
        self.0.post(&request, false).await
    }
}

#[derive(Debug, Clone)]
pub struct HttpEmergencyNotifier(Endpoint);

impl HttpEmergencyNotifier {
    pub fn new(client: NotifierClient, url: Option<String>) -> Self {
        Self(Endpoint {
            client,
            url,
            name: "emergency services",
        })
    }
}

#[async_trait]
impl EmergencyNotifier for HttpEmergencyNotifier {
    async fn dispatch(
        &self,
        request: EmergencyRequest,
    ) -> Result<EmergencyDispatch, NotifierError> {
        self.0.post(&request, false).await
    }
}

#[derive(Debug, Clone)]
pub struct HttpContactNotifier(Endpoint);

impl HttpContactNotifier {
    pub fn new(client: NotifierClient, url: Option<String>) -> Self {
        Self(Endpoint {
            client,
            url,
            name: "contact messaging",
        })
    }
}

#[async_trait]
impl ContactNotifier for HttpContactNotifier {
    async fn notify(&self, message: ContactMessage) -> Result<ContactReceipt, NotifierError> {
        self.0.post(&message, true).await
    }
}

#[cfg(test)]
mod tests {
    use beacon_core::escalation::{Contact, ContactKind, Urgency};
    use beacon_core::lexicon::Language;
    use beacon_core::risk::RiskLevel;
    use serde_json::json;
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client() -> NotifierClient {
        http_client(Duration::from_secs(2)).unwrap()
    }

    fn hotline_request() -> HotlineRequest {
        HotlineRequest {
            user_id: Uuid::now_v7(),
            language: Language::Es,
            urgency: Urgency::Immediate,
        }
    }

    fn message() -> ContactMessage {
        ContactMessage {
            user_id: Uuid::now_v7(),
            contact: Contact {
                id: "c1".into(),
                name: "Sam".into(),
                phone: Some("+1 555 010 0101".into()),
                email: None,
                relationship: None,
                kind: ContactKind::FamilyMember,
            },
            risk_level: RiskLevel::High,
            language: Language::En,
        }
    }

    #[tokio::test]
    async fn hotline_session_is_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/connect"))
            .and(body_partial_json(json!({ "language": "es", "urgency": "immediate" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "session_id": "s-42" })))
            .mount(&server)
            .await;

        let notifier =
            HttpHotlineNotifier::new(client(), Some(format!("{}/connect", server.uri())));
        let session = notifier.connect(hotline_request()).await.unwrap();
        assert_eq!(session.session_id, "s-42");
    }

    #[tokio::test]
    async fn server_errors_are_rejections() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let notifier = HttpEmergencyNotifier::new(client(), Some(server.uri()));
        let err = notifier
            .dispatch(EmergencyRequest {
                user_id: Uuid::now_v7(),
                risk_level: RiskLevel::Critical,
                triggers: vec!["imminent".into()],
                location: None,
                language: Language::En,
            })
            .await
            .unwrap_err();
        assert_eq!(
            err,
            NotifierError::Rejected("emergency services returned 503".into())
        );
    }

    #[tokio::test]
    async fn unprocessable_contact_is_an_invalid_recipient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("number not in service"))
            .mount(&server)
            .await;

        let notifier = HttpContactNotifier::new(client(), Some(server.uri()));
        let err = notifier.notify(message()).await.unwrap_err();
        assert_eq!(
            err,
            NotifierError::InvalidRecipient("number not in service".into())
        );
    }

    #[tokio::test]
    async fn missing_endpoint_is_unreachable() {
        let notifier = HttpHotlineNotifier::new(client(), None);
        assert!(matches!(
            notifier.connect(hotline_request()).await,
            Err(NotifierError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        let notifier =
            HttpContactNotifier::new(client(), Some("http://127.0.0.1:9/notify".into()));
        assert!(matches!(
            notifier.notify(message()).await,
            Err(NotifierError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn slow_endpoint_reports_the_client_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "session_id": "s-late" }))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let timeout = Duration::from_millis(100);
        let notifier =
            HttpHotlineNotifier::new(http_client(timeout).unwrap(), Some(server.uri()));
        assert_eq!(
            notifier.connect(hotline_request()).await,
            Err(NotifierError::Timeout(timeout))
        );
    }
}
