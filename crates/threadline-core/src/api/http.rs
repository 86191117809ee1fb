//! HTTP implementation of the remote collaborators.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use threadline_config::ApiConfig;
use tracing::debug;

use crate::BoxFuture;
use crate::build_info;
use crate::identity::{Identity, USER_ID_HEADER};
use crate::model::{Contact, ContactId, MessageId};
use crate::target::Address;

use super::types::*;
use super::{ApiError, ContactDirectory, MessageStore};

/// Client for the auth, users, contacts, and messages endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    config: ApiConfig,
}

impl ApiClient {
    /// Build a client from the `[api]` config section.
    pub fn from_config(config: &ApiConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(build_info::user_agent())
            .build()
            .map_err(|e| ApiError::Client(e.to_string()))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Sign in (or register) by phone number. The returned identity's user id
    /// authenticates every later call.
    pub async fn login(&self, phone: &str, name: &str) -> Result<Identity, ApiError> {
        let body = LoginRequest {
            phone: phone.trim().to_string(),
            name: name.trim().to_string(),
        };
        debug!(phone = %body.phone, "Login request");
        let resp = send(self.client.post(&self.config.auth_url).json(&body)).await?;
        let user: LoginResponse = parse_json(resp).await?;
        Ok(Identity::from(user))
    }

    fn authed(&self, builder: RequestBuilder, user_id: &str) -> RequestBuilder {
        builder.header(USER_ID_HEADER, user_id)
    }
}

/// Send a request and map transport failures and non-2xx statuses.
async fn send(builder: RequestBuilder) -> Result<Response, ApiError> {
    let resp = builder
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout
            } else {
                ApiError::Network(e.to_string())
            }
        })?;

    let status = resp.status();
    if status.as_u16() == 401 {
        return Err(ApiError::Unauthorized);
    }
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error)
            .unwrap_or(text);
        return Err(ApiError::Server {
            status: status.as_u16(),
            message,
        });
    }
    Ok(resp)
}

async fn parse_json<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    let bytes = resp.bytes().await.map_err(|e| {
        if e.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Network(e.to_string())
        }
    })?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Parse(e.to_string()))
}

impl MessageStore for ApiClient {
    fn fetch_messages(
        &self,
        user_id: String,
        address: Address,
    ) -> BoxFuture<'_, Result<MessagePage, ApiError>> {
        Box::pin(async move {
            let (key, value) = address.query_pair();
            debug!(key, value, "Fetching messages");
            let request = self
                .client
                .get(&self.config.messages_url)
                .query(&[(key, value)]);
            let resp = send(self.authed(request, &user_id)).await?;
            parse_json(resp).await
        })
    }

    fn send_message(
        &self,
        user_id: String,
        request: SendRequest,
    ) -> BoxFuture<'_, Result<SendReceipt, ApiError>> {
        Box::pin(async move {
            let builder = self.client.post(&self.config.messages_url).json(&request);
            let resp = send(self.authed(builder, &user_id)).await?;
            parse_json(resp).await
        })
    }

    fn edit_message(
        &self,
        user_id: String,
        request: EditRequest,
    ) -> BoxFuture<'_, Result<(), ApiError>> {
        Box::pin(async move {
            let builder = self.client.put(&self.config.messages_url).json(&request);
            send(self.authed(builder, &user_id)).await?;
            Ok(())
        })
    }

    fn delete_message(
        &self,
        user_id: String,
        message_id: MessageId,
    ) -> BoxFuture<'_, Result<(), ApiError>> {
        Box::pin(async move {
            let builder = self
                .client
                .delete(&self.config.messages_url)
                .query(&[("messageId", message_id.as_str())]);
            send(self.authed(builder, &user_id)).await?;
            Ok(())
        })
    }
}

impl ContactDirectory for ApiClient {
    fn list_contacts(&self, user_id: String) -> BoxFuture<'_, Result<Vec<Contact>, ApiError>> {
        Box::pin(async move {
            let builder = self.client.get(&self.config.contacts_url);
            let resp = send(self.authed(builder, &user_id)).await?;
            let list: ContactList = parse_json(resp).await?;
            Ok(list.contacts.into_iter().map(Contact::from).collect())
        })
    }

    fn add_contact(
        &self,
        user_id: String,
        contact_id: ContactId,
    ) -> BoxFuture<'_, Result<(), ApiError>> {
        Box::pin(async move {
            let body = AddContactRequest { contact_id };
            let builder = self.client.post(&self.config.contacts_url).json(&body);
            send(self.authed(builder, &user_id)).await?;
            Ok(())
        })
    }

    fn search_users(
        &self,
        user_id: Option<String>,
        query: String,
    ) -> BoxFuture<'_, Result<Vec<Contact>, ApiError>> {
        Box::pin(async move {
            let mut builder = self
                .client
                .get(&self.config.users_url)
                .query(&[("query", query.trim())]);
            if let Some(ref user_id) = user_id {
                builder = self.authed(builder, user_id);
            }
            let resp = send(builder).await?;
            let list: UserList = parse_json(resp).await?;
            Ok(list.users.into_iter().map(Contact::from).collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    use super::*;
    use crate::model::ChatId;

    /// Requests seen by the fake server: (method, user id header, query, body).
    #[derive(Clone, Default)]
    struct Seen(Arc<Mutex<Vec<(String, Option<String>, HashMap<String, String>, Value)>>>);

    impl Seen {
        fn record(&self, method: &str, headers: &HeaderMap, query: HashMap<String, String>, body: Value) {
            let user = headers
                .get(USER_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            self.0
                .lock()
                .unwrap()
                .push((method.to_string(), user, query, body));
        }

        fn all(&self) -> Vec<(String, Option<String>, HashMap<String, String>, Value)> {
            self.0.lock().unwrap().clone()
        }
    }

    fn unauthorized() -> (StatusCode, Json<Value>) {
        (StatusCode::UNAUTHORIZED, Json(json!({"error": "Unauthorized"})))
    }

    async fn messages_get(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Query(query): Query<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        if !headers.contains_key(USER_ID_HEADER) {
            return unauthorized();
        }
        seen.record("GET", &headers, query, Value::Null);
        (
            StatusCode::OK,
            Json(json!({
                "chatId": 77,
                "messages": [
                    {"id": 1, "senderId": 2, "text": "hi", "isVoice": false,
                     "createdAt": "2024-03-01T09:05:00", "senderName": "Anna", "isOwn": false},
                    {"id": 2, "senderId": 1, "text": "yo", "isOwn": true, "replyToId": 1}
                ]
            })),
        )
    }

    async fn messages_post(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        seen.record("POST", &headers, HashMap::new(), body.clone());
        if body.get("text").and_then(Value::as_str) == Some("boom") {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "database unavailable"})),
            );
        }
        (
            StatusCode::CREATED,
            Json(json!({"id": 501, "chatId": 77, "createdAt": "2024-03-01T09:06:00"})),
        )
    }

    async fn messages_put(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        seen.record("PUT", &headers, HashMap::new(), body.clone());
        if body.get("messageId") == Some(&json!(9)) {
            return (StatusCode::FORBIDDEN, Json(json!({"error": "Forbidden"})));
        }
        (StatusCode::OK, Json(json!({"success": true})))
    }

    async fn messages_delete(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Query(query): Query<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        seen.record("DELETE", &headers, query, Value::Null);
        (StatusCode::OK, Json(json!({"success": true})))
    }

    async fn contacts_get(headers: HeaderMap) -> (StatusCode, Json<Value>) {
        let user = headers.get(USER_ID_HEADER).and_then(|v| v.to_str().ok());
        if user.is_none_or(str::is_empty) {
            return unauthorized();
        }
        (
            StatusCode::OK,
            Json(json!({"contacts": [
                {"id": 2, "phone": "+15550102", "name": "Anna", "avatar": null,
                 "bio": null, "isOnline": true, "addedAt": "2024-01-01T00:00:00"}
            ]})),
        )
    }

    async fn contacts_post(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        seen.record("POST contacts", &headers, HashMap::new(), body);
        (StatusCode::CREATED, Json(json!({"success": true})))
    }

    async fn users_get(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Query(query): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        seen.record("GET users", &headers, query, Value::Null);
        Json(json!({"users": [{"id": 5, "phone": "+15550105", "name": "Vera"}]}))
    }

    async fn auth_post(Json(body): Json<Value>) -> Json<Value> {
        Json(json!({
            "id": 42, "phone": body["phone"], "name": body["name"],
            "avatar": null, "bio": null, "is_online": true
        }))
    }

    async fn spawn_server() -> (ApiClient, Seen) {
        let seen = Seen::default();
        let app = Router::new()
            .route(
                "/messages",
                get(messages_get)
                    .post(messages_post)
                    .put(messages_put)
                    .delete(messages_delete),
            )
            .route("/contacts", get(contacts_get).post(contacts_post))
            .route("/users", get(users_get))
            .route("/auth", post(auth_post))
            .with_state(seen.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let base = format!("http://{addr}");
        let config = ApiConfig {
            auth_url: format!("{base}/auth"),
            users_url: format!("{base}/users"),
            contacts_url: format!("{base}/contacts"),
            messages_url: format!("{base}/messages"),
            request_timeout_secs: 5,
        };
        (ApiClient::from_config(&config).unwrap(), seen)
    }

    #[tokio::test]
    async fn test_fetch_messages_by_chat_id() {
        let (client, seen) = spawn_server().await;
        let page = client
            .fetch_messages("1".to_string(), Address::Chat(ChatId::from("77")))
            .await
            .unwrap();

        assert_eq!(page.chat_id, Some(ChatId::from("77")));
        assert_eq!(page.messages.len(), 2);
        assert_eq!(page.messages[0].sender_name.as_deref(), Some("Anna"));
        assert_eq!(page.messages[1].reply_to_id, Some(MessageId::from("1")));

        let requests = seen.all();
        assert_eq!(requests[0].1.as_deref(), Some("1"));
        assert_eq!(requests[0].2.get("chatId").map(String::as_str), Some("77"));
        assert!(!requests[0].2.contains_key("contactId"));
    }

    #[tokio::test]
    async fn test_fetch_messages_by_contact_id() {
        let (client, seen) = spawn_server().await;
        client
            .fetch_messages("1".to_string(), Address::Contact(ContactId::from("2")))
            .await
            .unwrap();
        assert_eq!(
            seen.all()[0].2.get("contactId").map(String::as_str),
            Some("2")
        );
    }

    #[tokio::test]
    async fn test_send_message_returns_receipt() {
        let (client, seen) = spawn_server().await;
        let request = SendRequest::new(
            &Address::Contact(ContactId::from("2")),
            &crate::model::MessageBody::Text("hello".to_string()),
            None,
        );
        let receipt = client
            .send_message("1".to_string(), request)
            .await
            .unwrap();

        assert_eq!(receipt.id, MessageId::from("501"));
        assert_eq!(receipt.chat_id, Some(ChatId::from("77")));
        assert_eq!(seen.all()[0].3, json!({"text": "hello", "contactId": 2}));
    }

    #[tokio::test]
    async fn test_server_error_carries_message() {
        let (client, _seen) = spawn_server().await;
        let request = SendRequest::new(
            &Address::Chat(ChatId::from("77")),
            &crate::model::MessageBody::Text("boom".to_string()),
            None,
        );
        let err = client
            .send_message("1".to_string(), request)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ApiError::Server {
                status: 500,
                message: "database unavailable".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_edit_forbidden() {
        let (client, _seen) = spawn_server().await;
        let ok = client
            .edit_message(
                "1".to_string(),
                EditRequest {
                    message_id: MessageId::from("5"),
                    text: "hello".to_string(),
                },
            )
            .await;
        assert!(ok.is_ok());

        let err = client
            .edit_message(
                "1".to_string(),
                EditRequest {
                    message_id: MessageId::from("9"),
                    text: "nope".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Server { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_delete_sends_message_id_query() {
        let (client, seen) = spawn_server().await;
        client
            .delete_message("1".to_string(), MessageId::from("7"))
            .await
            .unwrap();
        let requests = seen.all();
        assert_eq!(requests[0].0, "DELETE");
        assert_eq!(requests[0].2.get("messageId").map(String::as_str), Some("7"));
    }

    #[tokio::test]
    async fn test_contacts_require_user_id() {
        let (client, _seen) = spawn_server().await;
        let contacts = client.list_contacts("1".to_string()).await.unwrap();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].name, "Anna");
        assert!(contacts[0].is_online);

        let err = client.list_contacts(String::new()).await.unwrap_err();
        assert_eq!(err, ApiError::Unauthorized);
    }

    #[tokio::test]
    async fn test_add_contact_and_search() {
        let (client, seen) = spawn_server().await;
        client
            .add_contact("1".to_string(), ContactId::from("5"))
            .await
            .unwrap();
        let users = client
            .search_users(None, "  Ve ".to_string())
            .await
            .unwrap();
        assert_eq!(users[0].name, "Vera");

        let requests = seen.all();
        assert_eq!(requests[0].3, json!({"contactId": 5}));
        assert_eq!(requests[1].1, None);
        assert_eq!(requests[1].2.get("query").map(String::as_str), Some("Ve"));
    }

    #[tokio::test]
    async fn test_login_returns_identity() {
        let (client, _seen) = spawn_server().await;
        let identity = client.login("+15550100", " Alice ").await.unwrap();
        assert_eq!(identity.user_id, "42");
        assert_eq!(identity.name.as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        let config = ApiConfig {
            messages_url: "http://127.0.0.1:9/messages".to_string(),
            request_timeout_secs: 2,
            ..ApiConfig::default()
        };
        let client = ApiClient::from_config(&config).unwrap();
        let err = client
            .fetch_messages("1".to_string(), Address::Chat(ChatId::from("1")))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Network(_) | ApiError::Timeout));
    }
}
