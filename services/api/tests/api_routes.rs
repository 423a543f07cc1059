//! Handler tests for the category and product routes

use api::{AppState, routes::create_router};
use async_trait::async_trait;
use auth::{
    jwt::{JwtConfig, JwtService},
    middleware::AuthState,
};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use marketplace::{
    Marketplace,
    models::{NewUser, SellerProfile, User},
    notifier::{Channel, DispatchSink, NotifierConfig, NotifyTarget, SinkError},
    repositories::InMemoryStore,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tower::ServiceExt; // For oneshot()

#[derive(Default)]
struct RecordingSink {
    destinations: Mutex<Vec<String>>,
}

#[async_trait]
impl DispatchSink for RecordingSink {
    async fn send(&self, _: Channel, destination: &str, _: &str) -> Result<(), SinkError> {
        self.destinations
            .lock()
            .unwrap()
            .push(destination.to_string());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

struct TestApp {
    router: Router,
    market: Marketplace,
    jwt: JwtService,
    sink: Arc<RecordingSink>,
}

impl TestApp {
    fn new() -> Self {
        let sink = Arc::new(RecordingSink::default());
        let config = NotifierConfig {
            target: NotifyTarget::Subscriber,
            ..NotifierConfig::default()
        }
        .inline();
        let market = Marketplace::in_memory(InMemoryStore::new(), sink.clone(), config);
        let jwt = JwtService::new(JwtConfig {
            secret: "test-secret".to_string(),
            access_token_expiry: 300,
        });
        let state = AppState {
            market: market.clone(),
            auth: AuthState {
                jwt: jwt.clone(),
                identity: market.identity.clone(),
            },
        };

        Self {
            router: create_router(state),
            market,
            jwt,
            sink,
        }
    }

    async fn user(&self, email: &str, seller: bool) -> (User, String) {
        let mut user = self
            .market
            .identity
            .register(NewUser {
                email: email.to_string(),
                password: "Secret123".to_string(),
                name: "Tester".to_string(),
            })
            .await
            .unwrap();
        if seller {
            user = self
                .market
                .identity
                .become_seller(
                    user.id,
                    SellerProfile {
                        phone: "+15550100".to_string(),
                        location: "Porto".to_string(),
                    },
                )
                .await
                .unwrap();
        }
        let token = self.jwt.generate_access_token(&user).unwrap();
        (user, token)
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();
    let (status, body) = app.send("GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "api-service");
}

#[tokio::test]
async fn test_category_writes_need_a_seller_or_admin() {
    let app = TestApp::new();
    let (_admin, _) = app.user("admin@example.com", false).await;
    let (_buyer, buyer_token) = app.user("buyer@example.com", false).await;
    let (_seller, seller_token) = app.user("seller@example.com", true).await;
    let tools = json!({"name": "Power Tools", "description": "Drills"});

    let (status, _) = app.send("POST", "/categories", None, Some(tools.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send("POST", "/categories", Some(&buyer_token), Some(tools.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send("POST", "/categories", Some(&seller_token), Some(tools))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["slug"], "power-tools");

    let (status, body) = app.send("GET", "/categories/power-tools", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Power Tools");

    let (status, body) = app.send("GET", "/categories", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_product_lifecycle_over_http() {
    let app = TestApp::new();
    let (_admin, admin_token) = app.user("admin@example.com", false).await;
    let (_owner, owner_token) = app.user("owner@example.com", true).await;
    let (_rival, rival_token) = app.user("rival@example.com", true).await;
    let (_buyer, buyer_token) = app.user("buyer@example.com", false).await;

    let (status, category) = app
        .send(
            "POST",
            "/categories",
            Some(&admin_token),
            Some(json!({"name": "Tools"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let hammer = json!({"name": "Hammer", "cost": 10.0, "categories": ["Tools"]});
    let (status, _) = app
        .send("POST", "/products", Some(&buyer_token), Some(hammer.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, product) = app
        .send("POST", "/products", Some(&owner_token), Some(hammer))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(product["in_stock"], true);
    let product_uri = format!("/products/{}", product["id"].as_str().unwrap());

    let (status, _) = app
        .send(
            "POST",
            "/products/subscribe",
            Some(&buyer_token),
            Some(json!({"productId": product["id"]})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(
            "PATCH",
            &product_uri,
            Some(&rival_token),
            Some(json!({"inStock": true})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(app.sink.destinations.lock().unwrap().is_empty());

    let (status, _) = app
        .send(
            "PATCH",
            &product_uri,
            Some(&owner_token),
            Some(json!({"inStock": true})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        *app.sink.destinations.lock().unwrap(),
        vec!["buyer@example.com".to_string()]
    );

    let by_category = format!(
        "/products/category/{}",
        category["id"].as_str().unwrap()
    );
    let (status, listed) = app.send("GET", &by_category, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let category_uri = format!("/categories/{}", category["id"].as_str().unwrap());
    let (status, _) = app
        .send("DELETE", &category_uri, Some(&admin_token), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .send("DELETE", &product_uri, Some(&owner_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"affected": 1}));

    let (status, _) = app.send("GET", &product_uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send("DELETE", &category_uri, Some(&admin_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_subscribe_validates_ids() {
    let app = TestApp::new();
    let (_user, token) = app.user("buyer@example.com", false).await;

    let (status, body) = app
        .send(
            "POST",
            "/categories/subscribe",
            Some(&token),
            Some(json!({"categoryId": "not-a-uuid"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("not-a-uuid"));

    let (status, _) = app
        .send(
            "POST",
            "/categories/subscribe",
            Some(&token),
            Some(json!({"categoryId": uuid::Uuid::new_v4()})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
