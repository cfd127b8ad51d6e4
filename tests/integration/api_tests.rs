//! API integration tests
//!
//! Drive the full router in-process over the in-memory store.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;

use bookmart_server::{
    api,
    config::{AppConfig, LoansConfig},
    models::{Book, CreateBook, CreateUser, Role, User, UserClaims},
    repository::{MemoryStore, Store},
    services::{email::LogSender, Services},
    AppState,
};

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    secret: String,
}

impl TestApp {
    fn new() -> Self {
        let config = AppConfig::default();
        let store = Arc::new(MemoryStore::new());
        let services =
            Services::with_sender(store.clone(), &LoansConfig::default(), Arc::new(LogSender));
        let secret = config.auth.jwt_secret.clone();

        let router = api::create_router(AppState {
            config: Arc::new(config),
            services: Arc::new(services),
        });

        Self {
            router,
            store,
            secret,
        }
    }

    async fn user(&self, username: &str, role: Role) -> User {
        self.store
            .insert_user(CreateUser {
                username: username.to_string(),
                email: format!("{}@example.com", username),
                role,
                account_verified: true,
            })
            .await
            .unwrap()
    }

    async fn book(&self, title: &str, quantity: i32) -> Book {
        self.store
            .insert_book(CreateBook {
                title: title.to_string(),
                author: "Ursula K. Le Guin".to_string(),
                description: String::new(),
                price: Decimal::from(12),
                quantity,
            })
            .await
            .unwrap()
    }

    fn token(&self, user: &User) -> String {
        let now = Utc::now().timestamp();
        UserClaims {
            sub: user.username.clone(),
            user_id: user.id,
            role: user.role,
            exp: now + 3600,
            iat: now,
        }
        .create_token(&self.secret)
        .unwrap()
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();

    let (status, body) = app.send(Method::GET, "/api/v1/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.send(Method::GET, "/api/v1/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_unauthorized_access() {
    let app = TestApp::new();
    let book = app.book("The Dispossessed", 1).await;

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/v1/borrow/lend/{}", book.id),
            None,
            Some(json!({ "email": "reader@example.com" })),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NotAuthenticated");

    let (status, _) = app
        .send(Method::GET, "/api/v1/borrow/my-borrowed-books", Some("garbage"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_lend_requires_operator() {
    let app = TestApp::new();
    let reader = app.user("reader", Role::User).await;
    let book = app.book("The Dispossessed", 1).await;

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/api/v1/borrow/lend/{}", book.id),
            Some(&app.token(&reader)),
            Some(json!({ "email": reader.email })),
        )
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(
            Method::GET,
            "/api/v1/borrow/admin/borrowed-books",
            Some(&app.token(&reader)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_lend_then_duplicate_is_rejected() {
    let app = TestApp::new();
    let admin = app.user("admin", Role::Admin).await;
    let reader = app.user("reader", Role::User).await;
    let book = app.book("The Dispossessed", 3).await;
    let token = app.token(&admin);
    let uri = format!("/api/v1/borrow/lend/{}", book.id);

    let (status, body) = app
        .send(
            Method::POST,
            &uri,
            Some(&token),
            Some(json!({ "email": reader.email })),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Book borrowed successfully");
    assert_eq!(body["borrow"]["book_id"], book.id);
    assert_eq!(body["borrow"]["returned"], false);
    assert_eq!(body["user"]["user"]["id"], reader.id);
    assert_eq!(body["user"]["loans"].as_array().unwrap().len(), 1);

    let (status, body) = app
        .send(
            Method::POST,
            &uri,
            Some(&token),
            Some(json!({ "email": reader.email })),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "DuplicateLoan");
}

#[tokio::test]
async fn test_lend_out_of_stock() {
    let app = TestApp::new();
    let admin = app.user("admin", Role::Admin).await;
    let first = app.user("first", Role::User).await;
    let second = app.user("second", Role::User).await;
    let book = app.book("Always Coming Home", 1).await;
    let token = app.token(&admin);
    let uri = format!("/api/v1/borrow/lend/{}", book.id);

    let (status, _) = app
        .send(Method::POST, &uri, Some(&token), Some(json!({ "email": first.email })))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .send(Method::POST, &uri, Some(&token), Some(json!({ "email": second.email })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "OutOfStock");
}

#[tokio::test]
async fn test_lend_rejects_invalid_email() {
    let app = TestApp::new();
    let admin = app.user("admin", Role::Admin).await;
    let book = app.book("Lavinia", 1).await;

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/v1/borrow/lend/{}", book.id),
            Some(&app.token(&admin)),
            Some(json!({ "email": "not-an-email" })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");
}

#[tokio::test]
async fn test_lend_unknown_borrower_or_book() {
    let app = TestApp::new();
    let admin = app.user("admin", Role::Admin).await;
    let reader = app.user("reader", Role::User).await;
    let book = app.book("Lavinia", 1).await;
    let token = app.token(&admin);

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/api/v1/borrow/lend/{}", book.id),
            Some(&token),
            Some(json!({ "email": "nobody@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/borrow/lend/9999",
            Some(&token),
            Some(json!({ "email": reader.email })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_return_then_second_return_is_rejected() {
    let app = TestApp::new();
    let admin = app.user("admin", Role::Admin).await;
    let reader = app.user("reader", Role::User).await;
    let book = app.book("The Left Hand of Darkness", 1).await;
    let token = app.token(&admin);
    let borrower = json!({ "email": reader.email });

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/api/v1/borrow/lend/{}", book.id),
            Some(&token),
            Some(borrower.clone()),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let uri = format!("/api/v1/borrow/return/{}", book.id);
    let (status, body) = app
        .send(Method::POST, &uri, Some(&token), Some(borrower.clone()))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Book returned successfully");
    assert_eq!(body["borrow"]["returned"], true);
    assert!(!body["borrow"]["returned_date"].is_null());
    assert!(!body["fine"].is_null());

    let (status, body) = app
        .send(Method::POST, &uri, Some(&token), Some(borrower))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "NoActiveLoan");

    let stock = app.store.get_book(book.id).await.unwrap();
    assert_eq!(stock.quantity, 1);
    assert!(stock.available);
}

#[tokio::test]
async fn test_my_borrowed_books() {
    let app = TestApp::new();
    let admin = app.user("admin", Role::Admin).await;
    let reader = app.user("reader", Role::User).await;
    let book = app.book("The Word for World Is Forest", 2).await;

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/api/v1/borrow/lend/{}", book.id),
            Some(&app.token(&admin)),
            Some(json!({ "email": reader.email })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .send(
            Method::GET,
            "/api/v1/borrow/my-borrowed-books",
            Some(&app.token(&reader)),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let loans = body["borrowed_books"].as_array().unwrap();
    assert_eq!(loans.len(), 1);
    assert_eq!(loans[0]["book"]["title"], "The Word for World Is Forest");
    assert_eq!(loans[0]["is_overdue"], false);
}

#[tokio::test]
async fn test_admin_listing_filters_active() {
    let app = TestApp::new();
    let admin = app.user("admin", Role::Admin).await;
    let reader = app.user("reader", Role::User).await;
    let kept = app.book("Tehanu", 1).await;
    let returned = app.book("Tales from Earthsea", 1).await;
    let token = app.token(&admin);
    let borrower = json!({ "email": reader.email });

    for book in [&kept, &returned] {
        let (status, _) = app
            .send(
                Method::POST,
                &format!("/api/v1/borrow/lend/{}", book.id),
                Some(&token),
                Some(borrower.clone()),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, _) = app
        .send(
            Method::POST,
            &format!("/api/v1/borrow/return/{}", returned.id),
            Some(&token),
            Some(borrower),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(Method::GET, "/api/v1/borrow/admin/borrowed-books", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["borrowed_books"].as_array().unwrap().len(), 2);

    let (status, body) = app
        .send(
            Method::GET,
            "/api/v1/borrow/admin/borrowed-books?active=true",
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let active = body["borrowed_books"].as_array().unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["book_id"], kept.id);
    assert_eq!(active[0]["user"]["email"], reader.email);
}

#[tokio::test]
async fn test_user_loans_for_unknown_user() {
    let app = TestApp::new();
    let admin = app.user("admin", Role::Admin).await;

    let (status, body) = app
        .send(
            Method::GET,
            "/api/v1/borrow/users/4242/loans",
            Some(&app.token(&admin)),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");
}
