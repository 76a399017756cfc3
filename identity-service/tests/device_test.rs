mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use common::{TestApp, DESKTOP_CHROME_UA, TEST_PASSWORD};
use serde_json::{json, Value};

const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

async fn login_from(app: &TestApp, email: &str, device_id: &str, user_agent: &str) -> Value {
    let request = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, user_agent)
        .header("x-device-id", device_id)
        .header("x-forwarded-for", "198.51.100.4, 10.0.0.1")
        .body(Body::from(
            json!({ "email": email, "password": TEST_PASSWORD }).to_string(),
        ))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    body
}

async fn register(app: &TestApp, email: &str) -> String {
    let (status, body) = app
        .post_json(
            "/auth/register",
            json!({
                "email": email,
                "password": TEST_PASSWORD,
                "confirmPassword": TEST_PASSWORD,
                "firstName": "Grace",
                "lastName": "Hopper",
                "acceptTerms": true,
                "deviceInfo": { "deviceId": "laptop-1" },
            }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
    body["data"]["accessToken"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_devices_are_listed_with_parsed_user_agent() {
    let app = TestApp::spawn().await;
    let access = register(&app, "devices@example.com").await;

    let body = login_from(&app, "devices@example.com", "phone-1", IPHONE_UA).await;
    assert_eq!(body["data"]["isNewDevice"], true);

    let (status, body) = app.get("/auth/devices", Some(&access)).await;
    assert_eq!(status, StatusCode::OK);
    let devices = body["data"].as_array().unwrap();
    assert_eq!(devices.len(), 2);

    let phone = devices
        .iter()
        .find(|d| d["deviceId"] == "phone-1")
        .expect("phone device missing");
    assert_eq!(phone["operatingSystem"], "iOS");
    assert_eq!(phone["browser"], "Safari");
    assert_eq!(phone["platform"], "Mobile");
    assert_eq!(phone["ipAddress"], "198.51.100.4");
    assert_eq!(phone["isTrusted"], false);

    let laptop = devices
        .iter()
        .find(|d| d["deviceId"] == "laptop-1")
        .expect("laptop device missing");
    assert_eq!(laptop["operatingSystem"], "Windows");
    assert_eq!(laptop["browser"], "Chrome");
    assert_eq!(laptop["platform"], "Desktop");
}

#[tokio::test]
async fn test_trusting_a_device_flows_into_new_tokens() {
    let app = TestApp::spawn().await;
    let access = register(&app, "trust@example.com").await;

    let (status, _) = app
        .post_json("/auth/devices/laptop-1/trust", json!({}), Some(&access))
        .await;
    assert_eq!(status, StatusCode::OK);

    let body = login_from(&app, "trust@example.com", "laptop-1", DESKTOP_CHROME_UA).await;
    assert_eq!(body["data"]["isNewDevice"], false);
    let token = body["data"]["accessToken"].as_str().unwrap();
    let claims = app
        .state
        .tokens
        .validate_access_token(token)
        .expect("token must validate");
    assert!(claims.is_trusted);
    assert_eq!(claims.device_id, "laptop-1");

    let (status, body) = app
        .post_json("/auth/devices/unknown-device/trust", json!({}), Some(&access))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_login_history_is_most_recent_first() {
    let app = TestApp::spawn().await;
    let access = register(&app, "history@example.com").await;

    let (status, _) = app
        .post_json(
            "/auth/login",
            json!({ "email": "history@example.com", "password": "Wrong1!x" }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.get("/auth/login-history?limit=1", Some(&access)).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["success"], false);
    assert_eq!(entries[0]["failureReason"], "InvalidCredentials");

    let (status, body) = app.get("/auth/login-history", Some(&access)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(2));
}
