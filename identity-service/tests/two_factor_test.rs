mod common;

use chrono::{DateTime, Duration, Utc};
use common::{device, login_request, TestApp, TEST_PASSWORD};
use identity_service::{
    dtos::VerifyTwoFactorRequest,
    models::TwoFactorType,
    services::{two_factor::generate_totp, AuthError, AuthSession},
    store::CredentialStore,
};
use uuid::Uuid;

const EMAIL: &str = "twofactor@example.com";

async fn app_with_email_two_factor(now: DateTime<Utc>) -> (TestApp, Uuid) {
    let app = TestApp::spawn().await;
    let session = app.register(EMAIL, now).await;
    app.stores
        .users
        .enable_two_factor(session.user.id, TwoFactorType::Email)
        .await
        .unwrap();
    (app, session.user.id)
}

/// Runs the password step and returns the user id of the pending sign-in.
async fn password_step(app: &TestApp, now: DateTime<Utc>) -> Uuid {
    match app
        .state
        .auth
        .login(
            &login_request(EMAIL, TEST_PASSWORD),
            &device("device-a"),
            &app.correlation_id,
            now,
        )
        .await
    {
        Err(AuthError::TwoFactorRequired { user_id, channel }) => {
            assert_eq!(channel, TwoFactorType::Email);
            user_id
        }
        other => panic!("expected two-factor challenge, got {:?}", other.map(|_| ())),
    }
}

fn verify_request(user_id: Uuid, code: &str, channel: TwoFactorType) -> VerifyTwoFactorRequest {
    serde_json::from_value(serde_json::json!({
        "userId": user_id,
        "token": code,
        "type": channel,
    }))
    .unwrap()
}

async fn verify(
    app: &TestApp,
    user_id: Uuid,
    code: &str,
    channel: TwoFactorType,
    now: DateTime<Utc>,
) -> Result<AuthSession, AuthError> {
    app.state
        .auth
        .verify_two_factor(
            &verify_request(user_id, code, channel),
            &device("device-a"),
            &app.correlation_id,
            now,
        )
        .await
}

#[tokio::test]
async fn test_password_step_issues_no_tokens_and_sends_code() {
    let now = Utc::now();
    let (app, user_id) = app_with_email_two_factor(now).await;
    let active_before = app.state.tokens.active_token_count(user_id, now).await.unwrap();

    let pending = password_step(&app, now).await;
    assert_eq!(pending, user_id);

    assert_eq!(
        app.state.tokens.active_token_count(user_id, now).await.unwrap(),
        active_before
    );
    let code = app.dispatcher.last_code_for(EMAIL).expect("Code was not sent");
    assert_eq!(code.len(), 6);
    assert!(code.chars().all(|c| c.is_ascii_digit()));

    let session = verify(&app, user_id, &code, TwoFactorType::Email, now)
        .await
        .expect("Correct code must complete sign-in");
    assert_eq!(session.user.id, user_id);
    assert!(session.user.two_factor_enabled);

    // Single use
    let replay = verify(&app, user_id, &code, TwoFactorType::Email, now).await;
    assert!(matches!(replay, Err(AuthError::InvalidTwoFactorCode)));
}

#[tokio::test]
async fn test_new_challenge_supersedes_previous_code() {
    let now = Utc::now();
    let (app, user_id) = app_with_email_two_factor(now).await;

    password_step(&app, now).await;
    let first = app.dispatcher.last_code_for(EMAIL).unwrap();

    password_step(&app, now + Duration::seconds(10)).await;
    let second = app.dispatcher.last_code_for(EMAIL).unwrap();

    let later = now + Duration::seconds(20);
    if first != second {
        let stale = verify(&app, user_id, &first, TwoFactorType::Email, later).await;
        assert!(matches!(stale, Err(AuthError::InvalidTwoFactorCode)));
    }

    assert!(verify(&app, user_id, &second, TwoFactorType::Email, later)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_code_valid_up_to_and_including_expiry() {
    let now = Utc::now();
    let (app, user_id) = app_with_email_two_factor(now).await;

    password_step(&app, now).await;
    let code = app.dispatcher.last_code_for(EMAIL).unwrap();

    let at_expiry = now + Duration::minutes(5);
    assert!(verify(&app, user_id, &code, TwoFactorType::Email, at_expiry)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_code_rejected_one_second_after_expiry() {
    let now = Utc::now();
    let (app, user_id) = app_with_email_two_factor(now).await;

    password_step(&app, now).await;
    let code = app.dispatcher.last_code_for(EMAIL).unwrap();

    let past_expiry = now + Duration::minutes(5) + Duration::seconds(1);
    let result = verify(&app, user_id, &code, TwoFactorType::Email, past_expiry).await;
    assert!(matches!(result, Err(AuthError::InvalidTwoFactorCode)));
}

#[tokio::test]
async fn test_challenge_burns_after_five_wrong_codes() {
    let now = Utc::now();
    let (app, user_id) = app_with_email_two_factor(now).await;

    password_step(&app, now).await;
    let code = app.dispatcher.last_code_for(EMAIL).unwrap();
    let wrong = if code == "000000" { "111111" } else { "000000" };

    for _ in 0..5 {
        let result = verify(&app, user_id, wrong, TwoFactorType::Email, now).await;
        assert!(matches!(result, Err(AuthError::InvalidTwoFactorCode)));
    }

    let result = verify(&app, user_id, &code, TwoFactorType::Email, now).await;
    assert!(matches!(result, Err(AuthError::InvalidTwoFactorCode)));
}

#[tokio::test]
async fn test_unknown_user_fails_like_a_wrong_code() {
    let now = Utc::now();
    let (app, user_id) = app_with_email_two_factor(now).await;
    password_step(&app, now).await;

    let unknown = verify(&app, Uuid::new_v4(), "123456", TwoFactorType::Email, now)
        .await
        .expect_err("unknown user must fail");
    let wrong_channel = verify(&app, user_id, "123456", TwoFactorType::Sms, now)
        .await
        .expect_err("no SMS challenge is open");

    assert!(matches!(unknown, AuthError::InvalidTwoFactorCode));
    assert!(matches!(wrong_channel, AuthError::InvalidTwoFactorCode));
    assert_eq!(unknown.to_string(), wrong_channel.to_string());
}

#[tokio::test]
async fn test_failed_dispatch_still_requires_second_factor() {
    let now = Utc::now();
    let (app, user_id) = app_with_email_two_factor(now).await;
    app.dispatcher.set_failing(true);

    let pending = password_step(&app, now).await;
    assert_eq!(pending, user_id);
    assert!(app.dispatcher.last_code_for(EMAIL).is_none());
}

#[tokio::test]
async fn test_authenticator_enrollment_and_sign_in() {
    let app = TestApp::spawn().await;
    let now = Utc::now();
    let session = app.register(EMAIL, now).await;
    let user_id = session.user.id;

    let enrollment = app
        .state
        .auth
        .enroll_authenticator(user_id)
        .await
        .expect("Enrollment failed");
    assert!(enrollment.uri.starts_with("otpauth://totp/"));
    assert!(enrollment.uri.contains(&enrollment.secret));

    let unix = u64::try_from(now.timestamp()).unwrap();
    let code = generate_totp(&enrollment.secret, unix).expect("Secret must be usable");

    let wrong = if code == "000000" { "111111" } else { "000000" };
    let rejected = app.state.auth.confirm_authenticator(user_id, wrong, now).await;
    assert!(matches!(rejected, Err(AuthError::InvalidTwoFactorCode)));

    let profile = app
        .state
        .auth
        .confirm_authenticator(user_id, &code, now)
        .await
        .expect("Confirmation failed");
    assert!(profile.two_factor_enabled);

    let pending = app
        .state
        .auth
        .login(
            &login_request(EMAIL, TEST_PASSWORD),
            &device("device-a"),
            &app.correlation_id,
            now,
        )
        .await;
    match pending {
        Err(AuthError::TwoFactorRequired { channel, .. }) => {
            assert_eq!(channel, TwoFactorType::Authenticator)
        }
        other => panic!("expected two-factor challenge, got {:?}", other.map(|_| ())),
    }
    // Nothing is dispatched for authenticator challenges
    assert!(app.dispatcher.sent().is_empty());

    let signed_in = verify(&app, user_id, &code, TwoFactorType::Authenticator, now).await;
    assert!(signed_in.is_ok());
}
