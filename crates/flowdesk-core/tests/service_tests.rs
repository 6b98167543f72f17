//! Integration tests for the auth and workflow endpoints built on the gateway.

mod support;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use flowdesk_core::auth::{CredentialBundle, SignedInUser};
use flowdesk_core::models::{StepState, WorkflowApplication};
use flowdesk_core::CredentialStore;

use support::{api_client, bearer, session, valid_token, TENANT};

#[tokio::test]
async fn signin_stores_session_credentials() {
    let server = MockServer::start().await;
    let access = valid_token("ann");
    Mock::given(method("POST"))
        .and(path("/tenant_auth/acme/signin"))
        .and(body_json(json!({ "email": "ann@acme.test", "password": "s3cret" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Login successful",
            "data": { "access": access, "refresh": "refresh-1" },
            "tenant_user_id": 31,
            "tenant_id": 4
        })))
        .expect(1)
        .mount(&server)
        .await;

    let credentials = Arc::new(CredentialStore::in_memory());
    let api = api_client(&server, credentials.clone());
    let signin = api
        .signin(TENANT, "ann@acme.test", "s3cret")
        .await
        .expect("signin should succeed");

    assert_eq!(signin.message.as_deref(), Some("Login successful"));
    assert_eq!(
        credentials.snapshot(),
        CredentialBundle {
            access_token: Some(access),
            refresh_token: Some("refresh-1".to_string()),
            tenant_slug: Some("acme".to_string()),
            user_email: Some("ann@acme.test".to_string()),
            tenant_user_id: Some("31".to_string()),
            tenant_id: Some("4".to_string()),
        }
    );
}

#[tokio::test]
async fn signed_in_session_survives_reopening_the_store() {
    let server = MockServer::start().await;
    let access = valid_token("ann");
    Mock::given(method("POST"))
        .and(path("/tenant_auth/acme/signin"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "access": access, "refresh": "r" })),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let api = api_client(&server, Arc::new(CredentialStore::open_in(dir.path())));
    api.signin(TENANT, "ann@acme.test", "pw").await.expect("signin");

    let reopened = CredentialStore::open_in(dir.path());
    assert_eq!(
        reopened.restore_session(),
        Some(SignedInUser {
            email: "ann@acme.test".to_string(),
            tenant_slug: "acme".to_string(),
        })
    );
}

#[tokio::test]
async fn signout_revokes_refresh_token_and_clears_credentials() {
    let server = MockServer::start().await;
    let access = valid_token("ann");
    Mock::given(method("POST"))
        .and(path("/tenant_auth/acme/signout"))
        .and(header("authorization", bearer(&access).as_str()))
        .and(body_json(json!({ "refresh": "r-to-revoke" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "Signed out" })))
        .expect(1)
        .mount(&server)
        .await;

    let credentials = session(Some(access.as_str()), Some("r-to-revoke"));
    let api = api_client(&server, credentials.clone());
    api.signout(TENANT).await.expect("signout should succeed");

    assert_eq!(credentials.snapshot(), CredentialBundle::default());
}

#[tokio::test]
async fn signout_clears_credentials_even_when_server_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant_auth/acme/signout"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "detail": "Token is invalid" })))
        .expect(1)
        .mount(&server)
        .await;

    let access = valid_token("ann");
    let credentials = session(Some(access.as_str()), Some("r"));
    let api = api_client(&server, credentials.clone());

    let err = api.signout(TENANT).await.expect_err("signout should fail");
    assert_eq!(err.user_message(), "Token is invalid");
    assert_eq!(credentials.snapshot(), CredentialBundle::default());
}

#[tokio::test]
async fn change_password_is_authenticated() {
    let server = MockServer::start().await;
    let access = valid_token("ann");
    Mock::given(method("POST"))
        .and(path("/tenant_auth/acme/change-password"))
        .and(header("authorization", bearer(&access).as_str()))
        .and(body_json(json!({
            "old_password": "old",
            "new_password": "new",
            "confirm_password": "new"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "changed" })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api_client(&server, session(Some(access.as_str()), Some("r")));
    let body = api.change_password(TENANT, "old", "new", "new").await.unwrap();
    assert_eq!(body, Some(json!({ "message": "changed" })));
}

#[tokio::test]
async fn verification_and_reset_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant_auth/acme/signup"))
        .and(body_json(json!({
            "email": "ann@acme.test",
            "password": "pw",
            "reenter_password": "pw",
            "verification_key": "123456"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "message": "created" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tenant_auth/acme/reset-password"))
        .and(body_json(json!({
            "tenant_slug": "acme",
            "email": "ann@acme.test",
            "otp": "654321",
            "new_password": "n",
            "confirm_password": "n"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "reset" })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api_client(&server, Arc::new(CredentialStore::in_memory()));
    api.verify_signup(TENANT, "ann@acme.test", "pw", "pw", "123456")
        .await
        .expect("verify");
    api.reset_password(TENANT, "ann@acme.test", "654321", "n", "n")
        .await
        .expect("reset");
}

#[tokio::test]
async fn templates_apply_and_status() {
    let server = MockServer::start().await;
    let access = valid_token("ann");
    Mock::given(method("GET"))
        .and(path("/workflows/acme/templates/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                { "id": 1, "name": "Leave request", "description": "Time off" },
                { "id": 2, "title": "Purchase" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/workflows/acme/workflows/1/apply/"))
        .and(body_json(json!({ "title": "Holiday", "description": "Two weeks" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "request_id": 77 })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/workflows/acme/workflows/77/status/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "request_info": { "request_id": 77, "title": "Holiday", "status": "pending" },
            "progress": { "steps_completed": 0, "total_steps": 2, "percentage": 0 },
            "approval_workflow": [
                { "role": "Manager", "status": "pending" },
                { "role": "HR", "status": "waiting" }
            ],
            "recent_activity": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api_client(&server, session(Some(access.as_str()), Some("r")));

    let templates = api.templates(TENANT).await.expect("templates");
    assert_eq!(templates.len(), 2);
    assert_eq!(templates[0].display_name(), "Leave request");
    assert_eq!(templates[1].display_name(), "Purchase");

    let application = WorkflowApplication {
        title: "Holiday".to_string(),
        description: Some("Two weeks".to_string()),
        requester_description: None,
    };
    let created = api
        .apply_workflow(TENANT, &templates[0].id, &application)
        .await
        .expect("apply");
    assert_eq!(created, Some(json!({ "request_id": 77 })));

    let status = api.request_status(TENANT, "77").await.expect("status");
    assert_eq!(status.request_info.title.as_deref(), Some("Holiday"));
    assert_eq!(status.approval_workflow[0].state(), StepState::Current);
    assert_eq!(status.approval_workflow[1].state(), StepState::Waiting);
}

#[tokio::test]
async fn approvals_flow() {
    let server = MockServer::start().await;
    let access = valid_token("approver");
    Mock::given(method("GET"))
        .and(path("/workflows/acme/workflows/pending/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{ "id": 8, "title": "Laptop", "status": "pending", "requested_by": "ann@acme.test" }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/workflows/acme/workflows/8/approve/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "approved" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/workflows/acme/workflows/8/reject/"))
        .and(body_json(json!({ "description": "Over budget" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "rejected" })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api_client(&server, session(Some(access.as_str()), Some("r")));

    let pending = api.pending_approvals(TENANT).await.expect("pending");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].requested_by.as_deref(), Some("ann@acme.test"));

    api.approve_request(TENANT, "8").await.expect("approve");
    api.reject_request(TENANT, "8", "Over budget").await.expect("reject");

    let requests = server.received_requests().await.expect("recording enabled");
    let approve = requests
        .iter()
        .find(|r| r.url.path().ends_with("/approve/"))
        .expect("approve request recorded");
    assert!(approve.body.is_empty());
}
