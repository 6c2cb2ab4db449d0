//! # Integration Tests for seva-api
//!
//! Drives the full router with `tower::ServiceExt::oneshot`: the order
//! workflow end to end, concurrent claims, vault and wallet endpoints,
//! the registry and catalog, authentication, error mapping, and the
//! operational endpoints.

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use seva_api::config::AppConfig;
use seva_api::state::AppState;

const SECRET: &str = "s3cret";

/// Helper: the app with auth enabled and in-memory storage.
fn test_app() -> Router {
    test_app_with(AppConfig::default())
}

fn test_app_with(config: AppConfig) -> Router {
    let config = AppConfig {
        auth_token: Some(SECRET.to_string()),
        ..config
    };
    seva_api::app(AppState::with_config(config, None))
}

fn admin() -> String {
    SECRET.to_string()
}

fn token(role: &str, id: &str) -> String {
    format!("{role}:{id}:{SECRET}")
}

async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn body_json(response: Response<Body>) -> Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

/// Helper: JSON request as `auth`, returning status and parsed body.
async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    auth: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {auth}"));
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&value).unwrap())
        }
        None => Body::empty(),
    };
    let response = send(app, builder.body(body).unwrap()).await;
    let status = response.status();
    (status, body_json(response).await)
}

async fn upload(
    app: &Router,
    auth: &str,
    owner: &str,
    type_tag: &str,
    filename: &str,
    content: &[u8],
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(format!(
            "/v1/vault/{owner}/documents?type_tag={type_tag}&filename={filename}"
        ))
        .header(header::AUTHORIZATION, format!("Bearer {auth}"))
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from(content.to_vec()))
        .unwrap();
    let response = send(app, request).await;
    let status = response.status();
    (status, body_json(response).await)
}

fn id_of(value: &Value) -> String {
    value["id"].as_str().unwrap().to_string()
}

async fn register(app: &Router, role: &str, name: &str, phone: &str) -> String {
    let (status, body) = call(
        app,
        "POST",
        "/v1/identities",
        Some(&admin()),
        Some(json!({ "name": name, "phone": phone, "role": role })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register {name}: {body}");
    id_of(&body)
}

/// PAN card: aadhaar + photo, ₹107 normal, ₹90 B2B.
async fn pan_service(app: &Router) -> String {
    let (status, body) = call(
        app,
        "POST",
        "/v1/services",
        Some(&admin()),
        Some(json!({
            "name": "PAN Card",
            "price_normal": 10_700,
            "price_b2b": 9_000,
            "required_documents": ["aadhaar", "photo"],
            "form_schema": [{ "name": "full_name", "label": "Full name" }],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    id_of(&body)
}

async fn add_funds(
    app: &Router,
    staff_auth: &str,
    identity: &str,
    amount: i64,
) -> (StatusCode, Value) {
    call(
        app,
        "POST",
        &format!("/v1/wallet/{identity}/funds"),
        Some(staff_auth),
        Some(json!({ "amount": amount, "description": "Cash deposit" })),
    )
    .await
}

async fn balance(app: &Router, identity: &str) -> i64 {
    let (status, body) = call(
        app,
        "GET",
        &format!("/v1/wallet/{identity}/balance"),
        Some(&admin()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["balance"].as_i64().unwrap()
}

/// A customer, two staff members, and the PAN service.
struct Counter {
    app: Router,
    service: String,
    customer: String,
    customer_auth: String,
    staff_a: String,
    staff_a_auth: String,
    staff_b: String,
    staff_b_auth: String,
}

impl Counter {
    async fn open() -> Self {
        Self::open_with(test_app()).await
    }

    async fn open_with(app: Router) -> Self {
        let service = pan_service(&app).await;
        let customer = register(&app, "customer", "Asha Devi", "9000000001").await;
        let staff_a = register(&app, "staff", "Ravi", "9000000002").await;
        let staff_b = register(&app, "staff", "Meena", "9000000003").await;
        Self {
            customer_auth: token("customer", &customer),
            staff_a_auth: token("staff", &staff_a),
            staff_b_auth: token("staff", &staff_b),
            app,
            service,
            customer,
            staff_a,
            staff_b,
        }
    }

    async fn customer_doc(&self, tag: &str) -> String {
        let (status, body) = upload(
            &self.app,
            &self.customer_auth,
            &self.customer,
            tag,
            &format!("{tag}.jpg"),
            format!("{tag}-bytes").as_bytes(),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        id_of(&body)
    }

    async fn submit(&self, refs: Value, pay_now: bool) -> (StatusCode, Value) {
        call(
            &self.app,
            "POST",
            "/v1/orders",
            Some(&self.customer_auth),
            Some(json!({
                "submitted_by": self.customer,
                "service_id": self.service,
                "form_data": { "full_name": "Asha Devi" },
                "document_refs": refs,
                "pay_now": pay_now,
            })),
        )
        .await
    }

    async fn submitted_order(&self) -> String {
        let aadhaar = self.customer_doc("aadhaar").await;
        let photo = self.customer_doc("photo").await;
        let (status, body) = self
            .submit(json!({ "aadhaar": aadhaar, "photo": photo }), false)
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        id_of(&body)
    }

    async fn claim(&self, order: &str, staff: &str, auth: &str) -> (StatusCode, Value) {
        call(
            &self.app,
            "POST",
            &format!("/v1/orders/{order}/claim"),
            Some(auth),
            Some(json!({ "staff_id": staff })),
        )
        .await
    }
}

// -- Operational endpoints ----------------------------------------------------

#[tokio::test]
async fn test_liveness_probe() {
    let app = test_app();
    let response = send(
        &app,
        Request::builder()
            .uri("/health/liveness")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"ok");
}

#[tokio::test]
async fn test_readiness_probe_in_memory() {
    let app = test_app();
    let response = send(
        &app,
        Request::builder()
            .uri("/health/readiness")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"ready");
}

#[tokio::test]
async fn test_openapi_is_served_without_auth() {
    let app = test_app();
    let (status, body) = call(&app, "GET", "/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/v1/orders/{id}/complete"].is_object());
    assert_eq!(body["info"]["title"], "Seva Portal API");
}

#[tokio::test]
async fn test_metrics_endpoint_without_recorder() {
    let app = test_app();
    let response = send(
        &app,
        Request::builder().uri("/metrics").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
}

// -- Authentication -----------------------------------------------------------

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = test_app();
    let (status, body) = call(&app, "GET", "/v1/services", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_wrong_secret_is_unauthorized() {
    let app = test_app();
    let (status, _) = call(&app, "GET", "/v1/services", Some("nope"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_disabled_runs_as_admin() {
    let app = seva_api::app(AppState::new());
    let (status, _) = call(
        &app,
        "POST",
        "/v1/identities",
        None,
        Some(json!({ "name": "Ravi", "phone": "9000000002", "role": "staff" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_customer_cannot_submit_as_someone_else() {
    let c = Counter::open().await;
    let other = register(&c.app, "customer", "Other", "9000000099").await;
    let (status, body) = call(
        &c.app,
        "POST",
        "/v1/orders",
        Some(&c.customer_auth),
        Some(json!({ "submitted_by": other, "service_id": c.service })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_customer_cannot_claim_or_see_pool() {
    let c = Counter::open().await;
    let order = c.submitted_order().await;

    let (status, _) = c.claim(&order, &c.customer, &c.customer_auth).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) =
        call(&c.app, "GET", "/v1/orders?filter=pool", Some(&c.customer_auth), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_staff_cannot_claim_as_colleague() {
    let c = Counter::open().await;
    let order = c.submitted_order().await;
    let (status, _) = c.claim(&order, &c.staff_b, &c.staff_a_auth).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_rate_limit_applies_per_caller() {
    let app = test_app_with(AppConfig {
        rate_limit_per_minute: 2,
        ..AppConfig::default()
    });
    for _ in 0..2 {
        let (status, _) = call(&app, "GET", "/v1/services", Some(&admin()), None).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = call(&app, "GET", "/v1/services", Some(&admin()), None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "RATE_LIMITED");

    // Health probes sit outside the limiter.
    let (status, _) = call(&app, "GET", "/health/liveness", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

// -- Order workflow -----------------------------------------------------------

#[tokio::test]
async fn test_full_order_lifecycle() {
    let c = Counter::open().await;
    let aadhaar = c.customer_doc("aadhaar").await;
    let photo = c.customer_doc("photo").await;

    // Missing photo.
    let (status, body) = c.submit(json!({ "aadhaar": aadhaar }), false).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
    let fields = body["error"]["details"]["fields"].as_array().unwrap();
    assert!(fields.iter().any(|f| f["field"] == "photo"));

    // Both documents.
    let (status, body) = c
        .submit(json!({ "aadhaar": aadhaar, "photo": photo }), false)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "received");
    assert_eq!(body["price"], 10_700);
    let order = id_of(&body);

    // It is in the pool.
    let (status, pool) =
        call(&c.app, "GET", "/v1/orders?filter=pool", Some(&c.staff_a_auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pool.as_array().unwrap().len(), 1);

    // Two staff claim; one wins.
    let (a, b) = tokio::join!(
        c.claim(&order, &c.staff_a, &c.staff_a_auth),
        c.claim(&order, &c.staff_b, &c.staff_b_auth),
    );
    let mut statuses = [a.0, b.0];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::OK, StatusCode::CONFLICT]);
    let (winner, winner_auth) = if a.0 == StatusCode::OK {
        (&c.staff_a, &c.staff_a_auth)
    } else {
        (&c.staff_b, &c.staff_b_auth)
    };

    let (_, current) =
        call(&c.app, "GET", &format!("/v1/orders/{order}"), Some(&c.customer_auth), None).await;
    assert_eq!(current["status"], "processing");
    assert_eq!(current["assigned_staff_id"], winner.as_str());

    let (_, pool) = call(&c.app, "GET", "/v1/orders?filter=pool", Some(winner_auth), None).await;
    assert!(pool.as_array().unwrap().is_empty());

    // Flag the photo.
    let (status, body) = call(
        &c.app,
        "POST",
        &format!("/v1/orders/{order}/documents/photo/reject"),
        Some(winner_auth),
        Some(json!({ "staff_id": winner, "reason": "blurry" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "action_required");
    assert_eq!(body["rejected_docs"], json!(["photo"]));
    assert_eq!(body["rejection_reason"], "blurry");

    // Customer re-uploads.
    let new_photo = c.customer_doc("photo").await;
    let (status, body) = call(
        &c.app,
        "POST",
        &format!("/v1/orders/{order}/documents/photo/reupload"),
        Some(&c.customer_auth),
        Some(json!({ "actor_id": c.customer, "document_id": new_photo })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "processing");
    assert_eq!(body["rejected_docs"], json!([]));
    assert_eq!(body["document_ids"]["photo"], new_photo.as_str());

    // Staff uploads the deliverable into the customer's vault.
    let (status, output) = upload(
        &c.app,
        winner_auth,
        &c.customer,
        "pan_card",
        "pan.pdf",
        b"%PDF-pan",
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let output = id_of(&output);

    // Low balance: nothing changes.
    let (status, _) = add_funds(&c.app, winner_auth, &c.customer, 5_000).await;
    assert_eq!(status, StatusCode::CREATED);
    let complete = json!({ "staff_id": winner, "output_document_ids": { "pan_card": output } });
    let (status, body) = call(
        &c.app,
        "POST",
        &format!("/v1/orders/{order}/complete"),
        Some(winner_auth),
        Some(complete.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_FUNDS");
    assert_eq!(body["error"]["details"]["required"], 10_700);
    assert_eq!(body["error"]["details"]["available"], 5_000);
    let (_, current) =
        call(&c.app, "GET", &format!("/v1/orders/{order}"), Some(winner_auth), None).await;
    assert_eq!(current["status"], "processing");
    assert_eq!(balance(&c.app, &c.customer).await, 5_000);

    // Top up and complete.
    add_funds(&c.app, winner_auth, &c.customer, 10_000).await;
    let (status, body) = call(
        &c.app,
        "POST",
        &format!("/v1/orders/{order}/complete"),
        Some(winner_auth),
        Some(complete),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "completed");
    assert_eq!(body["output_document_ids"], json!({ "pan_card": output }));
    assert_eq!(body["payment"]["state"], "paid");
    assert_eq!(balance(&c.app, &c.customer).await, 4_300);

    let (_, statement) = call(
        &c.app,
        "GET",
        &format!("/v1/wallet/{}/transactions", c.customer),
        Some(&c.customer_auth),
        None,
    )
    .await;
    let latest = &statement["transactions"][0];
    assert_eq!(latest["amount"], -10_700);
    assert_eq!(latest["kind"], "order_charge");
    assert_eq!(latest["order_id"], order.as_str());
    assert_eq!(statement["balance"], 4_300);

    // Transition log: submit, claim, reject_document, reupload, complete.
    let (_, current) =
        call(&c.app, "GET", &format!("/v1/orders/{order}"), Some(&c.customer_auth), None).await;
    let actions: Vec<&str> = current["transitions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["action"].as_str().unwrap())
        .collect();
    assert_eq!(
        actions,
        ["submit", "claim", "reject_document", "reupload_document", "complete"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_have_one_winner() {
    let c = Counter::open().await;
    let order = c.submitted_order().await;

    let mut staff = Vec::new();
    for i in 0..8 {
        let id = register(&c.app, "staff", &format!("Staff {i}"), &format!("91000000{i:02}")).await;
        staff.push(id);
    }

    let handles: Vec<_> = staff
        .iter()
        .map(|id| {
            let app = c.app.clone();
            let uri = format!("/v1/orders/{order}/claim");
            let auth = format!("Bearer {}", token("staff", id));
            let body = serde_json::to_vec(&json!({ "staff_id": id })).unwrap();
            tokio::spawn(async move {
                let request = Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::AUTHORIZATION, auth)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap();
                app.oneshot(request).await.unwrap().status()
            })
        })
        .collect();

    let mut ok = 0;
    let mut conflict = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::OK => ok += 1,
            StatusCode::CONFLICT => conflict += 1,
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(conflict, 7);

    let (_, current) =
        call(&c.app, "GET", &format!("/v1/orders/{order}"), Some(&admin()), None).await;
    assert_eq!(current["transitions"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_prepaid_order_refunded_on_rejection() {
    let c = Counter::open().await;
    add_funds(&c.app, &c.staff_a_auth, &c.customer, 20_000).await;
    let aadhaar = c.customer_doc("aadhaar").await;
    let photo = c.customer_doc("photo").await;

    let (status, body) = c
        .submit(json!({ "aadhaar": aadhaar, "photo": photo }), true)
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["payment"]["state"], "paid");
    assert_eq!(balance(&c.app, &c.customer).await, 9_300);
    let order = id_of(&body);

    let (status, body) = call(
        &c.app,
        "POST",
        &format!("/v1/orders/{order}/reject"),
        Some(&c.staff_a_auth),
        Some(json!({ "staff_id": c.staff_a, "reason": "duplicate application" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["payment"]["state"], "refunded");
    assert_eq!(balance(&c.app, &c.customer).await, 20_000);

    // Terminal.
    let (status, _) = c.claim(&order, &c.staff_a, &c.staff_a_auth).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_prepay_without_funds_creates_nothing() {
    let c = Counter::open().await;
    let aadhaar = c.customer_doc("aadhaar").await;
    let photo = c.customer_doc("photo").await;
    let (status, body) = c
        .submit(json!({ "aadhaar": aadhaar, "photo": photo }), true)
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"]["details"]["available"], 0);

    let (_, mine) = call(
        &c.app,
        "GET",
        "/v1/orders?filter=submitted_by",
        Some(&c.customer_auth),
        None,
    )
    .await;
    assert!(mine.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_b2b_pays_b2b_price() {
    let c = Counter::open().await;
    let agent = register(&c.app, "b2b", "Cyber Cafe", "9000000050").await;
    let agent_auth = token("b2b", &agent);
    let mut refs = serde_json::Map::new();
    for tag in ["aadhaar", "photo"] {
        let (status, doc) =
            upload(&c.app, &agent_auth, &agent, tag, "scan.jpg", tag.as_bytes()).await;
        assert_eq!(status, StatusCode::CREATED);
        refs.insert(tag.to_string(), json!(id_of(&doc)));
    }
    let (status, body) = call(
        &c.app,
        "POST",
        "/v1/orders",
        Some(&agent_auth),
        Some(json!({
            "submitted_by": agent,
            "service_id": c.service,
            "form_data": { "full_name": "Walk-in" },
            "document_refs": refs,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["price"], 9_000);
}

#[tokio::test]
async fn test_unrelated_customer_cannot_reupload() {
    let c = Counter::open().await;
    let order = c.submitted_order().await;
    c.claim(&order, &c.staff_a, &c.staff_a_auth).await;
    call(
        &c.app,
        "POST",
        &format!("/v1/orders/{order}/documents/photo/reject"),
        Some(&c.staff_a_auth),
        Some(json!({ "staff_id": c.staff_a, "reason": "blurry" })),
    )
    .await;

    let stranger = register(&c.app, "customer", "Stranger", "9000000077").await;
    let stranger_auth = token("customer", &stranger);
    let (_, doc) = upload(&c.app, &stranger_auth, &stranger, "photo", "me.jpg", b"me").await;
    let (status, body) = call(
        &c.app,
        "POST",
        &format!("/v1/orders/{order}/documents/photo/reupload"),
        Some(&stranger_auth),
        Some(json!({ "actor_id": stranger, "document_id": id_of(&doc) })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "STATE_CONFLICT");

    let path = format!("/v1/orders/{order}");
    let (status, _) = call(&c.app, "GET", &path, Some(&stranger_auth), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, current) = call(&c.app, "GET", &path, Some(&c.staff_a_auth), None).await;
    assert_eq!(current["status"], "action_required");
    assert_eq!(current["rejected_docs"], json!(["photo"]));
}

#[tokio::test]
async fn test_reject_document_requires_reason() {
    let c = Counter::open().await;
    let order = c.submitted_order().await;
    c.claim(&order, &c.staff_a, &c.staff_a_auth).await;
    let (status, body) = call(
        &c.app,
        "POST",
        &format!("/v1/orders/{order}/documents/photo/reject"),
        Some(&c.staff_a_auth),
        Some(json!({ "staff_id": c.staff_a, "reason": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["message"], "reason must not be empty");
}

#[tokio::test]
async fn test_assigned_listing() {
    let c = Counter::open().await;
    let first = c.submitted_order().await;
    let _second = c.submitted_order().await;
    c.claim(&first, &c.staff_a, &c.staff_a_auth).await;

    let (status, mine) =
        call(&c.app, "GET", "/v1/orders?filter=assigned_to", Some(&c.staff_a_auth), None).await;
    assert_eq!(status, StatusCode::OK);
    let mine = mine.as_array().unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0]["id"], first.as_str());

    let (_, pool) =
        call(&c.app, "GET", "/v1/orders?filter=pool", Some(&c.staff_b_auth), None).await;
    assert_eq!(pool.as_array().unwrap().len(), 1);
}

// -- Error mapping ------------------------------------------------------------

#[tokio::test]
async fn test_unknown_order_is_not_found() {
    let c = Counter::open().await;
    let (status, body) = call(
        &c.app,
        "GET",
        &format!("/v1/orders/{}", uuid::Uuid::new_v4()),
        Some(&admin()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/v1/orders")
        .header(header::AUTHORIZATION, format!("Bearer {SECRET}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_complete_before_claim_is_conflict() {
    let c = Counter::open().await;
    let order = c.submitted_order().await;
    let (status, body) = call(
        &c.app,
        "POST",
        &format!("/v1/orders/{order}/complete"),
        Some(&c.staff_a_auth),
        Some(json!({ "staff_id": c.staff_a })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "STATE_CONFLICT");
}

#[tokio::test]
async fn test_complete_with_blank_output_tag_is_validation() {
    let c = Counter::open().await;
    let order = c.submitted_order().await;
    c.claim(&order, &c.staff_a, &c.staff_a_auth).await;
    let output = c.customer_doc("pan_card").await;
    let (status, body) = call(
        &c.app,
        "POST",
        &format!("/v1/orders/{order}/complete"),
        Some(&c.staff_a_auth),
        Some(json!({ "staff_id": c.staff_a, "output_document_ids": { "  ": output } })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
    assert_eq!(body["error"]["details"]["fields"][0]["field"], "  ");
}

// -- Vault and documents ------------------------------------------------------

#[tokio::test]
async fn test_upload_then_list_includes_document_once() {
    let c = Counter::open().await;
    let doc = c.customer_doc("aadhaar").await;
    c.customer_doc("photo").await;

    let (status, listed) = call(
        &c.app,
        "GET",
        &format!("/v1/vault/{}/documents", c.customer),
        Some(&c.customer_auth),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed.iter().filter(|d| d["id"] == doc.as_str()).count(), 1);

    let (_, filtered) = call(
        &c.app,
        "GET",
        &format!("/v1/vault/{}/documents?type_tag=aadhaar", c.customer),
        Some(&c.customer_auth),
        None,
    )
    .await;
    assert_eq!(filtered.as_array().unwrap().len(), 1);

    let (_, searched) = call(
        &c.app,
        "GET",
        &format!("/v1/vault/{}/documents?q=PHOTO", c.customer),
        Some(&c.customer_auth),
        None,
    )
    .await;
    assert_eq!(searched.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_vault_is_private() {
    let c = Counter::open().await;
    let other = register(&c.app, "customer", "Other", "9000000099").await;
    let other_auth = token("customer", &other);

    let (status, _) = call(
        &c.app,
        "GET",
        &format!("/v1/vault/{}/documents", c.customer),
        Some(&other_auth),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // A customer may not upload into someone else's vault.
    let (status, body) = upload(&c.app, &other_auth, &c.customer, "photo", "x.jpg", b"x").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
}

#[tokio::test]
async fn test_document_content_round_trips_with_digest() {
    let c = Counter::open().await;
    let (status, doc) =
        upload(&c.app, &c.customer_auth, &c.customer, "aadhaar", "card.pdf", b"%PDF-aadhaar").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(doc["size_bytes"], 12);
    let id = id_of(&doc);

    let request = Request::builder()
        .uri(format!("/v1/documents/{id}/content"))
        .header(header::AUTHORIZATION, format!("Bearer {}", c.customer_auth))
        .body(Body::empty())
        .unwrap();
    let response = send(&c.app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let digest = response.headers()["x-content-sha256"].to_str().unwrap().to_string();
    assert_eq!(digest.len(), 64);
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("card.pdf"));
    assert_eq!(body_bytes(response).await, b"%PDF-aadhaar");

    let (status, meta) =
        call(&c.app, "GET", &format!("/v1/documents/{id}"), Some(&c.staff_a_auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(meta["original_filename"], "card.pdf");
}

#[tokio::test]
async fn test_oversized_upload_rejected() {
    let app = test_app_with(AppConfig {
        max_upload_bytes: 16,
        ..AppConfig::default()
    });
    let customer = register(&app, "customer", "Asha Devi", "9000000001").await;
    let auth = token("customer", &customer);

    let (status, body) = upload(&app, &auth, &customer, "photo", "big.jpg", &[7u8; 17]).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"]["message"].as_str().unwrap().contains("limit"));

    let (status, body) = upload(&app, &auth, &customer, "photo", "huge.jpg", &[7u8; 4096]).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"]["message"].as_str().unwrap().contains("limit"));
}

#[tokio::test]
async fn test_empty_upload_rejected() {
    let c = Counter::open().await;
    let (status, body) =
        upload(&c.app, &c.customer_auth, &c.customer, "photo", "empty.jpg", b"").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let fields = body["error"]["details"]["fields"].as_array().unwrap();
    assert!(fields.iter().any(|f| f["field"] == "content"));
}

// -- Wallet -------------------------------------------------------------------

#[tokio::test]
async fn test_wallet_credit_rules() {
    let c = Counter::open().await;

    let (status, _) = add_funds(&c.app, &c.customer_auth, &c.customer, 1_000).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = add_funds(&c.app, &c.staff_a_auth, &c.customer, 0).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, txn) = add_funds(&c.app, &c.staff_a_auth, &c.customer, 2_500).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(txn["kind"], "top_up");
    assert_eq!(txn["amount"], 2_500);

    let (status, snapshot) = call(
        &c.app,
        "GET",
        &format!("/v1/wallet/{}/balance", c.customer),
        Some(&c.customer_auth),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["balance"], 2_500);
    assert_eq!(snapshot["transaction_count"], 1);

    let (status, _) =
        add_funds(&c.app, &c.staff_a_auth, &uuid::Uuid::new_v4().to_string(), 100).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_wallet_is_private() {
    let c = Counter::open().await;
    let other = register(&c.app, "customer", "Other", "9000000099").await;
    let (status, _) = call(
        &c.app,
        "GET",
        &format!("/v1/wallet/{}/transactions", c.customer),
        Some(&token("customer", &other)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// -- Registry, catalog, settings ---------------------------------------------

#[tokio::test]
async fn test_duplicate_phone_is_conflict() {
    let app = test_app();
    register(&app, "customer", "Asha Devi", "90000-00001").await;
    let (status, body) = call(
        &app,
        "POST",
        "/v1/identities",
        Some(&admin()),
        Some(json!({ "name": "Someone", "phone": "9000000001" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "STATE_CONFLICT");
}

#[tokio::test]
async fn test_staff_registers_customers_but_not_staff() {
    let c = Counter::open().await;
    let (status, body) = call(
        &c.app,
        "POST",
        "/v1/identities",
        Some(&c.staff_a_auth),
        Some(json!({ "name": "Walk-in", "phone": "9000000060", "village": "Rampur" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["role"], "customer");
    assert_eq!(body["village"], "Rampur");
    assert_eq!(body["wallet_balance"], 0);

    let (status, _) = call(
        &c.app,
        "POST",
        "/v1/identities",
        Some(&c.staff_a_auth),
        Some(json!({ "name": "New Staff", "phone": "9000000061", "role": "staff" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, found) = call(
        &c.app,
        "GET",
        "/v1/identities?phone=90000%2000060",
        Some(&c.staff_a_auth),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_revoked_staff_cannot_claim() {
    let c = Counter::open().await;
    let order = c.submitted_order().await;

    let (status, body) = call(
        &c.app,
        "POST",
        &format!("/v1/identities/{}/revoke", c.staff_a),
        Some(&admin()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["revoked_at"].is_string());

    let (status, _) = c.claim(&order, &c.staff_a, &c.staff_a_auth).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Only admins revoke.
    let (status, _) = call(
        &c.app,
        "POST",
        &format!("/v1/identities/{}/revoke", c.staff_b),
        Some(&c.staff_b_auth),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_role_change_takes_effect() {
    let c = Counter::open().await;
    let (status, body) = call(
        &c.app,
        "PUT",
        &format!("/v1/identities/{}/role", c.customer),
        Some(&admin()),
        Some(json!({ "role": "b2b" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "b2b");
}

#[tokio::test]
async fn test_service_revision_is_additive_only() {
    let c = Counter::open().await;
    let uri = format!("/v1/services/{}", c.service);

    let (status, body) = call(
        &c.app,
        "PUT",
        &uri,
        Some(&admin()),
        Some(json!({
            "name": "PAN Card",
            "price_normal": 11_000,
            "price_b2b": 9_000,
            "required_documents": ["aadhaar", "photo", "signature"],
            "form_schema": [
                { "name": "full_name", "label": "Full name" },
                { "name": "dob", "label": "Date of birth", "field_type": "date" },
            ],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["price_normal"], 11_000);

    let (status, _) = call(
        &c.app,
        "PUT",
        &uri,
        Some(&admin()),
        Some(json!({
            "name": "PAN Card",
            "price_normal": 11_000,
            "price_b2b": 9_000,
            "required_documents": ["photo"],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = call(&c.app, "PUT", &uri, Some(&c.staff_a_auth), Some(json!({
        "name": "PAN Card", "price_normal": 1, "price_b2b": 1,
    })))
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, listed) = call(&c.app, "GET", "/v1/services", Some(&c.customer_auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed[0]["required_documents"], json!(["aadhaar", "photo", "signature"]));
}

#[tokio::test]
async fn test_settings_read_by_all_written_by_admin() {
    let c = Counter::open().await;
    let (status, _) = call(
        &c.app,
        "PUT",
        "/v1/settings",
        Some(&c.staff_a_auth),
        Some(json!({ "broadcast_message": "Closed Monday" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(
        &c.app,
        "PUT",
        "/v1/settings",
        Some(&admin()),
        Some(json!({ "broadcast_message": "Closed Monday", "support_phone": "1800-000-000" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, settings) =
        call(&c.app, "GET", "/v1/settings", Some(&c.customer_auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settings["broadcast_message"], "Closed Monday");
    assert_eq!(settings["support_phone"], "1800-000-000");
}

#[tokio::test]
async fn test_audit_log_requires_database() {
    let app = test_app();
    let (status, body) = call(&app, "GET", "/v1/audit/verify", Some(&admin()), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "STORAGE_FAILURE");
}

#[tokio::test]
async fn test_filesystem_vault_serves_content() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app_with(AppConfig {
        document_root: Some(dir.path().to_path_buf()),
        ..AppConfig::default()
    });
    let customer = register(&app, "customer", "Asha Devi", "9000000001").await;
    let auth = token("customer", &customer);

    let (status, doc) = upload(&app, &auth, &customer, "photo", "me.jpg", b"jpeg-bytes").await;
    assert_eq!(status, StatusCode::CREATED);

    let request = Request::builder()
        .uri(format!("/v1/documents/{}/content", id_of(&doc)))
        .header(header::AUTHORIZATION, format!("Bearer {auth}"))
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"jpeg-bytes");
}
