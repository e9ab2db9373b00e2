use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use partition_gate::api;
use partition_gate::app_state::AppState;
use serde_json::{json, Value};

const SUDO_KEY: &str = "integration-sudo-key";

fn api_request(operation: &str, params: Value) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/_api")
        .insert_header(("X-Type", operation))
        .set_payload(params.to_string())
}

fn upload_request(key: &str, partition: &str, path: &str, body: &'static [u8]) -> test::TestRequest {
    let params = json!({ "key": key, "partition": partition, "relative_path": path });
    test::TestRequest::post()
        .uri("/_api")
        .insert_header(("X-Type", "Upload"))
        .insert_header(("X-Json-Body", params.to_string()))
        .insert_header((header::CONTENT_TYPE, "text/plain"))
        .set_payload(body)
        .insert_header((header::CONTENT_LENGTH, body.len()))
}

fn error_code(body: &[u8]) -> String {
    let value: Value = serde_json::from_slice(body).unwrap();
    value["code"].as_str().unwrap_or_default().to_string()
}

#[actix_web::test]
async fn test_full_partition_lifecycle() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(AppState::new_for_testing(SUDO_KEY)))
            .configure(api::configure),
    )
    .await;

    // Partition with a 16 byte quota
    let resp = test::call_service(
        &app,
        api_request(
            "CreatePartition",
            json!({ "sudo_key": SUDO_KEY, "name": "notes", "rule_set": "prefix=notes/,max-size=16b" }),
        )
        .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = test::call_service(
        &app,
        api_request(
            "CreatePartition",
            json!({ "sudo_key": SUDO_KEY, "name": "notes", "rule_set": "prefix=other" }),
        )
        .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&test::read_body(resp).await), "partition_exists");

    let created: Value = test::call_and_read_body_json(
        &app,
        api_request("CreateKey", json!({ "sudo_key": SUDO_KEY, "partitions": ["notes"] })).to_request(),
    )
    .await;
    let key = created["key"].as_str().unwrap().to_string();
    println!("Created key {}", key);

    // Upload within quota
    let resp = test::call_service(&app, upload_request(&key, "notes", "a.txt", b"0123456789").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get(header::CACHE_CONTROL).unwrap(), "no-cache");
    assert_eq!(resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
    let body: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body, json!({ "size": 10 }));

    // Second upload would exceed the quota
    let resp = test::call_service(&app, upload_request(&key, "notes", "b.txt", b"0123456789").to_request()).await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(error_code(&test::read_body(resp).await), "too_large");

    // Delete frees the space again
    let resp = test::call_service(
        &app,
        api_request("Delete", json!({ "key": key, "partition": "notes", "relative_path": "a.txt" })).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = test::call_service(
        &app,
        api_request("Delete", json!({ "key": key, "partition": "notes", "relative_path": "a.txt" })).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(&test::read_body(resp).await), "invalid_path");

    let resp = test::call_service(&app, upload_request(&key, "notes", "b.txt", b"0123456789").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // Deleting the partition invalidates the key
    let resp = test::call_service(
        &app,
        api_request("DeletePartition", json!({ "sudo_key": SUDO_KEY, "name": "notes" })).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = test::call_service(&app, upload_request(&key, "notes", "c.txt", b"x").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(&test::read_body(resp).await), "invalid_key");

    let resp = test::call_service(
        &app,
        api_request("DeletePartition", json!({ "sudo_key": SUDO_KEY, "name": "notes" })).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&test::read_body(resp).await), "invalid_partition");

    let report: Value = test::call_and_read_body_json(
        &app,
        api_request("SweepOrphans", json!({ "sudo_key": SUDO_KEY })).to_request(),
    )
    .await;
    assert_eq!(report["dispatched"], 0);

    println!("✓ Partition lifecycle passed all tests");
}

#[actix_web::test]
async fn test_validation_policy_rejects_content() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(AppState::new_for_testing(SUDO_KEY)))
            .configure(api::configure),
    )
    .await;

    let resp = test::call_service(
        &app,
        api_request(
            "CreatePartition",
            json!({ "sudo_key": SUDO_KEY, "name": "icons", "rule_set": "prefix=icons,ensure=png" }),
        )
        .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = test::call_service(
        &app,
        api_request(
            "CreatePartition",
            json!({ "sudo_key": SUDO_KEY, "name": "gifs", "rule_set": "prefix=gifs,ensure=gif" }),
        )
        .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["code"], "invalid_rule_set");
    assert_eq!(body["message"], "Invalid rule set");

    let created: Value = test::call_and_read_body_json(
        &app,
        api_request("CreateKey", json!({ "sudo_key": SUDO_KEY, "partitions": ["icons"] })).to_request(),
    )
    .await;
    let key = created["key"].as_str().unwrap().to_string();

    let resp = test::call_service(&app, upload_request(&key, "icons", "x.png", b"not an image").to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["code"], "validation_failed");
    assert_eq!(body["message"], "The image specified is not a png");
}

#[actix_web::test]
async fn test_request_errors() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(AppState::new_for_testing(SUDO_KEY)))
            .configure(api::configure),
    )
    .await;

    // Missing and unknown operation
    let resp = test::call_service(&app, test::TestRequest::post().uri("/_api").to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&test::read_body(resp).await), "invalid_type");

    let resp = test::call_service(&app, api_request("Rename", json!({})).to_request()).await;
    assert_eq!(error_code(&test::read_body(resp).await), "invalid_type");

    // Malformed parameters
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/_api")
            .insert_header(("X-Type", "CreateKey"))
            .set_payload("{not json")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&test::read_body(resp).await), "invalid_json");

    // Wrong superuser secret
    let resp = test::call_service(
        &app,
        api_request("CreateKey", json!({ "sudo_key": "guess", "partitions": ["x"] })).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&test::read_body(resp).await), "invalid_key");

    let resp = test::call_service(
        &app,
        api_request("CreateKey", json!({ "sudo_key": SUDO_KEY, "partitions": [] })).to_request(),
    )
    .await;
    assert_eq!(error_code(&test::read_body(resp).await), "partitions_empty");

    // Upload without a declared length
    test::call_service(
        &app,
        api_request(
            "CreatePartition",
            json!({ "sudo_key": SUDO_KEY, "name": "docs", "rule_set": "prefix=docs" }),
        )
        .to_request(),
    )
    .await;
    let created: Value = test::call_and_read_body_json(
        &app,
        api_request("CreateKey", json!({ "sudo_key": SUDO_KEY, "partitions": ["docs"] })).to_request(),
    )
    .await;
    let params = json!({ "key": created["key"], "partition": "docs", "relative_path": "a" });
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/_api")
            .insert_header(("X-Type", "Upload"))
            .insert_header(("X-Json-Body", params.to_string()))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&test::read_body(resp).await), "invalid_headers");
}
