//! Document access tests

use actix_web::http::{StatusCode, header};
use actix_web::{App, test};
use chrono::{TimeZone, Utc};
use serde_json::Value;

use super::TestEnv;

#[actix_web::test]
async fn free_documents_need_no_session() {
    let env = TestEnv::new().await;
    let app = test::init_service(App::new().configure(env.service().await)).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/model-questions/model-1.html")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = test::read_body(resp).await;
    assert_eq!(body, "<h1>Model Question 1</h1>");

    // Broken tokens do not get in the way of free documents
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/model-questions/model-2.html")
            .insert_header(("authorization", "Session garbage"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn gated_document_redirects_to_login() {
    let env = TestEnv::with_subscribers().await;
    let app = test::init_service(App::new().configure(env.service().await)).await;

    for auth in [None, Some("Session garbage")] {
        let mut req = test::TestRequest::get().uri("/model-questions/model-3.html");
        if let Some(auth) = auth {
            req = req.insert_header(("authorization", auth));
        }

        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            resp.headers().get(header::LOCATION).unwrap(),
            "/login.html?redirect=%2Fmodel-questions%2Fmodel-3.html"
        );
    }
}

#[actix_web::test]
async fn lapsed_subscriber_redirected_to_renew() {
    let env = TestEnv::with_subscribers().await;
    let session = env.session("bobby");
    let app = test::init_service(App::new().configure(env.service().await)).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/model-questions/model-3.html")
            .insert_header(("authorization", session.clone()))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        resp.headers().get(header::LOCATION).unwrap(),
        "/profile.html"
    );

    // Free documents stay open
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/model-questions/model-1.html")
            .insert_header(("authorization", session))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn active_subscriber_reads_gated_document() {
    let env = TestEnv::with_subscribers().await;
    let session = env.session("alice");
    let app = test::init_service(App::new().configure(env.service().await)).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/model-questions/model-3.html")
            .insert_header(("authorization", session))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cache = resp
        .headers()
        .get(header::CACHE_CONTROL)
        .unwrap()
        .to_str()
        .unwrap()
        .to_owned();
    assert!(cache.contains("no-store"));
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/html; charset=utf-8"
    );

    let body = test::read_body(resp).await;
    assert_eq!(body, "<h1>Model Question 3</h1>");
}

#[actix_web::test]
async fn session_cookie_opens_documents() {
    let env = TestEnv::with_subscribers().await;
    let app = test::init_service(App::new().configure(env.service().await)).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/login")
            .set_json(serde_json::json!({ "username": "alice", "pin": "1234" }))
            .to_request(),
    )
    .await;
    let cookie = resp
        .response()
        .cookies()
        .find(|cookie| cookie.name() == "session")
        .unwrap()
        .into_owned();

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/model-questions/model-3.html")
            .cookie(cookie)
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn access_ends_on_expiry_date() {
    let env = TestEnv::with_subscribers().await;
    let app = test::init_service(App::new().configure(env.service().await)).await;

    // alice expires on 2025-06-01
    env.clock
        .set(Utc.with_ymd_and_hms(2025, 5, 31, 23, 0, 0).unwrap());
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/model-questions/model-3.html")
            .insert_header(("authorization", env.session("alice")))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    env.clock.set(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/model-questions/model-3.html")
            .insert_header(("authorization", env.session("alice")))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        resp.headers().get(header::LOCATION).unwrap(),
        "/profile.html"
    );
}

#[actix_web::test]
async fn unknown_documents() {
    let env = TestEnv::with_subscribers().await;
    let session = env.session("alice");
    let app = test::init_service(App::new().configure(env.service().await)).await;

    // Out of range, even anonymous callers learn nothing more than 404
    for uri in [
        "/model-questions/model-0.html",
        "/model-questions/model-31.html",
    ] {
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{uri}");
    }

    // In range, but the file is not there
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/model-questions/model-4.html")
            .insert_header(("authorization", session))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // The users document is never served
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/users.json").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn questions_listing() {
    let env = TestEnv::with_subscribers().await;
    let app = test::init_service(App::new().configure(env.service().await)).await;

    let listing: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/api/questions").to_request(),
    )
    .await;
    let questions = listing["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 30);

    assert_eq!(questions[0]["title"], "Model Question 1");
    assert_eq!(questions[0]["free"], true);
    assert_eq!(questions[0]["access"], "allow");
    assert_eq!(questions[0]["href"], "/model-questions/model-1.html");

    assert_eq!(questions[2]["free"], false);
    assert_eq!(questions[2]["access"], "redirect_login");
    assert!(questions[2].get("href").is_none());

    let listing: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/questions")
            .insert_header(("authorization", env.session("bobby")))
            .to_request(),
    )
    .await;
    assert_eq!(listing["questions"][1]["access"], "allow");
    assert_eq!(listing["questions"][2]["access"], "redirect_renew");

    let listing: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/questions")
            .insert_header(("authorization", env.session("alice")))
            .to_request(),
    )
    .await;
    let questions = listing["questions"].as_array().unwrap();
    assert!(
        questions
            .iter()
            .all(|question| question["access"] == "allow")
    );
}
