mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use serde_json::{json, Value};
use tourbook::users::model::Role;

use common::{multipart, test_app, TestApp};

fn prices(body: &Value) -> Vec<f64> {
    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["price"].as_f64().unwrap())
        .collect()
}

async fn seeded() -> (TestApp, String) {
    let app = test_app();
    let (_, admin) = app.user_with_role("admin@example.com", Role::Admin).await;
    for (name, price) in [
        ("The Forest Hiker", 397.0),
        ("The Sea Explorer", 497.0),
        ("The Snow Adventurer", 997.0),
        ("The City Wanderer", 1197.0),
    ] {
        app.create_tour(&admin, name, price).await;
    }
    (app, admin)
}

#[tokio::test]
async fn tour_writes_are_role_gated() {
    let app = test_app();
    let (_, user) = app.signup("Regular", "regular@example.com").await;
    let (_, lead) = app.user_with_role("lead@example.com", Role::LeadGuide).await;
    let body = common::tour_body("The Park Camper", 250.0);

    let anonymous = app
        .call(Method::POST, "/api/v1/tours", None, Some(body.clone()))
        .await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let forbidden = app
        .call(Method::POST, "/api/v1/tours", Some(&user), Some(body.clone()))
        .await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
    assert_eq!(
        forbidden.body["message"],
        "You do not have permission to perform this action"
    );

    let created = app
        .call(Method::POST, "/api/v1/tours", Some(&lead), Some(body))
        .await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.text);
    assert_eq!(created.body["data"]["slug"], "the-park-camper");
    assert_eq!(created.body["data"]["ratingsAverage"], 4.5);

    let listing = app.get("/api/v1/tours", None).await;
    assert_eq!(listing.status, StatusCode::OK);
    assert_eq!(listing.body["results"], 1);
}

#[tokio::test]
async fn tour_validation_and_uniqueness() {
    let (app, admin) = seeded().await;

    let short = app
        .call(
            Method::POST,
            "/api/v1/tours",
            Some(&admin),
            Some(common::tour_body("Short", 100.0)),
        )
        .await;
    assert_eq!(short.status, StatusCode::BAD_REQUEST);

    let mut discounted = common::tour_body("The Discount Trip", 100.0);
    discounted["priceDiscount"] = json!(150.0);
    let bad_discount = app
        .call(Method::POST, "/api/v1/tours", Some(&admin), Some(discounted))
        .await;
    assert_eq!(bad_discount.status, StatusCode::BAD_REQUEST);

    let dup = app
        .call(
            Method::POST,
            "/api/v1/tours",
            Some(&admin),
            Some(common::tour_body("The Forest Hiker", 100.0)),
        )
        .await;
    assert_eq!(dup.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn list_filters_sorts_projects_and_pages() {
    let (app, _) = seeded().await;

    let filtered = app
        .get("/api/v1/tours?price%5Bgte%5D=497&sort=-price&fields=name,price", None)
        .await;
    assert_eq!(filtered.status, StatusCode::OK, "{}", filtered.text);
    assert_eq!(filtered.body["results"], 3);
    assert_eq!(prices(&filtered.body), vec![1197.0, 997.0, 497.0]);
    let first = filtered.body["data"][0].as_object().unwrap();
    let mut keys: Vec<&str> = first.keys().map(String::as_str).collect();
    keys.sort();
    assert_eq!(keys, vec!["id", "name", "price"]);

    let paged = app.get("/api/v1/tours?sort=price&limit=2&page=2", None).await;
    assert_eq!(prices(&paged.body), vec![997.0, 1197.0]);

    let excluded = app.get("/api/v1/tours?fields=-summary,-description", None).await;
    assert!(excluded.body["data"][0].get("summary").is_none());
    assert!(excluded.body["data"][0].get("name").is_some());

    let unknown = app.get("/api/v1/tours?colour=red", None).await;
    assert_eq!(unknown.status, StatusCode::BAD_REQUEST);

    let mixed = app.get("/api/v1/tours?fields=name,-price", None).await;
    assert_eq!(mixed.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_paging_is_a_client_error() {
    let (app, _) = seeded().await;

    let huge = app
        .get("/api/v1/tours?page=4294967295&limit=4294967295", None)
        .await;
    assert_eq!(huge.status, StatusCode::BAD_REQUEST, "{}", huge.text);
    assert_eq!(huge.body["status"], "fail");
    assert_eq!(huge.body["message"], "'limit' cannot exceed 1000");

    let deep = app.get("/api/v1/tours?page=4294967295&limit=1000", None).await;
    assert_eq!(deep.status, StatusCode::OK);
    assert_eq!(deep.body["results"], 0);
}

#[tokio::test]
async fn top_five_cheap_alias() {
    let (app, admin) = seeded().await;
    app.create_tour(&admin, "The Wine Taster", 1497.0).await;
    app.create_tour(&admin, "The Star Gazer", 2997.0).await;

    let reply = app.get("/api/v1/tours/top-5-cheap?limit=50", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["results"], 5);
    // all tours share the default rating, so price decides
    assert_eq!(
        prices(&reply.body),
        vec![397.0, 497.0, 997.0, 1197.0, 1497.0]
    );
    assert!(reply.body["data"][0].get("summary").is_some());
    assert!(reply.body["data"][0].get("imageCover").is_none());
}

#[tokio::test]
async fn tour_stats_and_monthly_plan() {
    let (app, admin) = seeded().await;
    let (_, user) = app.signup("Visitor", "visitor@example.com").await;
    let (_, guide) = app.user_with_role("guide@example.com", Role::Guide).await;

    let stats = app.get("/api/v1/tours/tour-stats", None).await;
    assert_eq!(stats.status, StatusCode::OK);
    assert_eq!(stats.body["data"]["stats"][0]["difficulty"], "EASY");
    assert_eq!(stats.body["data"]["stats"][0]["numTours"], 4);

    let mut dated = common::tour_body("The Northern Lights", 1500.0);
    dated["startDates"] = json!(["2021-03-21T09:00:00Z", "2021-06-05T09:00:00Z"]);
    app.call(Method::POST, "/api/v1/tours", Some(&admin), Some(dated))
        .await;

    let forbidden = app.get("/api/v1/tours/monthly-plan/2021", Some(&user)).await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

    let plan = app.get("/api/v1/tours/monthly-plan/2021", Some(&guide)).await;
    assert_eq!(plan.status, StatusCode::OK, "{}", plan.text);
    let rows = plan.body["data"]["plan"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["tours"], json!(["The Northern Lights"]));

    let bad_year = app.get("/api/v1/tours/monthly-plan/soon", Some(&guide)).await;
    assert_eq!(bad_year.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_tours_are_404() {
    let (app, admin) = seeded().await;
    let id = uuid::Uuid::new_v4();
    let reply = app.get(&format!("/api/v1/tours/{id}"), None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["message"], "No tour found with that ID");

    let bad_id = app.get("/api/v1/tours/not-a-uuid", None).await;
    assert_eq!(bad_id.status, StatusCode::BAD_REQUEST);

    let delete = app
        .call(Method::DELETE, &format!("/api/v1/tours/{id}"), Some(&admin), None)
        .await;
    assert_eq!(delete.status, StatusCode::NOT_FOUND);
}

async fn upload(app: &TestApp, uri: &str, token: &str, files: &[(&str, &str)]) -> common::Reply {
    let boundary = "tourbook-boundary";
    let req = Request::builder()
        .method(Method::PATCH)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(multipart(boundary, files)))
        .unwrap();
    app.send(req).await
}

#[tokio::test]
async fn tour_images_upload() {
    let (app, admin) = seeded().await;
    let tour = app.create_tour(&admin, "The Gallery Walker", 300.0).await;
    let uri = format!("/api/v1/tours/{}/images", tour["id"].as_str().unwrap());

    let no_cover = upload(&app, &uri, &admin, &[("images", "image/jpeg")]).await;
    assert_eq!(no_cover.status, StatusCode::BAD_REQUEST);

    let not_image = upload(
        &app,
        &uri,
        &admin,
        &[("imageCover", "text/plain"), ("images", "image/jpeg")],
    )
    .await;
    assert_eq!(not_image.status, StatusCode::BAD_REQUEST);
    assert_eq!(not_image.body["message"], "Not an image! Please upload only images.");

    let ok = upload(
        &app,
        &uri,
        &admin,
        &[
            ("imageCover", "image/jpeg"),
            ("images", "image/png"),
            ("images", "image/png"),
        ],
    )
    .await;
    assert_eq!(ok.status, StatusCode::OK, "{}", ok.text);
    let cover = ok.body["data"]["imageCover"].as_str().unwrap();
    assert!(cover.starts_with("tours/tour-"));
    assert!(cover.ends_with("-cover.jpg"));
    assert_eq!(ok.body["data"]["images"].as_array().unwrap().len(), 2);
    assert_eq!(app.storage.keys().len(), 3);
}

#[tokio::test]
async fn reviews_recompute_tour_ratings() {
    let (app, admin) = seeded().await;
    let tour = app.create_tour(&admin, "The Reviewed Trail", 500.0).await;
    let tour_id = tour["id"].as_str().unwrap().to_string();
    let (alice_id, alice) = app.signup("Alice", "alice@example.com").await;
    let (_, bob) = app.signup("Bob", "bob@example.com").await;
    let (_, guide) = app.user_with_role("guide@example.com", Role::Guide).await;
    let nested = format!("/api/v1/tours/{tour_id}/reviews");

    let first = app
        .call(
            Method::POST,
            &nested,
            Some(&alice),
            Some(json!({ "review": "Loved it", "rating": 4, "user": uuid::Uuid::new_v4() })),
        )
        .await;
    assert_eq!(first.status, StatusCode::CREATED, "{}", first.text);
    assert_eq!(first.body["data"]["tour"], tour_id.as_str());
    assert_eq!(first.body["data"]["user"], alice_id.to_string());
    let review_id = first.body["data"]["id"].as_str().unwrap().to_string();

    let twice = app
        .call(
            Method::POST,
            &nested,
            Some(&alice),
            Some(json!({ "review": "Again", "rating": 5 })),
        )
        .await;
    assert_eq!(twice.status, StatusCode::CONFLICT);

    let by_guide = app
        .call(
            Method::POST,
            &nested,
            Some(&guide),
            Some(json!({ "review": "Staff pick", "rating": 5 })),
        )
        .await;
    assert_eq!(by_guide.status, StatusCode::FORBIDDEN);

    app.call(
        Method::POST,
        "/api/v1/reviews",
        Some(&bob),
        Some(json!({ "review": "Great", "rating": 5, "tour": tour_id })),
    )
    .await;

    let detail = app.get(&format!("/api/v1/tours/{tour_id}"), None).await;
    assert_eq!(detail.body["data"]["ratingsQuantity"], 2);
    assert_eq!(detail.body["data"]["ratingsAverage"], 4.5);
    let reviews = detail.body["data"]["reviews"].as_array().unwrap();
    assert_eq!(reviews.len(), 2);
    assert!(reviews.iter().any(|r| r["authorName"] == "Alice"));

    let scoped = app.get(&nested, Some(&bob)).await;
    assert_eq!(scoped.body["results"], 2);
    assert_eq!(app.get(&nested, None).await.status, StatusCode::UNAUTHORIZED);

    let review_uri = format!("/api/v1/reviews/{review_id}");
    let not_owner = app
        .call(Method::PATCH, &review_uri, Some(&bob), Some(json!({ "rating": 1 })))
        .await;
    assert_eq!(not_owner.status, StatusCode::FORBIDDEN);

    let edited = app
        .call(Method::PATCH, &review_uri, Some(&admin), Some(json!({ "rating": 2 })))
        .await;
    assert_eq!(edited.status, StatusCode::OK);
    let detail = app.get(&format!("/api/v1/tours/{tour_id}"), None).await;
    assert_eq!(detail.body["data"]["ratingsAverage"], 3.5);

    let deleted = app.call(Method::DELETE, &review_uri, Some(&alice), None).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    let detail = app.get(&format!("/api/v1/tours/{tour_id}"), None).await;
    assert_eq!(detail.body["data"]["ratingsQuantity"], 1);
    assert_eq!(detail.body["data"]["ratingsAverage"], 5.0);
}

#[tokio::test]
async fn profile_updates_and_deactivation() {
    let app = test_app();
    let (_, token) = app.signup("Margaret", "margaret@example.com").await;

    let password = app
        .call(
            Method::PATCH,
            "/api/v1/users/me",
            Some(&token),
            Some(json!({ "password": "sneaky123" })),
        )
        .await;
    assert_eq!(password.status, StatusCode::BAD_REQUEST);

    let renamed = app
        .call(
            Method::PATCH,
            "/api/v1/users/me",
            Some(&token),
            Some(json!({ "name": "Maggie", "role": "admin" })),
        )
        .await;
    assert_eq!(renamed.status, StatusCode::OK);
    assert_eq!(renamed.body["data"]["name"], "Maggie");
    assert_eq!(renamed.body["data"]["role"], "user");

    let photo_req = Request::builder()
        .method(Method::PATCH)
        .uri("/api/v1/users/me/photo")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "multipart/form-data; boundary=xyz")
        .body(Body::from(multipart("xyz", &[("photo", "image/jpeg")])))
        .unwrap();
    let photo = app.send(photo_req).await;
    assert_eq!(photo.status, StatusCode::OK, "{}", photo.text);
    assert!(photo.body["data"]["photo"]
        .as_str()
        .unwrap()
        .starts_with("users/user-"));

    let gone = app.call(Method::DELETE, "/api/v1/users/me", Some(&token), None).await;
    assert_eq!(gone.status, StatusCode::NO_CONTENT);

    let after = app.get("/api/v1/users/me", Some(&token)).await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        after.body["message"],
        "The user belonging to this token no longer exists."
    );
}

#[tokio::test]
async fn user_admin_routes() {
    let app = test_app();
    let (user_id, user) = app.signup("Plain", "plain@example.com").await;
    let (_, admin) = app.user_with_role("root@example.com", Role::Admin).await;

    assert_eq!(app.get("/api/v1/users", Some(&user)).await.status, StatusCode::FORBIDDEN);

    let all = app.get("/api/v1/users?role=user", Some(&admin)).await;
    assert_eq!(all.status, StatusCode::OK);
    assert_eq!(all.body["results"], 1);

    let promoted = app
        .call(
            Method::PATCH,
            &format!("/api/v1/users/{user_id}"),
            Some(&admin),
            Some(json!({ "role": "guide" })),
        )
        .await;
    assert_eq!(promoted.body["data"]["role"], "guide");

    let removed = app
        .call(Method::DELETE, &format!("/api/v1/users/{user_id}"), Some(&admin), None)
        .await;
    assert_eq!(removed.status, StatusCode::NO_CONTENT);
    let all = app.get("/api/v1/users", Some(&admin)).await;
    assert_eq!(all.body["results"], 1);
}
