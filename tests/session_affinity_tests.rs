//! Sticky session behavior through the HTTP front-end.

mod common;

#[tokio::test]
async fn sticky_session_pins_and_rebinds_when_backend_opens() {
    let backend_a = common::start_mock_backend(200, "A").await;
    let backend_b = common::start_mock_backend(200, "B").await;

    let harness =
        common::start_proxy(common::config_with_backends(&[("a", backend_a), ("b", backend_b)]))
            .await;
    let client = common::http_client();

    let fetch = |cookie: &'static str| {
        let client = client.clone();
        let url = harness.url("/lb/page");
        async move {
            client
                .get(url)
                .header("Cookie", cookie)
                .send()
                .await
                .unwrap()
                .text()
                .await
                .unwrap()
        }
    };

    // First dispatch binds the session to the first round-robin pick.
    assert_eq!(fetch("session_id=s1").await, "A");
    // Repeated dispatches stay pinned while the backend is healthy.
    assert_eq!(fetch("session_id=s1").await, "A");
    assert_eq!(fetch("session_id=s1").await, "A");

    // Opening the bound backend invalidates the binding and rebinds.
    harness.registry.get("a").unwrap().trip_open();
    assert_eq!(fetch("session_id=s1").await, "B");

    // The rebinding sticks even after the original backend heals.
    harness.registry.get("a").unwrap().reset_closed();
    assert_eq!(fetch("session_id=s1").await, "B");
}

#[tokio::test]
async fn requests_without_a_session_cookie_are_not_pinned() {
    let backend_a = common::start_mock_backend(200, "A").await;
    let backend_b = common::start_mock_backend(200, "B").await;

    let harness =
        common::start_proxy(common::config_with_backends(&[("a", backend_a), ("b", backend_b)]))
            .await;
    let client = common::http_client();

    // With zero weights the fallback round-robin alternates backends.
    let first = client
        .get(harness.url("/lb/page"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let second = client
        .get(harness.url("/lb/page"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert_ne!(first, second);
}
