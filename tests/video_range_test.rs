//! HTTP-level tests for `GET /videos/{id}` byte-range delivery.

mod common;

use common::{fixture, TestHarness};
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use reqwest::StatusCode;

#[tokio::test]
async fn whole_file_without_range() {
    let h = TestHarness::start().await;
    let data = fixture(10_000);
    h.put_video("clip", &data);

    let resp = h.client.get(h.url("/videos/clip")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[CONTENT_TYPE], "video/webm");
    assert_eq!(resp.headers()[CONTENT_LENGTH], "10000");
    assert_eq!(resp.headers()[ACCEPT_RANGES], "bytes");
    assert!(resp.headers().get(CONTENT_RANGE).is_none());
    assert_eq!(resp.bytes().await.unwrap().as_ref(), &data[..]);
}

#[tokio::test]
async fn webm_suffix_resolves_same_video() {
    let h = TestHarness::start().await;
    let data = fixture(64);
    h.put_video("clip", &data);

    let resp = h.client.get(h.url("/videos/clip.webm")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), &data[..]);
}

#[tokio::test]
async fn thousand_byte_example_range() {
    let h = TestHarness::start().await;
    let data = fixture(1000);
    h.put_video("example", &data);

    let resp = h
        .client
        .get(h.url("/videos/example"))
        .header(RANGE, "bytes=200-499")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(resp.headers()[CONTENT_RANGE], "bytes 200-499/1000");
    assert_eq!(resp.headers()[CONTENT_LENGTH], "300");
    assert_eq!(resp.headers()[CONTENT_TYPE], "video/webm");
    assert_eq!(resp.headers()[ACCEPT_RANGES], "bytes");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), &data[200..=499]);
}

#[tokio::test]
async fn open_ended_range_runs_to_last_byte() {
    let h = TestHarness::start().await;
    let data = fixture(1000);
    h.put_video("clip", &data);

    let resp = h
        .client
        .get(h.url("/videos/clip"))
        .header(RANGE, "bytes=900-")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(resp.headers()[CONTENT_RANGE], "bytes 900-999/1000");
    assert_eq!(resp.headers()[CONTENT_LENGTH], "100");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), &data[900..]);
}

#[tokio::test]
async fn single_byte_ranges_at_the_edges() {
    let h = TestHarness::start().await;
    let data = fixture(1000);
    h.put_video("clip", &data);

    for (range, expected) in [("bytes=0-0", &data[0..1]), ("bytes=999-999", &data[999..])] {
        let resp = h
            .client
            .get(h.url("/videos/clip"))
            .header(RANGE, range)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(resp.headers()[CONTENT_LENGTH], "1");
        assert_eq!(resp.bytes().await.unwrap().as_ref(), expected);
    }
}

#[tokio::test]
async fn unknown_video_is_404() {
    let h = TestHarness::start().await;

    for path in ["/videos/missing", "/videos/missing.webm", "/videos/.hidden"] {
        let resp = h.client.get(h.url(path)).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{path}");
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body, serde_json::json!({"error": "Video not found"}));
    }
}

#[tokio::test]
async fn unsatisfiable_ranges_are_416() {
    let h = TestHarness::start().await;
    h.put_video("clip", &fixture(1000));

    for range in ["bytes=0-1000", "bytes=1000-", "bytes=500-100", "bytes=abc", "bytes=-100"] {
        let resp = h
            .client
            .get(h.url("/videos/clip"))
            .header(RANGE, range)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::RANGE_NOT_SATISFIABLE, "{range}");
        assert_eq!(resp.headers()[CONTENT_RANGE], "bytes */1000", "{range}");
    }
}

#[tokio::test]
async fn repeated_requests_are_identical() {
    let h = TestHarness::start().await;
    h.put_video("clip", &fixture(5000));

    let mut seen = Vec::new();
    for _ in 0..3 {
        let resp = h
            .client
            .get(h.url("/videos/clip"))
            .header(RANGE, "bytes=1234-4321")
            .send()
            .await
            .unwrap();
        let range = resp.headers()[CONTENT_RANGE].to_str().unwrap().to_string();
        let length = resp.headers()[CONTENT_LENGTH].to_str().unwrap().to_string();
        let body = resp.bytes().await.unwrap();
        seen.push((range, length, body));
    }

    assert!(seen.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn concurrent_ranges_do_not_interfere() {
    let h = TestHarness::start().await;
    let data = fixture(200_000);
    h.put_video("big", &data);

    let ranges: Vec<(usize, usize)> = vec![
        (0, 99_999),
        (50_000, 149_999),
        (100_000, 199_999),
        (0, 0),
        (199_000, 199_999),
        (12_345, 67_890),
    ];

    let mut handles = Vec::new();
    for (start, end) in ranges.iter().copied() {
        let client = h.client.clone();
        let url = h.url("/videos/big");
        handles.push(tokio::spawn(async move {
            let resp = client
                .get(url)
                .header(RANGE, format!("bytes={start}-{end}"))
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
            (start, end, resp.bytes().await.unwrap())
        }));
    }

    for handle in handles {
        let (start, end, body) = handle.await.unwrap();
        assert_eq!(body.as_ref(), &data[start..=end]);
    }
}

#[tokio::test]
async fn empty_video_serves_empty_body() {
    let h = TestHarness::start().await;
    h.put_video("empty", b"");

    let resp = h.client.get(h.url("/videos/empty")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[CONTENT_LENGTH], "0");
    assert!(resp.bytes().await.unwrap().is_empty());

    let resp = h
        .client
        .get(h.url("/videos/empty"))
        .header(RANGE, "bytes=0-")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::RANGE_NOT_SATISFIABLE);
}

#[tokio::test]
async fn listing_reports_stored_videos() {
    let h = TestHarness::start().await;
    h.put_video("b-video", &fixture(20));
    h.put_video("a-video", &fixture(10));
    std::fs::write(h.storage().join("readme.txt"), b"ignored").unwrap();

    let resp = h.client.get(h.url("/api/videos")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["id"], "a-video");
    assert_eq!(items[0]["size_bytes"], 10);
    assert_eq!(items[0]["link"], "/videos/a-video.webm");
    assert_eq!(items[1]["id"], "b-video");
}

/// Open descriptors of this process that point at `path`.
#[cfg(target_os = "linux")]
fn open_handles(path: &std::path::Path) -> usize {
    std::fs::read_dir("/proc/self/fd")
        .unwrap()
        .filter_map(|entry| std::fs::read_link(entry.ok()?.path()).ok())
        .filter(|target| target == path)
        .count()
}

#[cfg(target_os = "linux")]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_response_releases_file_handle() {
    let h = TestHarness::start().await;
    let id = h.put_video("large", &fixture(64 * 1024 * 1024));
    let path = h.ctx.store.path_for(&id).canonicalize().unwrap();
    assert_eq!(open_handles(&path), 0);

    let mut resp = h.client.get(h.url("/videos/large")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.chunk().await.unwrap().is_some());
    assert_eq!(open_handles(&path), 1);

    drop(resp);
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while open_handles(&path) > 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "file handle still open after client disconnect"
        );
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}
