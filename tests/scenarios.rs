mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{FakeCarousel, FakeExtractor, FakePosts, FakeTranscoder, Fixture};
use mediagrab::downloader::format_selector::selector_for;
use mediagrab::downloader::models::{MediaItem, MediaKind, PageMedia, TargetQuality};
use mediagrab::merge::MergeEngine;
use mediagrab::request_store::ManualClock;
use mediagrab::{
    classify, ContentKind, Pipeline, PipelineError, PipelineOutput, Platform, ProcessOptions, RequestStore,
    TokenRedemptionError,
};

fn pipeline(fx: &Fixture, extractor: Arc<FakeExtractor>) -> Pipeline {
    Pipeline::new(
        fx.config.clone(),
        fx.orchestrator(extractor),
        Arc::new(FakeTranscoder::default()),
        fx.pool.clone(),
    )
}

#[tokio::test]
async fn test_short_link_downloads_single_video() {
    let fx = Fixture::new();
    let extractor = Arc::new(FakeExtractor::default());
    let pipeline = pipeline(&fx, extractor.clone());

    let request = classify("https://youtu.be/abc123").unwrap();
    assert_eq!(request.platform, Platform::YouTube);
    assert_eq!(request.content_kind, ContentKind::Video);
    assert_eq!(request.canonical_id, "abc123");

    let output = pipeline
        .process("https://youtu.be/abc123", None, ProcessOptions::default(), None)
        .await
        .unwrap();

    let PipelineOutput::Media { items, .. } = output else {
        panic!("expected media output");
    };
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].kind, MediaKind::Video);
    assert_eq!(items[0].size_bytes, 5);
    assert_eq!(items[0].dimensions.map(|d| (d.width, d.height)), Some((1280, 720)));
    assert!(items[0].artifact_path.starts_with(&fx.config.download_dir));
    assert_eq!(extractor.fetch_count(), 1);
}

#[tokio::test]
async fn test_wall_post_resolves_without_download() {
    let fx = Fixture::new();
    let extractor = Arc::new(FakeExtractor::default());
    let posts = Arc::new(FakePosts {
        media: PageMedia {
            text: Some("hello".to_string()),
            images: vec!["https://sun9-1.userapi.com/a.jpg".to_string()],
            videos: vec!["https://vk.com/video-123_789".to_string()],
        },
        calls: Mutex::new(Vec::new()),
    });
    let pipeline = pipeline(&fx, extractor.clone()).with_post_resolver(posts.clone());

    let output = pipeline
        .process("https://vk.com/wall-123_456", None, ProcessOptions::default(), None)
        .await
        .unwrap();

    assert_eq!(output, PipelineOutput::Attachments(posts.media.clone()));
    assert_eq!(*posts.calls.lock().unwrap(), vec!["-123_456".to_string()]);
    assert_eq!(extractor.fetch_count(), 0);
}

#[tokio::test]
async fn test_wall_post_without_resolver_is_unsupported() {
    let fx = Fixture::new();
    let pipeline = pipeline(&fx, Arc::new(FakeExtractor::default()));

    let err = pipeline
        .process("https://vk.com/wall-123_456", None, ProcessOptions::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Download(_)));
}

#[tokio::test]
async fn test_merge_keeps_carousel_order() {
    let fx = Fixture::new();
    let inputs = fx.root.path().join("inputs");
    std::fs::create_dir_all(&inputs).unwrap();
    let mut items = Vec::new();
    for (i, name) in ["b_photo.jpg", "a_photo.png", "clip.mp4"].iter().enumerate() {
        let path = inputs.join(name);
        std::fs::write(&path, b"media").unwrap();
        items.push(MediaItem::new(path, i));
    }
    // Order comes from order_index, not from the file names
    items.reverse();

    let transcoder = Arc::new(FakeTranscoder::default());
    let engine = MergeEngine::new(&fx.config, transcoder.clone(), fx.pool.clone());
    let result = engine.merge(items).await.unwrap();

    assert_eq!(result.segment_count, 3);
    assert!(result.output_path.exists());
    let manifests = transcoder.manifests.lock().unwrap();
    let lines: Vec<&str> = manifests[0].lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].ends_with("segment_000.mp4'"));
    assert!(lines[2].ends_with("segment_002.mp4'"));
    assert_eq!(std::fs::read_dir(fx.work_dir()).unwrap().count(), 0);
    assert!(!inputs.join("clip.mp4").exists());
}

#[tokio::test]
async fn test_carousel_is_merged_into_one_payload() {
    let fx = Fixture::new();
    let orchestrator = fx
        .orchestrator(Arc::new(FakeExtractor::default()))
        .with_platform_api(Arc::new(FakeCarousel {
            files: vec!["jpg", "jpg", "mp4"],
        }));
    let pipeline = Pipeline::new(
        fx.config.clone(),
        orchestrator,
        Arc::new(FakeTranscoder::default()),
        fx.pool.clone(),
    );

    let output = pipeline
        .process(
            "https://www.instagram.com/p/Cabc123/",
            None,
            ProcessOptions { merge: true },
            None,
        )
        .await
        .unwrap();

    let PipelineOutput::Media { items, .. } = output else {
        panic!("expected media output");
    };
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].kind, MediaKind::Video);
    let name = items[0].artifact_path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("merged_"));
}

#[tokio::test]
async fn test_quality_choice_round_trip() {
    let fx = Fixture::new();
    let extractor = Arc::new(FakeExtractor::with_heights(&[(640, 360), (1280, 720), (1920, 1080)]));
    let pipeline = pipeline(&fx, extractor.clone());

    let proposal = pipeline.propose_quality("https://youtu.be/abc123", 42).await.unwrap();
    assert!(proposal.options.iter().any(|o| o.value == "1280x720"));
    assert!(proposal.options.iter().any(|o| o.is_audio));

    // Another requester cannot use the token, and the owner still can
    let foreign = pipeline
        .process_token(&proposal.token, 7, "1280x720", ProcessOptions::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(foreign, PipelineError::Token(TokenRedemptionError::Expired)));

    pipeline
        .process_token(&proposal.token, 42, "1280x720", ProcessOptions::default(), None)
        .await
        .unwrap();
    let fetches = extractor.fetches.lock().unwrap().clone();
    let target: TargetQuality = "1280x720".parse().unwrap();
    assert_eq!(
        fetches[0].format_selector,
        selector_for(Some(&target), &fx.config.codec_preference)
    );

    let reused = pipeline
        .process_token(&proposal.token, 42, "1280x720", ProcessOptions::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(reused, PipelineError::Token(TokenRedemptionError::Expired)));
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let fx = Fixture::new();
    let clock = Arc::new(ManualClock::new(time::OffsetDateTime::now_utc()));
    let store = Arc::new(RequestStore::with_clock(fx.config.request_ttl(), clock.clone()));
    let pipeline = pipeline(&fx, Arc::new(FakeExtractor::default())).with_store(store);

    let proposal = pipeline.propose_quality("https://youtu.be/abc123", 1).await.unwrap();
    clock.advance(fx.config.request_ttl() + Duration::from_secs(1));

    let err = pipeline
        .process_token(&proposal.token, 1, "mp3", ProcessOptions::default(), None)
        .await
        .unwrap_err();
    assert_eq!(err.user_message(), TokenRedemptionError::Expired.user_message());
}

#[tokio::test]
async fn test_oversized_artifact_is_rejected_and_removed() {
    let mut fx = Fixture::new();
    fx.config.delivery_size_ceiling_mb = 1;
    let extractor = Arc::new(FakeExtractor {
        payload_len: 2 * 1024 * 1024,
        ..Default::default()
    });
    let pipeline = Pipeline::new(
        fx.config.clone(),
        fx.orchestrator(extractor),
        Arc::new(FakeTranscoder::default()),
        fx.pool.clone(),
    );

    let err = pipeline
        .process("https://youtu.be/abc123", Some(TargetQuality::AudioOnly), ProcessOptions::default(), None)
        .await
        .unwrap_err();

    match err {
        PipelineError::TooLargeForDelivery { path, size, .. } => {
            assert_eq!(size, 2 * 1024 * 1024);
            assert!(!path.exists());
        }
        other => panic!("expected size rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_single_video_below_delivery_ceiling_keeps_chosen_quality() {
    let mut fx = Fixture::new();
    fx.config.merge_size_ceiling_mb = 1;
    let extractor = Arc::new(FakeExtractor {
        payload_len: 2 * 1024 * 1024,
        ..Default::default()
    });
    let pipeline = pipeline(&fx, extractor);

    let output = pipeline
        .process(
            "https://youtu.be/abc123",
            Some("1920x1080".parse().unwrap()),
            ProcessOptions::default(),
            None,
        )
        .await
        .unwrap();

    let PipelineOutput::Media { items, .. } = output else {
        panic!("expected media output");
    };
    let name = items[0].artifact_path.file_name().unwrap().to_string_lossy().to_string();
    assert!(!name.contains("_compressed"), "re-encoded: {name}");
    assert_eq!(items[0].size_bytes, 2 * 1024 * 1024);
}

#[tokio::test]
async fn test_single_instagram_video_is_squeezed_under_merge_ceiling() {
    let mut fx = Fixture::new();
    fx.config.merge_size_ceiling_mb = 0;
    let orchestrator = fx
        .orchestrator(Arc::new(FakeExtractor::default()))
        .with_platform_api(Arc::new(FakeCarousel { files: vec!["mp4"] }));
    let pipeline = Pipeline::new(
        fx.config.clone(),
        orchestrator,
        Arc::new(FakeTranscoder::default()),
        fx.pool.clone(),
    );

    let output = pipeline
        .process("https://instagram.com/reel/Cxyz/", None, ProcessOptions::default(), None)
        .await
        .unwrap();

    let PipelineOutput::Media { items, .. } = output else {
        panic!("expected media output");
    };
    let name = items[0].artifact_path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.ends_with("_compressed.mp4"));
}
