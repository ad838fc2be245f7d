mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::{Harness, admin, group};
use metrics_util::debugging::DebuggingRecorder;
use vola::application::plugin::RenderContext;
use vola::cache::{CacheConfig, CacheKeyDeriver, FragmentCache, KeyRequest, MemoryStore};

#[tokio::test]
async fn cache_and_preview_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    // Hit, miss and eviction through a tiny store.
    let config = CacheConfig {
        capacity: 2,
        ..Default::default()
    };
    let cache = Arc::new(FragmentCache::new(
        Arc::new(MemoryStore::from_config(&config)),
        config,
    ));
    let deriver = CacheKeyDeriver::new(Arc::clone(&cache));
    let key = deriver
        .derive(&KeyRequest::new("volapluginlist", "home", "main"))
        .await
        .expect("derive");
    assert!(cache.get::<Vec<String>>(&key).await.expect("get").is_none());
    cache
        .set(&key, &vec!["<p>one</p>".to_string()], None)
        .await
        .expect("set");
    assert!(cache.get::<Vec<String>>(&key).await.expect("get").is_some());
    for item in ["a", "b", "c"] {
        let other = deriver
            .derive(&KeyRequest::new("volaplugin", "home", "main").with_item(item))
            .await
            .expect("derive");
        cache.set(&other, "fragment", None).await.expect("set");
    }

    // Generation bumps plus clone and transfer latencies.
    let harness = Harness::new();
    let (container, main) = harness.container_with_group("Home", group("Main")).await;
    harness.add_snippets(&container, &main, None, &["a"]).await;
    harness
        .fragments
        .plugin_list(&RenderContext::new(), &container.slug, &main.slug)
        .await
        .expect("list");
    let preview = harness
        .previews
        .create_preview(&admin(), container.id)
        .await
        .expect("preview");
    harness
        .previews
        .transfer_preview(&admin(), preview.id)
        .await
        .expect("transfer");

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "vola_fragment_cache_hit_total",
        "vola_fragment_cache_miss_total",
        "vola_fragment_cache_evict_total",
        "vola_fragment_cache_generation_bump_total",
        "vola_preview_clone_ms",
        "vola_preview_transfer_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
