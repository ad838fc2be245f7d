mod common;

use common::{Harness, admin, create_snippet, group, snippet_content};
use vola::application::editing::PluginEdit;
use vola::application::error::{AppError, ErrorKind};
use vola::application::events::ContainerEventKind;
use vola::application::permissions::{Actor, Capabilities};
use vola::application::plugin::RenderContext;
use vola::application::repos::{ContentRepo, ContentTx, GroupSelector, NewPlugin};
use vola::cache::GenerationScope;
use vola::domain::entities::{ContainerRecord, StoredPlugin};
use vola::domain::types::Grantee;

fn slugs(plugins: &[StoredPlugin]) -> Vec<&str> {
    plugins
        .iter()
        .map(|plugin| plugin.content["slug"].as_str().unwrap_or_default())
        .collect()
}

async fn add_ungrouped(harness: &Harness, container: &ContainerRecord, slug: &str) {
    let mut tx = harness.repo.begin().await.expect("begin");
    tx.insert_plugin(NewPlugin {
        container_id: container.id,
        group_id: None,
        language_id: None,
        app_label: "content".into(),
        model_name: "snippet".into(),
        lock_content: false,
        lock_position: false,
        position: 0,
        content: snippet_content(slug, "Loose"),
    })
    .await
    .expect("ungrouped plugin");
    tx.commit().await.expect("commit");
}

async fn ungrouped(harness: &Harness, container_id: i64) -> Vec<StoredPlugin> {
    let mut tx = harness.repo.begin().await.expect("begin");
    let plugins = tx
        .list_plugins(container_id, GroupSelector::Ungrouped)
        .await
        .expect("ungrouped plugins");
    tx.rollback().await.expect("rollback");
    plugins
}

#[tokio::test]
async fn preview_is_a_full_copy_of_the_container() {
    let harness = Harness::new();
    let (container, main) = harness.container_with_group("Home", group("Main")).await;
    harness
        .add_snippets(&container, &main, None, &["intro", "body"])
        .await;
    harness
        .containers
        .grant(
            &admin(),
            container.id,
            Grantee::UserGroup(7),
            Capabilities::ALL,
        )
        .await
        .expect("grant");

    let preview = harness
        .previews
        .create_preview(&admin(), container.id)
        .await
        .expect("create preview");

    assert!(preview.is_preview);
    assert_eq!(preview.transfer_target_id, Some(container.id));
    assert!(preview.slug.starts_with("home_"));
    assert!(preview.slug.ends_with(&format!("_{}", preview.id)));
    assert_eq!(preview.cache_key, preview.slug);
    assert_eq!(preview.name, format!("Home ({})", preview.id));

    let groups = harness.repo.list_groups(preview.id).await.expect("groups");
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].slug, main.slug);
    assert_ne!(groups[0].id, main.id);

    let copied = harness
        .repo
        .list_group_plugins(groups[0].id, None)
        .await
        .expect("plugins");
    let slugs: Vec<_> = copied
        .iter()
        .map(|plugin| plugin.content["slug"].as_str().unwrap_or_default())
        .collect();
    assert_eq!(slugs, ["intro", "body"]);
    assert!(copied.iter().all(|plugin| plugin.record.container_id == preview.id));

    let permissions = harness
        .repo
        .list_permissions(preview.id)
        .await
        .expect("permissions");
    assert_eq!(permissions.len(), 1);
    assert_eq!(permissions[0].grantee(), Some(Grantee::UserGroup(7)));

    assert_eq!(
        harness.recorder.seen(),
        [
            (ContainerEventKind::PreCreatePreview, container.id),
            (ContainerEventKind::PostCreatePreview, preview.id),
        ]
    );
}

#[tokio::test]
async fn transfer_replaces_production_content_and_removes_the_preview() {
    let harness = Harness::new();
    let (container, main) = harness.container_with_group("Home", group("Main")).await;
    harness.add_snippets(&container, &main, None, &["old"]).await;
    let context = RenderContext::new();
    let cached = harness
        .fragments
        .plugin_list(&context, &container.slug, &main.slug)
        .await
        .expect("prime cache");
    assert_eq!(cached.len(), 1);

    let preview = harness
        .previews
        .create_preview(&admin(), container.id)
        .await
        .expect("create preview");
    let preview_group = harness.repo.list_groups(preview.id).await.expect("groups")[0].clone();
    let stale = harness
        .repo
        .list_group_plugins(preview_group.id, None)
        .await
        .expect("plugins")[0]
        .record
        .id;
    harness
        .edits
        .save_group(
            &admin(),
            preview.id,
            preview_group.id,
            None,
            vec![
                PluginEdit::Delete { id: stale },
                create_snippet(0, "new", "New"),
            ],
        )
        .await
        .expect("edit preview");

    let production = harness
        .previews
        .transfer_preview(&admin(), preview.id)
        .await
        .expect("transfer");

    assert_eq!(production.id, container.id);
    assert_eq!(production.slug, container.slug);
    assert!(!production.is_preview);
    assert!(
        harness
            .repo
            .find_container(preview.id)
            .await
            .expect("lookup")
            .is_none()
    );

    let plugins = harness
        .fragments
        .plugin_list(&context, &container.slug, &main.slug)
        .await
        .expect("plugin list");
    let slugs: Vec<_> = plugins
        .iter()
        .map(|plugin| plugin.content["slug"].as_str().unwrap_or_default())
        .collect();
    assert_eq!(slugs, ["new"]);

    let seen = harness.recorder.seen();
    assert_eq!(
        &seen[2..],
        [
            (ContainerEventKind::PreTransferPreview, preview.id),
            (ContainerEventKind::PostTransferPreview, container.id),
        ]
    );
}

#[tokio::test]
async fn failed_clone_leaves_no_partial_preview() {
    let harness = Harness::new();
    let (container, main) = harness.container_with_group("Home", group("Main")).await;
    harness
        .add_snippets(&container, &main, None, &["one", "two", "three"])
        .await;
    let containers_before = harness.repo.container_count();
    let plugins_before = harness.repo.plugin_count();

    harness.repo.fail_plugin_inserts_after(1);
    let err = harness
        .previews
        .create_preview(&admin(), container.id)
        .await
        .expect_err("injected failure");
    harness.repo.clear_faults();

    assert_eq!(err.kind(), ErrorKind::Transaction);
    assert_eq!(harness.repo.container_count(), containers_before);
    assert_eq!(harness.repo.plugin_count(), plugins_before);
    assert_eq!(
        harness.recorder.seen(),
        [(ContainerEventKind::PreCreatePreview, container.id)]
    );
}

#[tokio::test]
async fn failed_transfer_keeps_production_and_preview() {
    let harness = Harness::new();
    let (container, main) = harness.container_with_group("Home", group("Main")).await;
    harness.add_snippets(&container, &main, None, &["a", "b"]).await;
    let preview = harness
        .previews
        .create_preview(&admin(), container.id)
        .await
        .expect("create preview");
    let plugins_before = harness.repo.plugin_count();

    harness.repo.fail_plugin_inserts_after(1);
    let err = harness
        .previews
        .transfer_preview(&admin(), preview.id)
        .await
        .expect_err("injected failure");
    harness.repo.clear_faults();

    assert!(matches!(err, AppError::Transaction(_)));
    assert_eq!(harness.repo.plugin_count(), plugins_before);
    assert!(
        harness
            .repo
            .find_container(preview.id)
            .await
            .expect("lookup")
            .is_some()
    );
    let production = harness
        .repo
        .list_group_plugins(main.id, None)
        .await
        .expect("plugins");
    assert_eq!(production.len(), 2);
}

#[tokio::test]
async fn preview_operations_require_manage_preview() {
    let harness = Harness::new();
    let (container, _) = harness.container_with_group("Home", group("Main")).await;
    let editor = Actor::editor(42, vec![9]);

    let err = harness
        .previews
        .create_preview(&editor, container.id)
        .await
        .expect_err("no permission rows");
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert!(harness.recorder.seen().is_empty());

    harness
        .containers
        .grant(
            &admin(),
            container.id,
            Grantee::UserGroup(9),
            Capabilities {
                manage_preview: true,
                ..Default::default()
            },
        )
        .await
        .expect("grant");

    let preview = harness
        .previews
        .create_preview(&editor, container.id)
        .await
        .expect("granted through user group");
    harness
        .previews
        .transfer_preview(&editor, preview.id)
        .await
        .expect("transfer with copied permissions");
}

#[tokio::test]
async fn transferring_a_production_container_is_not_found() {
    let harness = Harness::new();
    let (container, _) = harness.container_with_group("Home", group("Main")).await;

    let err = harness
        .previews
        .transfer_preview(&admin(), container.id)
        .await
        .expect_err("not a preview");
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = harness
        .previews
        .create_preview(&admin(), 9_999)
        .await
        .expect_err("missing container");
    assert!(matches!(err, AppError::NotFound { entity: "container", .. }));
}

#[tokio::test]
async fn clone_points_each_plugin_at_its_own_group_copy() {
    let harness = Harness::new();
    let (container, main) = harness.container_with_group("Home", group("Main")).await;
    let aside = harness
        .containers
        .create_group(&admin(), container.id, group("Aside"))
        .await
        .expect("aside");
    harness.add_snippets(&container, &main, None, &["m0", "m1"]).await;
    harness
        .add_snippets(&container, &aside, None, &["a0", "a1", "a2"])
        .await;
    add_ungrouped(&harness, &container, "loose").await;

    let preview = harness
        .previews
        .create_preview(&admin(), container.id)
        .await
        .expect("create preview");

    let groups = harness.repo.list_groups(preview.id).await.expect("groups");
    let copied: Vec<_> = groups.iter().map(|group| group.slug.as_str()).collect();
    assert_eq!(copied, ["main", "aside"]);
    assert!(groups.iter().all(|group| group.container_id == preview.id));

    let main_copy = harness
        .repo
        .list_group_plugins(groups[0].id, None)
        .await
        .expect("main plugins");
    let aside_copy = harness
        .repo
        .list_group_plugins(groups[1].id, None)
        .await
        .expect("aside plugins");
    assert_eq!(slugs(&main_copy), ["m0", "m1"]);
    assert_eq!(slugs(&aside_copy), ["a0", "a1", "a2"]);
    assert!(main_copy.iter().all(|plugin| plugin.record.group_id == Some(groups[0].id)));
    assert!(aside_copy.iter().all(|plugin| plugin.record.group_id == Some(groups[1].id)));

    assert_eq!(slugs(&ungrouped(&harness, preview.id).await), ["loose"]);
    assert_eq!(harness.repo.plugin_count(), 12);
}

#[tokio::test]
async fn transfer_adds_groups_created_in_the_preview() {
    let harness = Harness::new();
    let (container, main) = harness.container_with_group("Home", group("Main")).await;
    harness.add_snippets(&container, &main, None, &["m0", "m1"]).await;
    add_ungrouped(&harness, &container, "loose").await;
    let preview = harness
        .previews
        .create_preview(&admin(), container.id)
        .await
        .expect("create preview");
    let extra = harness
        .containers
        .create_group(&admin(), preview.id, group("Aside"))
        .await
        .expect("preview group");
    harness.add_snippets(&preview, &extra, None, &["a0"]).await;

    harness
        .previews
        .transfer_preview(&admin(), preview.id)
        .await
        .expect("transfer");

    let groups = harness.repo.list_groups(container.id).await.expect("groups");
    let names: Vec<_> = groups.iter().map(|group| group.slug.as_str()).collect();
    assert_eq!(names, ["main", "aside"]);
    let main_plugins = harness
        .repo
        .list_group_plugins(groups[0].id, None)
        .await
        .expect("main plugins");
    let aside_plugins = harness
        .repo
        .list_group_plugins(groups[1].id, None)
        .await
        .expect("aside plugins");
    assert_eq!(slugs(&main_plugins), ["m0", "m1"]);
    assert_eq!(slugs(&aside_plugins), ["a0"]);
    assert_eq!(slugs(&ungrouped(&harness, container.id).await), ["loose"]);
    assert_eq!(harness.repo.container_count(), 1);
    assert_eq!(harness.repo.plugin_count(), 4);
}

#[tokio::test]
async fn transfer_drops_groups_the_preview_lacks() {
    let harness = Harness::new();
    let (container, main) = harness.container_with_group("Home", group("Main")).await;
    harness.add_snippets(&container, &main, None, &["m0"]).await;
    let preview = harness
        .previews
        .create_preview(&admin(), container.id)
        .await
        .expect("create preview");
    let late = harness
        .containers
        .create_group(&admin(), container.id, group("Late"))
        .await
        .expect("production group");
    harness
        .add_snippets(&container, &late, None, &["l0", "l1"])
        .await;

    harness
        .previews
        .transfer_preview(&admin(), preview.id)
        .await
        .expect("transfer");

    let groups = harness.repo.list_groups(container.id).await.expect("groups");
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].slug, "main");
    let plugins = harness
        .repo
        .list_group_plugins(groups[0].id, None)
        .await
        .expect("plugins");
    assert_eq!(slugs(&plugins), ["m0"]);
    assert_eq!(harness.repo.plugin_count(), 1);
}

#[tokio::test]
async fn deleting_production_removes_nested_previews() {
    let harness = Harness::new();
    let (container, main) = harness.container_with_group("Home", group("Main")).await;
    harness.add_snippets(&container, &main, None, &["a"]).await;
    let first = harness
        .previews
        .create_preview(&admin(), container.id)
        .await
        .expect("first preview");
    let second = harness
        .previews
        .create_preview(&admin(), first.id)
        .await
        .expect("preview of a preview");
    assert_eq!(second.transfer_target_id, Some(first.id));

    let nested_group = harness.repo.list_groups(second.id).await.expect("groups")[0].clone();
    let scope = GenerationScope::new(second.cache_key.clone(), nested_group.cache_key.clone());
    let before = harness.cache.generation(&scope).await.expect("generation");

    harness
        .containers
        .delete_container(&admin(), container.id)
        .await
        .expect("delete");

    for id in [container.id, first.id, second.id] {
        assert!(harness.repo.find_container(id).await.expect("lookup").is_none());
    }
    assert_eq!(harness.repo.container_count(), 0);
    assert_eq!(harness.repo.plugin_count(), 0);
    assert_eq!(
        harness.cache.generation(&scope).await.expect("generation"),
        before + 1
    );
}
