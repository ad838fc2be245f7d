#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use vola::application::containers::{ContainerService, NewGroupInput};
use vola::application::editing::{PluginEdit, PluginEditService};
use vola::application::events::{ContainerEvent, ContainerEventKind, ContainerListener, EventBus};
use vola::application::fragments::FragmentService;
use vola::application::permissions::{Actor, RowPermissionAuthority};
use vola::application::preview::PreviewService;
use vola::application::registry::PluginRegistry;
use vola::application::resolver::PluginResolver;
use vola::cache::{CacheConfig, DependencyRegistry, FragmentCache, InvalidationTrigger, MemoryStore};
use vola::domain::entities::{ContainerRecord, GroupRecord};
use vola::infra::memory::MemoryContentRepo;
use vola::plugins;

/// Every service wired over one in-memory repository and fragment cache.
pub struct Harness {
    pub repo: Arc<MemoryContentRepo>,
    pub registry: Arc<PluginRegistry>,
    pub cache: Arc<FragmentCache>,
    pub trigger: Arc<InvalidationTrigger>,
    pub events: Arc<EventBus>,
    pub recorder: Arc<EventRecorder>,
    pub containers: ContainerService,
    pub edits: PluginEditService,
    pub previews: PreviewService,
    pub fragments: FragmentService,
}

impl Harness {
    pub fn new() -> Self {
        let repo = Arc::new(MemoryContentRepo::new());
        let registry = Arc::new(plugins::builtin().build());
        let config = CacheConfig::default();
        let cache = Arc::new(FragmentCache::new(
            Arc::new(MemoryStore::from_config(&config)),
            config,
        ));
        let trigger = Arc::new(InvalidationTrigger::new(
            Arc::clone(&cache),
            Arc::new(DependencyRegistry::new()),
        ));
        let authority = Arc::new(RowPermissionAuthority::new(repo.clone()));
        let events = Arc::new(EventBus::new());
        let recorder = Arc::new(EventRecorder::default());
        events.subscribe(recorder.clone());

        let containers =
            ContainerService::new(repo.clone(), authority.clone(), Arc::clone(&trigger));
        let edits = PluginEditService::new(
            repo.clone(),
            Arc::clone(&registry),
            authority.clone(),
            plugins::builtin_validators(),
            Arc::clone(&trigger),
        );
        let previews = PreviewService::new(
            repo.clone(),
            authority,
            Arc::clone(&events),
            Arc::clone(&trigger),
        );
        let fragments = FragmentService::new(
            PluginResolver::new(repo.clone(), Arc::clone(&registry)),
            Arc::clone(&cache),
        );

        Self {
            repo,
            registry,
            cache,
            trigger,
            events,
            recorder,
            containers,
            edits,
            previews,
            fragments,
        }
    }

    /// A container named `name` holding one group named `group`.
    pub async fn container_with_group(
        &self,
        name: &str,
        group: NewGroupInput,
    ) -> (ContainerRecord, GroupRecord) {
        let container = self
            .containers
            .create_container(name, None, None)
            .await
            .expect("create container");
        let group = self
            .containers
            .create_group(&admin(), container.id, group)
            .await
            .expect("create group");
        (container, group)
    }

    /// Store snippets with the given slugs, positioned in order.
    pub async fn add_snippets(
        &self,
        container: &ContainerRecord,
        group: &GroupRecord,
        language: Option<&str>,
        slugs: &[&str],
    ) {
        let edits = slugs
            .iter()
            .enumerate()
            .map(|(position, slug)| create_snippet(position as i32, slug, &slug.to_uppercase()))
            .collect();
        self.edits
            .save_group(&admin(), container.id, group.id, language, edits)
            .await
            .expect("save snippets");
    }
}

pub fn admin() -> Actor {
    Actor::superuser(1)
}

pub fn group(name: &str) -> NewGroupInput {
    NewGroupInput {
        name: name.to_string(),
        ..Default::default()
    }
}

pub fn snippet_content(slug: &str, title: &str) -> Value {
    json!({ "slug": slug, "title": title, "body": "" })
}

pub fn create_snippet(position: i32, slug: &str, title: &str) -> PluginEdit {
    PluginEdit::Create {
        app_label: "content".into(),
        model_name: "snippet".into(),
        position,
        content: snippet_content(slug, title),
        lock_content: false,
        lock_position: false,
    }
}

pub fn create_link(position: i32, slug: &str, url: &str) -> PluginEdit {
    PluginEdit::Create {
        app_label: "content".into(),
        model_name: "link".into(),
        position,
        content: json!({ "slug": slug, "label": slug, "url": url }),
        lock_content: false,
        lock_position: false,
    }
}

/// Records the kind and container of every delivered event.
#[derive(Default)]
pub struct EventRecorder {
    seen: Mutex<Vec<(ContainerEventKind, i64)>>,
}

impl EventRecorder {
    pub fn seen(&self) -> Vec<(ContainerEventKind, i64)> {
        self.seen.lock().expect("recorder lock").clone()
    }
}

impl ContainerListener for EventRecorder {
    fn on_event(&self, event: &ContainerEvent) {
        self.seen
            .lock()
            .expect("recorder lock")
            .push((event.kind, event.container.id));
    }
}
