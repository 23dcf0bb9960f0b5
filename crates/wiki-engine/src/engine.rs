use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use wiki_content::{ContentManager, ContentOptions, LinkIndex, WikiPage};
use wiki_diff::LineDiffProvider;
use wiki_events::EventBus;
use wiki_lock::{LockConfig, LockManager, PageLock};
use wiki_resolver::{EnglishPluralResolver, ResolverChain, SpecialNameResolver};
use wiki_store::{ContentBackend, FileBackend, InMemoryBackend};
use wiki_types::{keys as attr, PageVersion, WikiPath, WIKI_MARKUP};
use wiki_workflow::{keys, Task, Workflow, WorkflowId, WorkflowManager, WorkflowOutcome, WorkflowSummary};

use crate::config::{BackendConfig, EngineConfig};
use crate::error::{EngineError, EngineResult};
use crate::filter::{FilterManager, PageFilter};
use crate::tasks::{PreSaveTask, SaveTask, Services, SAVE_WORKFLOW};

/// Pending approvals of a file-backed engine live here, under the backend
/// root. The name must not end in `.json`; those files are pages.
const QUEUE_FILE: &str = "approvals.queue";

/// The user on whose behalf an operation runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub name: String,
    pub authenticated: bool,
}

impl Actor {
    pub fn new(name: impl Into<String>, authenticated: bool) -> Self {
        Self {
            name: name.into(),
            authenticated,
        }
    }

    pub fn authenticated(name: impl Into<String>) -> Self {
        Self::new(name, true)
    }

    pub fn anonymous(name: impl Into<String>) -> Self {
        Self::new(name, false)
    }
}

/// What a save did, short of needing approval.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The text equals the stored text; nothing was written.
    Unchanged,
    /// Blank text for a page that does not exist, with empty pages disabled.
    EmptyPageSkipped,
    /// Stored as the given version.
    Saved(u32),
}

/// The assembled wiki content engine.
///
/// Owns the content manager, lock manager, name resolvers, page filters,
/// and the approval queue, all configured from one [`EngineConfig`]. Page
/// operations run in the calling thread's session; call
/// [`release_session`](Self::release_session) when a request is done.
pub struct WikiEngine {
    config: EngineConfig,
    services: Services,
    events: Arc<EventBus>,
    references: Arc<LinkIndex>,
    locks: LockManager,
    names: ResolverChain,
    workflows: WorkflowManager<Services>,
    queue_file: Option<PathBuf>,
}

impl WikiEngine {
    /// Build an engine on the backend named in `config`.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        match config.backend.clone() {
            BackendConfig::Memory => Self::assemble(config, Arc::new(InMemoryBackend::new()), None),
            BackendConfig::File { root } => {
                let backend = FileBackend::open(&root, &config.default_space)?;
                Self::assemble(config, Arc::new(backend), Some(root.join(QUEUE_FILE)))
            }
        }
    }

    /// Build an engine on a caller-supplied backend. The `backend` setting
    /// of `config` is ignored and pending approvals are not persisted.
    pub fn with_backend(config: EngineConfig, backend: Arc<dyn ContentBackend>) -> EngineResult<Self> {
        config.validate()?;
        Self::assemble(config, backend, None)
    }

    fn assemble(
        config: EngineConfig,
        backend: Arc<dyn ContentBackend>,
        queue_file: Option<PathBuf>,
    ) -> EngineResult<Self> {
        let events = Arc::new(EventBus::new());
        let references = Arc::new(LinkIndex::new(config.camel_case_links));
        let content = ContentManager::new(
            backend,
            Arc::clone(&events),
            references.clone(),
            ContentOptions {
                default_space: config.default_space.clone(),
                camel_case_links: config.camel_case_links,
            },
        );

        let locks = LockManager::new(LockConfig {
            expiry: chrono::Duration::minutes(i64::from(config.lock_expiry_minutes)),
            reaper_interval: Duration::from_secs(config.reaper_interval_secs),
        })
        .with_events(Arc::clone(&events));

        let mut specials = SpecialNameResolver::new();
        for (name, target) in &config.special_pages {
            let target = WikiPath::parse_in(target, &config.default_space)
                .map_err(|e| EngineError::Config(format!("special page {name}: {e}")))?;
            specials.insert(name, target);
        }
        let mut names = ResolverChain::new();
        names.push(specials);
        if config.match_plurals {
            names.push(EnglishPluralResolver);
        }

        let engine = Self {
            config,
            services: Services {
                content,
                filters: FilterManager::new(),
                differ: Box::new(LineDiffProvider),
            },
            events,
            references,
            locks,
            names,
            workflows: WorkflowManager::new(),
            queue_file,
        };
        engine.restore_queue()?;

        let session = engine.services.content.sessions().current();
        let indexed = engine.services.content.rebuild_references(&session)?;
        engine.release_session();
        info!(pages = indexed, pending = engine.workflows.pending_count(), "wiki engine ready");
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn content(&self) -> &ContentManager {
        &self.services.content
    }

    /// Subscribe here for save, delete, rename, and lock notifications.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn references(&self) -> &LinkIndex {
        &self.references
    }

    /// Append a page filter. Filters run in the order they were added.
    pub fn add_filter(&mut self, filter: Box<dyn PageFilter>) {
        self.services.filters.add(filter);
    }

    /// Drop the calling thread's session, discarding anything it staged.
    pub fn release_session(&self) {
        self.services.content.sessions().release();
    }

    fn path(&self, name: &str) -> EngineResult<WikiPath> {
        Ok(self.services.content.parse_path(name)?)
    }

    // -----------------------------------------------------------------------
    // Saving
    // -----------------------------------------------------------------------

    /// Save `text` as the new content of the page called `name`.
    ///
    /// Line endings are normalized to `\n`. The actor becomes the author of
    /// the new version. The stored page's other attributes carry over,
    /// minus its change note. When an approver is configured the save is
    /// queued and [`EngineError::DecisionRequired`] is returned.
    pub fn save_text(&self, name: &str, text: &str, actor: &Actor) -> EngineResult<SaveOutcome> {
        let path = self.path(name)?;
        let mut page = match self.stored(&path)? {
            Some(page) => page,
            None => self.services.content.create_page(&path, WIKI_MARKUP)?,
        };
        page.remove_attribute(attr::CHANGENOTE);
        page.set_author(actor.name.as_str());
        self.submit(page, normalize(text), actor)
    }

    /// Save `page` as edited by the caller, attributes and all.
    ///
    /// The page's author is kept if set; otherwise the actor becomes the
    /// author.
    pub fn save_page(&self, page: &WikiPage, actor: &Actor) -> EngineResult<SaveOutcome> {
        self.submit(page.clone(), normalize(page.content()), actor)
    }

    fn submit(&self, page: WikiPage, proposed: String, actor: &Actor) -> EngineResult<SaveOutcome> {
        let path = page.path().clone();
        let current = self.stored(&path)?.map(|p| p.content().to_string());
        match current.as_deref() {
            Some(text) if text == proposed => {
                debug!(%path, "text unchanged, skipping save");
                return Ok(SaveOutcome::Unchanged);
            }
            None if proposed.trim().is_empty() && !self.config.allow_empty_pages => {
                debug!(%path, "not creating an empty page");
                return Ok(SaveOutcome::EmptyPageSkipped);
            }
            _ => {}
        }

        let current = current.unwrap_or_default();
        let workflow = Workflow::new(SAVE_WORKFLOW, path.to_string(), actor.name.as_str())
            .with_approver(self.config.save_approver.clone())
            .fact(keys::PAGE_NAME, path.to_string())
            .fact(keys::CURRENT_TEXT, current.as_str())
            .fact(keys::DIFF_TEXT, self.services.differ.diff(&current, &proposed))
            .fact(keys::IS_AUTHENTICATED, actor.authenticated)
            .prepare(Box::new(PreSaveTask::new(&page, &actor.name, proposed)))
            .commit(Box::new(SaveTask));

        match self.workflows.start(workflow, &self.services) {
            Ok(WorkflowOutcome::Applied(_)) => {
                let version = self.services.content.get_page(
                    &self.services.content.sessions().current(),
                    &path,
                    PageVersion::Latest,
                )?;
                Ok(SaveOutcome::Saved(version.version()))
            }
            Ok(WorkflowOutcome::Pending(id)) => {
                self.persist_queue()?;
                Err(EngineError::DecisionRequired {
                    page: path.to_string(),
                    workflow_id: id,
                })
            }
            Err(e) => {
                self.services.content.sessions().current().rollback();
                Err(e.into())
            }
        }
    }

    /// The saved page at `path`, if any.
    fn stored(&self, path: &WikiPath) -> EngineResult<Option<WikiPage>> {
        let session = self.services.content.sessions().current();
        match self.services.content.get_page(&session, path, PageVersion::Latest) {
            Ok(page) if page.is_new() => Ok(None),
            Ok(page) => Ok(Some(page)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // -----------------------------------------------------------------------
    // Reading and structural changes
    // -----------------------------------------------------------------------

    /// A new, unsaved page. Nothing is stored until it is saved.
    pub fn create_page(&self, name: &str) -> EngineResult<WikiPage> {
        let path = self.path(name)?;
        Ok(self.services.content.create_page(&path, WIKI_MARKUP)?)
    }

    pub fn page_exists(&self, name: &str, version: PageVersion) -> EngineResult<bool> {
        let path = self.path(name)?;
        let session = self.services.content.sessions().current();
        Ok(self.services.content.page_exists(&session, &path, version)?)
    }

    pub fn get_page(&self, name: &str, version: PageVersion) -> EngineResult<WikiPage> {
        let path = self.path(name)?;
        let session = self.services.content.sessions().current();
        Ok(self.services.content.get_page(&session, &path, version)?)
    }

    pub fn get_text(&self, name: &str, version: PageVersion) -> EngineResult<String> {
        Ok(self.get_page(name, version)?.content().to_string())
    }

    /// Retained versions of a page, oldest first, ending with the live one.
    pub fn version_history(&self, name: &str) -> EngineResult<Vec<WikiPage>> {
        let path = self.path(name)?;
        let session = self.services.content.sessions().current();
        Ok(self.services.content.get_version_history(&session, &path)?)
    }

    pub fn delete_page(&self, name: &str) -> EngineResult<bool> {
        let path = self.path(name)?;
        let session = self.services.content.sessions().current();
        Ok(self.services.content.delete_page(&session, &path)?)
    }

    pub fn delete_version(&self, name: &str, version: u32) -> EngineResult<bool> {
        let path = self.path(name)?;
        let session = self.services.content.sessions().current();
        Ok(self.services.content.delete_version(&session, &path, version)?)
    }

    /// Rename a page and rewrite the links pointing at it. Returns the
    /// cleaned new path.
    pub fn rename_page(&self, from: &str, to: &str, actor: &Actor) -> EngineResult<WikiPath> {
        let session = self.services.content.sessions().current();
        Ok(self.services.content.rename_page(&session, from, to, &actor.name)?)
    }

    /// Saved pages in `space`, or in every space.
    pub fn all_pages(&self, space: Option<&str>) -> EngineResult<Vec<WikiPage>> {
        let session = self.services.content.sessions().current();
        Ok(self.services.content.all_pages(&session, space)?)
    }

    pub fn page_count(&self, space: Option<&str>) -> EngineResult<usize> {
        let session = self.services.content.sessions().current();
        Ok(self.services.content.total_page_count(&session, space)?)
    }

    /// The page a request for `name` should show: the page itself if it
    /// exists, otherwise the first alternate the name resolvers accept.
    pub fn final_page_name(&self, name: &str) -> EngineResult<Option<WikiPath>> {
        let path = self.path(name)?;
        let session = self.services.content.sessions().current();
        let content = &self.services.content;
        if content.page_exists(&session, &path, PageVersion::Latest)? {
            return Ok(Some(path));
        }
        Ok(self
            .names
            .resolve(&path, |candidate| content.page_exists(&session, candidate, PageVersion::Latest))?)
    }

    // -----------------------------------------------------------------------
    // Locks
    // -----------------------------------------------------------------------

    /// Lock a page for editing. `None` if someone already holds a lock.
    pub fn lock_page(&self, name: &str, user: &str) -> EngineResult<Option<PageLock>> {
        let path = self.path(name)?;
        Ok(self.locks.lock_page(&path, user))
    }

    pub fn unlock_page(&self, lock: Option<&PageLock>) {
        self.locks.unlock_page(lock);
    }

    pub fn current_lock(&self, name: &str) -> EngineResult<Option<PageLock>> {
        let path = self.path(name)?;
        Ok(self.locks.current_lock(&path))
    }

    pub fn active_locks(&self) -> Vec<PageLock> {
        self.locks.active_locks()
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    // -----------------------------------------------------------------------
    // Approvals
    // -----------------------------------------------------------------------

    /// Saves awaiting a decision, oldest first.
    pub fn pending_approvals(&self) -> Vec<WorkflowSummary> {
        self.workflows.pending()
    }

    pub fn pending_for(&self, approver: &str) -> Vec<WorkflowSummary> {
        self.workflows.pending_for(approver)
    }

    /// The workflow with `id`, pending or finished.
    pub fn workflow(&self, id: WorkflowId) -> Option<WorkflowSummary> {
        self.workflows.get(id)
    }

    /// Approve a pending save and apply it.
    pub fn approve(&self, id: WorkflowId, actor: &Actor) -> EngineResult<WorkflowSummary> {
        let result = self.workflows.approve(id, &actor.name, &self.services);
        if result.is_err() {
            self.services.content.sessions().current().rollback();
        }
        self.persist_queue()?;
        Ok(result?)
    }

    /// Reject a pending save. The page is left as it was.
    pub fn reject(&self, id: WorkflowId, actor: &Actor, reason: &str) -> EngineResult<WorkflowSummary> {
        let summary = self.workflows.reject(id, &actor.name, reason)?;
        self.persist_queue()?;
        Ok(summary)
    }

    fn persist_queue(&self) -> EngineResult<()> {
        let Some(file) = &self.queue_file else {
            return Ok(());
        };
        let pending = self.workflows.pending();
        write_atomically(file, &serde_json::to_vec_pretty(&pending)?)?;
        debug!(file = %file.display(), pending = pending.len(), "persisted approval queue");
        Ok(())
    }

    fn restore_queue(&self) -> EngineResult<()> {
        let Some(file) = &self.queue_file else {
            return Ok(());
        };
        if !file.exists() {
            return Ok(());
        }
        let pending: Vec<WorkflowSummary> = serde_json::from_slice(&fs::read(file)?)?;
        let count = pending.len();
        for summary in pending {
            let commit: Vec<Box<dyn Task<Services>>> = vec![Box::new(SaveTask)];
            self.workflows.restore(summary, commit)?;
        }
        info!(file = %file.display(), count, "restored approval queue");
        Ok(())
    }
}

impl std::fmt::Debug for WikiEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WikiEngine")
            .field("backend", &self.config.backend)
            .field("filters", &self.services.filters.len())
            .field("locks", &self.locks.active_locks().len())
            .field("pending", &self.workflows.pending_count())
            .finish()
    }
}

/// CRLF and lone CR become LF.
fn normalize(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn write_atomically(path: &Path, bytes: &[u8]) -> EngineResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| std::io::Error::other("queue file has no parent directory"))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use wiki_workflow::WorkflowState;

    use crate::filter::FilterError;

    fn engine() -> WikiEngine {
        WikiEngine::new(EngineConfig::default()).unwrap()
    }

    fn approving() -> WikiEngine {
        WikiEngine::new(EngineConfig::with_approver("admin")).unwrap()
    }

    fn alice() -> Actor {
        Actor::authenticated("alice")
    }

    fn admin() -> Actor {
        Actor::authenticated("admin")
    }

    fn pending_id(err: EngineError) -> WorkflowId {
        match err {
            EngineError::DecisionRequired { workflow_id, .. } => workflow_id,
            other => panic!("expected DecisionRequired, got {other}"),
        }
    }

    struct Veto;

    impl PageFilter for Veto {
        fn name(&self) -> &str {
            "veto"
        }

        fn pre_save(&self, _path: &WikiPath, text: &str) -> Result<String, FilterError> {
            if text.contains("spam") {
                return Err(FilterError::new("spam detected"));
            }
            Ok(text.replace("teh", "the"))
        }
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl PageFilter for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn post_save(&self, path: &WikiPath, text: &str) -> Result<(), FilterError> {
            self.0.lock().unwrap().push(format!("{path}={text}"));
            Ok(())
        }
    }

    // -----------------------------------------------------------------------
    // 1. Versioning
    // -----------------------------------------------------------------------

    #[test]
    fn save_bumps_version_and_keeps_history() {
        let engine = engine();
        assert_eq!(engine.save_text("Foo", "v1", &alice()).unwrap(), SaveOutcome::Saved(1));
        assert_eq!(engine.save_text("Foo", "v2", &alice()).unwrap(), SaveOutcome::Saved(2));

        let history = engine.version_history("Foo").unwrap();
        let versions: Vec<(u32, &str)> = history.iter().map(|p| (p.version(), p.content())).collect();
        assert_eq!(versions, vec![(1, "v1"), (2, "v2")]);
        assert_eq!(engine.get_text("Foo", PageVersion::Exact(1)).unwrap(), "v1");
        assert_eq!(engine.get_page("Foo", PageVersion::Latest).unwrap().author(), Some("alice"));
    }

    #[test]
    fn each_save_is_credited_to_its_actor() {
        let engine = engine();
        engine.save_text("Foo", "v1", &alice()).unwrap();
        engine.save_text("Foo", "v2", &Actor::authenticated("bob")).unwrap();

        assert_eq!(engine.get_page("Foo", PageVersion::Exact(1)).unwrap().author(), Some("alice"));
        assert_eq!(engine.get_page("Foo", PageVersion::Latest).unwrap().author(), Some("bob"));
    }

    #[test]
    fn identical_text_is_a_no_op() {
        let engine = engine();
        engine.save_text("Foo", "line one\r\nline two", &alice()).unwrap();
        assert_eq!(engine.get_text("Foo", PageVersion::Latest).unwrap(), "line one\nline two");

        let outcome = engine.save_text("Foo", "line one\nline two", &alice()).unwrap();
        assert_eq!(outcome, SaveOutcome::Unchanged);
        assert_eq!(engine.get_page("Foo", PageVersion::Latest).unwrap().version(), 1);
    }

    #[test]
    fn empty_new_page_is_not_created() {
        let engine = engine();
        assert_eq!(engine.save_text("Foo", "  \n", &alice()).unwrap(), SaveOutcome::EmptyPageSkipped);
        assert!(!engine.page_exists("Foo", PageVersion::Latest).unwrap());

        let mut config = EngineConfig::default();
        config.allow_empty_pages = true;
        let engine = WikiEngine::new(config).unwrap();
        assert_eq!(engine.save_text("Foo", "", &alice()).unwrap(), SaveOutcome::Saved(1));
        assert!(engine.page_exists("Foo", PageVersion::Latest).unwrap());
    }

    #[test]
    fn delete_version_leaves_only_current() {
        let engine = engine();
        engine.save_text("Foo", "v1", &alice()).unwrap();
        engine.save_text("Foo", "v2", &alice()).unwrap();
        assert!(engine.delete_version("Foo", 1).unwrap());

        let history = engine.version_history("Foo").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content(), "v2");
        let err = engine.get_page("Foo", PageVersion::Exact(1)).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn change_note_does_not_carry_over() {
        let engine = engine();
        engine.save_text("Foo", "v1", &alice()).unwrap();
        let mut page = engine.get_page("Foo", PageVersion::Latest).unwrap();
        page.set_content("v2");
        page.set_attribute(attr::CHANGENOTE, "typo");
        engine.save_page(&page, &alice()).unwrap();
        assert_eq!(engine.get_page("Foo", PageVersion::Latest).unwrap().change_note(), Some("typo"));

        engine.save_text("Foo", "v3", &alice()).unwrap();
        assert_eq!(engine.get_page("Foo", PageVersion::Latest).unwrap().change_note(), None);
    }

    // -----------------------------------------------------------------------
    // 2. Delete and rename
    // -----------------------------------------------------------------------

    #[test]
    fn delete_then_recreate() {
        let engine = engine();
        engine.save_text("Foo", "v1", &alice()).unwrap();
        assert!(engine.delete_page("Foo").unwrap());
        assert!(!engine.page_exists("Foo", PageVersion::Latest).unwrap());
        assert!(!engine.delete_page("Foo").unwrap());

        assert_eq!(engine.save_text("Foo", "again", &alice()).unwrap(), SaveOutcome::Saved(1));
        assert_eq!(engine.page_count(None).unwrap(), 1);
    }

    #[test]
    fn rename_rewrites_referrers() {
        let engine = engine();
        engine.save_text("TestPage", "the page", &alice()).unwrap();
        engine.save_text("TestPage2", "[TestPage] [linktext|TestPage]", &alice()).unwrap();

        let renamed = engine.rename_page("TestPage", "FooTest", &alice()).unwrap();
        assert_eq!(renamed.to_string(), "Main:FooTest");
        assert!(!engine.page_exists("TestPage", PageVersion::Latest).unwrap());
        assert!(engine.page_exists("FooTest", PageVersion::Latest).unwrap());
        assert_eq!(
            engine.get_text("TestPage2", PageVersion::Latest).unwrap(),
            "[FooTest] [linktext|FooTest]"
        );
    }

    // -----------------------------------------------------------------------
    // 3. Approval
    // -----------------------------------------------------------------------

    #[test]
    fn approved_save_takes_effect() {
        let engine = approving();
        let id = pending_id(engine.save_text("Foo", "v1", &alice()).unwrap_err());
        assert!(!engine.page_exists("Foo", PageVersion::Latest).unwrap());

        let pending = engine.pending_for("admin");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].subject, "Main:Foo");
        assert_eq!(pending[0].facts.get_str(keys::PROPOSED_TEXT), Some("v1"));
        assert!(pending[0].facts.get_str(keys::DIFF_TEXT).is_some_and(|d| d.contains("+v1")));

        engine.approve(id, &admin()).unwrap();
        let page = engine.get_page("Foo", PageVersion::Latest).unwrap();
        assert_eq!(page.content(), "v1");
        assert_eq!(page.author(), Some("alice"));
        assert_eq!(page.attribute(attr::APPROVED_BY), Some(&serde_json::json!("admin")));
        assert!(engine.pending_approvals().is_empty());
    }

    #[test]
    fn rejected_save_leaves_page_unchanged() {
        let engine = approving();
        let first = pending_id(engine.save_text("Foo", "v1", &alice()).unwrap_err());
        engine.approve(first, &admin()).unwrap();

        let second = pending_id(engine.save_text("Foo", "v2", &alice()).unwrap_err());
        let summary = engine.reject(second, &admin(), "needs sources").unwrap();
        assert_eq!(summary.reason.as_deref(), Some("needs sources"));
        assert_eq!(engine.get_text("Foo", PageVersion::Latest).unwrap(), "v1");
        assert_eq!(engine.get_page("Foo", PageVersion::Latest).unwrap().version(), 1);
    }

    #[test]
    fn one_pending_save_per_page() {
        let engine = approving();
        engine.save_text("Foo", "v1", &alice()).unwrap_err();
        let err = engine.save_text("Foo", "v2", &alice()).unwrap_err();
        assert!(err.is_already_pending());
        assert!(engine.save_text("Bar", "b", &alice()).unwrap_err().is_decision_required());
        assert_eq!(engine.pending_approvals().len(), 2);
    }

    // -----------------------------------------------------------------------
    // 4. Filters and ACL markup
    // -----------------------------------------------------------------------

    #[test]
    fn filter_veto_stores_nothing() {
        let mut engine = engine();
        engine.add_filter(Box::new(Veto));
        let err = engine.save_text("Foo", "buy spam", &alice()).unwrap_err();
        assert!(matches!(err, EngineError::FilterRejected { ref filter, .. } if filter == "veto"));
        assert!(!engine.page_exists("Foo", PageVersion::Latest).unwrap());

        engine.save_text("Foo", "teh end", &alice()).unwrap();
        assert_eq!(engine.get_text("Foo", PageVersion::Latest).unwrap(), "the end");
    }

    #[test]
    fn post_save_filters_see_stored_text() {
        let mut engine = engine();
        let recorder = Recorder::default();
        engine.add_filter(Box::new(Veto));
        engine.add_filter(Box::new(recorder.clone()));
        engine.save_text("Foo", "teh one", &alice()).unwrap();
        assert_eq!(*recorder.0.lock().unwrap(), vec!["Main:Foo=the one".to_string()]);
    }

    struct BrokenNotifier;

    impl PageFilter for BrokenNotifier {
        fn name(&self) -> &str {
            "notifier"
        }

        fn post_save(&self, _path: &WikiPath, _text: &str) -> Result<(), FilterError> {
            Err(FilterError::new("mail server down"))
        }
    }

    #[test]
    fn failed_post_save_filter_keeps_the_version() {
        let mut engine = engine();
        engine.add_filter(Box::new(BrokenNotifier));
        assert_eq!(engine.save_text("Foo", "v1", &alice()).unwrap(), SaveOutcome::Saved(1));
        assert_eq!(engine.get_text("Foo", PageVersion::Latest).unwrap(), "v1");

        let finished = engine.workflows.finished();
        let summary = finished.last().unwrap();
        assert_eq!(summary.state, WorkflowState::Applied);
        assert!(summary.reason.as_deref().is_some_and(|r| r.contains("mail server down")));
    }

    #[test]
    fn acl_markup_is_stored_with_the_version() {
        let engine = engine();
        engine.save_text("Secret", "[{ALLOW edit Admin}]\nhush", &alice()).unwrap();
        let page = engine.get_page("Secret", PageVersion::Latest).unwrap();
        assert_eq!(page.version(), 1);
        assert!(page.acl().entry("Admin").is_some());

        engine.save_text("Secret", "open now", &alice()).unwrap();
        let page = engine.get_page("Secret", PageVersion::Latest).unwrap();
        assert!(page.acl().entry("Admin").is_some());
    }

    // -----------------------------------------------------------------------
    // 5. Name resolution and locks
    // -----------------------------------------------------------------------

    #[test]
    fn final_page_name_tries_alternates() {
        let mut config = EngineConfig::default();
        config.match_plurals = true;
        let engine = WikiEngine::new(config).unwrap();
        engine.save_text("Dog", "woof", &alice()).unwrap();

        let dog = WikiPath::parse("Main:Dog").unwrap();
        assert_eq!(engine.final_page_name("Dog").unwrap(), Some(dog.clone()));
        assert_eq!(engine.final_page_name("Dogs").unwrap(), Some(dog));
        assert_eq!(
            engine.final_page_name("RecentChanges").unwrap(),
            Some(WikiPath::parse("System:RecentChanges").unwrap())
        );
        assert_eq!(engine.final_page_name("Cats").unwrap(), None);
    }

    #[test]
    fn lock_round_trip() {
        let engine = engine();
        let lock = engine.lock_page("Foo", "alice").unwrap();
        assert!(lock.is_some());
        assert!(engine.lock_page("Foo", "bob").unwrap().is_none());
        assert_eq!(engine.current_lock("Foo").unwrap().unwrap().locker(), "alice");

        engine.unlock_page(lock.as_ref());
        assert!(engine.current_lock("Foo").unwrap().is_none());
        assert!(engine.lock_page("Foo", "bob").unwrap().is_some());
        assert_eq!(engine.active_locks().len(), 1);
    }

    // -----------------------------------------------------------------------
    // 6. File backend
    // -----------------------------------------------------------------------

    #[test]
    fn file_backend_keeps_pages_and_pending_approvals() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::with_approver("admin");
        config.backend = BackendConfig::File {
            root: dir.path().to_path_buf(),
        };

        {
            let engine = WikiEngine::new(config.clone()).unwrap();
            let id = pending_id(engine.save_text("Foo", "v1", &alice()).unwrap_err());
            engine.approve(id, &admin()).unwrap();
            engine.save_text("Bar", "waiting", &alice()).unwrap_err();
            engine.release_session();
        }
        assert!(dir.path().join(QUEUE_FILE).exists());

        let engine = WikiEngine::new(config).unwrap();
        assert_eq!(engine.get_text("Foo", PageVersion::Latest).unwrap(), "v1");
        let pending = engine.pending_approvals();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].subject, "Main:Bar");

        engine.approve(pending[0].id, &admin()).unwrap();
        assert_eq!(engine.get_text("Bar", PageVersion::Latest).unwrap(), "waiting");
        assert_eq!(engine.page_count(Some("Main")).unwrap(), 2);
    }
}
