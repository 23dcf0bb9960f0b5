use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use wiki_events::{ContentEvent, EventBus};
use wiki_resolver::{clean_link, PathResolver};
use wiki_store::{ContentBackend, Mutation, NodeRecord, PathRoot, Session, SessionManager};
use wiki_types::{keys, PageVersion, WikiPath, DEFAULT_SPACE};

use crate::error::{ContentError, Result};
use crate::links::rewrite_links;
use crate::page::WikiPage;
use crate::references::ReferenceIndex;

/// Settings the content manager needs from engine configuration.
#[derive(Clone, Debug)]
pub struct ContentOptions {
    /// Space assumed for names without a `Space:` prefix.
    pub default_space: String,
    /// Treat bare CamelCase words as links when rewriting after a rename.
    pub camel_case_links: bool,
}

impl Default for ContentOptions {
    fn default() -> Self {
        Self {
            default_space: DEFAULT_SPACE.to_string(),
            camel_case_links: true,
        }
    }
}

/// Versioned page storage and renaming.
///
/// Every operation runs in the [`Session`] passed by the caller. Writes are
/// staged in that session and committed before the operation returns, so
/// a checkin and the version bump that follows it reach readers together.
///
/// The manager keeps the [`PathResolver`] cache and the [`ReferenceIndex`]
/// current, and publishes a [`ContentEvent`] for every structural change.
pub struct ContentManager {
    sessions: SessionManager,
    resolver: PathResolver,
    events: Arc<EventBus>,
    references: Arc<dyn ReferenceIndex>,
    options: ContentOptions,
}

impl ContentManager {
    pub fn new(
        backend: Arc<dyn ContentBackend>,
        events: Arc<EventBus>,
        references: Arc<dyn ReferenceIndex>,
        options: ContentOptions,
    ) -> Self {
        Self {
            sessions: SessionManager::new(backend),
            resolver: PathResolver::new(),
            events,
            references,
            options,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn references(&self) -> &Arc<dyn ReferenceIndex> {
        &self.references
    }

    pub fn options(&self) -> &ContentOptions {
        &self.options
    }

    /// Parse a user-supplied page name, defaulting the space.
    pub fn parse_path(&self, name: &str) -> Result<WikiPath> {
        Ok(WikiPath::parse_in(name.trim(), &self.options.default_space)?)
    }

    // -----------------------------------------------------------------------
    // Creating pages
    // -----------------------------------------------------------------------

    /// A fresh, unsaved page. Nothing is stored until it is saved.
    pub fn create_page(&self, path: &WikiPath, content_type: &str) -> Result<WikiPage> {
        check_content_type(content_type)?;
        Ok(WikiPage::live(NodeRecord::new(path.clone(), content_type)))
    }

    /// Create a page node at `path`, or reuse one that is already waiting.
    ///
    /// An unsaved node already at `path` is reused; otherwise a staging
    /// placeholder for `path` is promoted so its back-references survive;
    /// otherwise a new node is created. The node is staged in `session` and
    /// becomes visible to others on save. The title is always the path's
    /// leaf name.
    pub fn add_page(&self, session: &Session, path: &WikiPath, content_type: &str) -> Result<WikiPage> {
        check_content_type(content_type)?;
        let page_key = self.resolver.page_key(path);
        let staging_key = self.resolver.staging_key(path);

        let mut record = match session.read(&page_key)? {
            Some(existing) if existing.is_new() => existing,
            Some(_) => return Err(ContentError::AlreadyExists(path.to_string())),
            None => match session.read(&staging_key)? {
                Some(placeholder) => {
                    debug!(%path, "promoting staged placeholder");
                    session.stage(Mutation::Move {
                        from: staging_key,
                        to: page_key.clone(),
                        from_path: path.clone(),
                        to_path: path.clone(),
                    })?;
                    placeholder
                }
                None => NodeRecord::new(path.clone(), content_type),
            },
        };

        record.path = path.clone();
        record.versioned.title = path.name().to_string();
        session.stage(Mutation::PutNode {
            key: page_key,
            record: record.clone(),
        })?;
        self.resolver.invalidate(path);
        Ok(WikiPage::live(record))
    }

    // -----------------------------------------------------------------------
    // Saving
    // -----------------------------------------------------------------------

    /// Persist `page`.
    ///
    /// The first save sets version 1 and the creation time, moving a
    /// waiting staging placeholder into the page tree. Later saves check
    /// the committed version into history and bump the version by one. On
    /// success `page` is updated to what was stored.
    pub fn save(&self, session: &Session, page: &mut WikiPage) -> Result<()> {
        if !page.is_latest() {
            return Err(ContentError::InvalidArgument(format!(
                "{} version {} is a history snapshot and cannot be saved",
                page.path(),
                page.version()
            )));
        }

        let path = page.path().clone();
        let key = self.resolver.page_key(&path);
        let now = Utc::now();
        let mut record = page.record().clone();

        if record.is_new() {
            if session.read_committed(&key)?.is_some_and(|r| !r.is_new()) {
                return Err(ContentError::AlreadyExists(path.to_string()));
            }
            let staging_key = self.resolver.staging_key(&path);
            if let Some(placeholder) = session.read(&staging_key)? {
                debug!(%path, "relocating staged placeholder on first save");
                if session.read(&key)?.is_none() {
                    session.stage(Mutation::Move {
                        from: staging_key,
                        to: key.clone(),
                        from_path: path.clone(),
                        to_path: path.clone(),
                    })?;
                } else {
                    session.stage(Mutation::RemoveNode { key: staging_key })?;
                }
                record.id = placeholder.id;
                record.transient.referred_by.extend(placeholder.transient.referred_by);
            }
            record.versioned.version = PageVersion::FIRST;
            record.versioned.created = Some(now);
            record.versioned.last_modified = Some(now);
        } else {
            let reader = self.sessions.independent();
            let committed = reader
                .read(&key)?
                .ok_or_else(|| ContentError::not_found(&path, PageVersion::Latest))?;
            if committed.version() != record.version() {
                debug!(
                    %path,
                    stored = committed.version(),
                    edited = record.version(),
                    "saving over a newer stored version"
                );
            }
            session.stage(Mutation::PutVersion {
                key: key.clone(),
                properties: committed.versioned.clone(),
            })?;
            record.versioned.version = committed.version() + 1;
            record.versioned.created = committed.versioned.created;
            record.versioned.last_modified = Some(now);
        }

        session.stage(Mutation::PutNode {
            key,
            record: record.clone(),
        })?;
        session.commit()?;
        *page.record_mut() = record;

        self.resolver.invalidate(&path);
        self.references.update(&path, page.content());
        info!(%path, version = page.version(), author = page.author(), "saved page");

        let mut event = ContentEvent::saved(path);
        if let Some(author) = page.author() {
            event = event.with_actor(author);
        }
        self.events.publish(event);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reading
    // -----------------------------------------------------------------------

    /// The page at `path`, at the requested version.
    pub fn get_page(&self, session: &Session, path: &WikiPath, version: PageVersion) -> Result<WikiPage> {
        let key = self.resolver.page_key(path);
        let record = session
            .read(&key)?
            .ok_or_else(|| ContentError::not_found(path, version))?;

        match version.number() {
            None => Ok(WikiPage::live(record)),
            Some(n) if n == record.version() => Ok(WikiPage::live(record)),
            Some(n) => match session.read_version(&key, n)? {
                Some(properties) => Ok(WikiPage::historical(&record, properties)),
                None => Err(ContentError::not_found(path, version)),
            },
        }
    }

    /// Returns `true` if a saved page (at the given version) exists.
    ///
    /// Never-saved nodes and staging placeholders do not count.
    pub fn page_exists(&self, session: &Session, path: &WikiPath, version: PageVersion) -> Result<bool> {
        let key = self.resolver.page_key(path);
        let Some(record) = session.read(&key)? else {
            return Ok(false);
        };
        if record.is_new() {
            return Ok(false);
        }
        match version.number() {
            None => Ok(true),
            Some(n) if n == record.version() => Ok(true),
            Some(n) => Ok(session.read_version(&key, n)?.is_some()),
        }
    }

    /// Every retained version of `path`: history entries oldest first,
    /// followed by the live version.
    pub fn get_version_history(&self, session: &Session, path: &WikiPath) -> Result<Vec<WikiPage>> {
        let key = self.resolver.page_key(path);
        let record = session
            .read(&key)?
            .filter(|r| !r.is_new())
            .ok_or_else(|| ContentError::not_found(path, PageVersion::Latest))?;

        let mut history: Vec<WikiPage> = session
            .list_versions(&key)?
            .into_iter()
            .map(|properties| WikiPage::historical(&record, properties))
            .collect();
        history.push(WikiPage::live(record));
        Ok(history)
    }

    /// Saved pages (not attachments) in `space`, or in every space.
    pub fn all_pages(&self, session: &Session, space: Option<&str>) -> Result<Vec<WikiPage>> {
        let prefix = space.map(|s| format!("{s}/")).unwrap_or_default();
        let mut pages: Vec<WikiPage> = session
            .list(PathRoot::Pages, &prefix)?
            .into_iter()
            .filter(|r| !r.is_new() && !r.path.is_attachment())
            .map(WikiPage::live)
            .collect();
        pages.sort_by(|a, b| a.path().cmp(b.path()));
        Ok(pages)
    }

    pub fn total_page_count(&self, session: &Session, space: Option<&str>) -> Result<usize> {
        Ok(self.all_pages(session, space)?.len())
    }

    // -----------------------------------------------------------------------
    // Deleting
    // -----------------------------------------------------------------------

    /// Delete the page at `path` with its attachments and history.
    ///
    /// If other pages still link here, a staging placeholder keeping the
    /// title, content type, identity, and referrer list is left behind so
    /// a later [`add_page`](Self::add_page) can pick it up. Links from the
    /// page to itself do not count. Returns `false` if there was no page.
    pub fn delete_page(&self, session: &Session, path: &WikiPath) -> Result<bool> {
        let key = self.resolver.page_key(path);
        let Some(record) = session.read(&key)? else {
            return Ok(false);
        };
        self.events.publish(ContentEvent::delete_requested(path.clone()));

        let referrers: BTreeSet<WikiPath> = self
            .references
            .referred_by(path)
            .into_iter()
            .filter(|r| !r.is_within(path))
            .collect();

        session.stage(Mutation::RemoveNode { key })?;
        if referrers.is_empty() {
            session.commit()?;
            info!(%path, "deleted page");
        } else {
            let staging_key = self.resolver.staging_key(path);
            let count = referrers.len();
            let mut placeholder = record.into_placeholder();
            placeholder.transient.referred_by = referrers;
            session.stage(Mutation::RemoveNode {
                key: staging_key.clone(),
            })?;
            session.stage(Mutation::PutNode {
                key: staging_key,
                record: placeholder,
            })?;
            session.commit()?;
            warn!(%path, referrers = count, "page is still linked; demoted to staging");
        }

        self.resolver.invalidate(path);
        self.references.remove(path);
        self.events.publish(ContentEvent::deleted(path.clone()));
        Ok(true)
    }

    /// Delete one version of `path`.
    ///
    /// Deleting the live version restores the newest older version into the
    /// live slot, or deletes the whole page if there is none. Deleting a
    /// history entry just drops it. Returns `false` if the page or version
    /// did not exist.
    pub fn delete_version(&self, session: &Session, path: &WikiPath, version: u32) -> Result<bool> {
        let key = self.resolver.page_key(path);
        let Some(record) = session.read(&key)? else {
            return Ok(false);
        };

        if version == record.version() {
            let predecessor = session
                .list_versions(&key)?
                .into_iter()
                .filter(|v| v.version < version)
                .max_by_key(|v| v.version);
            let Some(previous) = predecessor else {
                return self.delete_page(session, path);
            };

            let restored_version = previous.version;
            let mut restored = record;
            session.stage(Mutation::RemoveVersion {
                key: key.clone(),
                version: previous.version,
            })?;
            restored.versioned = previous;
            let content = restored.versioned.content.clone();
            session.stage(Mutation::PutNode { key, record: restored })?;
            session.commit()?;
            self.references.update(path, &content);
            info!(%path, version, restored = restored_version, "deleted live version");
        } else {
            if session.read_version(&key, version)?.is_none() {
                return Ok(false);
            }
            session.stage(Mutation::RemoveVersion { key, version })?;
            session.commit()?;
            info!(%path, version, "deleted history version");
        }

        self.events.publish(ContentEvent::saved(path.clone()));
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Renaming
    // -----------------------------------------------------------------------

    /// Rename page `from` to `to`, carrying attachments and history along.
    ///
    /// `to` is cleaned with [`clean_link`] and placed in the space of
    /// `from`. After the move, the page records a change note, `author`, and
    /// its new title, and every page that linked to `from` or one of its
    /// attachments has its links rewritten. Referrer rewriting is not atomic
    /// across pages. Returns the new path.
    pub fn rename_page(&self, session: &Session, from: &str, to: &str, author: &str) -> Result<WikiPath> {
        let from = from.trim();
        let to = to.trim();
        if from.is_empty() {
            return Err(ContentError::InvalidArgument("rename source must not be empty".into()));
        }
        if to.is_empty() {
            return Err(ContentError::InvalidArgument("rename target must not be empty".into()));
        }
        let clean = clean_link(to);
        if clean.is_empty() {
            return Err(ContentError::InvalidArgument(format!(
                "rename target {to:?} has no legal characters"
            )));
        }

        let from_path = self.parse_path(from)?;
        let to_path = WikiPath::new(from_path.space(), clean.as_str())?;
        if clean == from || to_path == from_path {
            return Err(ContentError::InvalidArgument(format!(
                "cannot rename {from_path} to itself"
            )));
        }
        if !self.page_exists(session, &from_path, PageVersion::Latest)? {
            return Err(ContentError::not_found(&from_path, PageVersion::Latest));
        }

        let from_key = self.resolver.page_key(&from_path);
        let to_key = self.resolver.page_key(&to_path);
        let occupant = session.read(&to_key)?;
        if from_key == to_key || occupant.as_ref().is_some_and(|r| !r.is_new()) {
            return Err(ContentError::AlreadyExists(to_path.to_string()));
        }

        let mut referrers = self.references.referred_by(&from_path);
        for attachment in self.attachments(session, &from_path)? {
            referrers.extend(self.references.referred_by(&attachment));
        }
        if occupant.is_some() {
            session.stage(Mutation::RemoveNode { key: to_key.clone() })?;
        }
        session.stage(Mutation::RemoveNode {
            key: self.resolver.staging_key(&to_path),
        })?;
        session.stage(Mutation::Move {
            from: from_key,
            to: to_key,
            from_path: from_path.clone(),
            to_path: to_path.clone(),
        })?;
        session.commit()?;
        self.resolver.invalidate(&from_path);
        self.resolver.invalidate(&to_path);

        let mut page = match self.get_page(session, &to_path, PageVersion::Latest) {
            Ok(page) => page,
            Err(e) if e.is_not_found() => {
                return Err(ContentError::internal(format!(
                    "rename failed: {to_path} not found after move"
                )));
            }
            Err(e) => return Err(e),
        };
        if self.page_exists(session, &from_path, PageVersion::Latest)? {
            return Err(ContentError::internal(format!(
                "rename failed: {from_path} still exists after move"
            )));
        }

        page.set_attribute(keys::CHANGENOTE, format!("{from_path} ==> {to_path}"));
        page.set_author(author);
        page.set_title(clean);
        self.references.rename(&from_path, &to_path);
        info!(from = %from_path, to = %to_path, author, "renamed page");
        self.events
            .publish(ContentEvent::renamed(from_path.clone(), to_path.clone()).with_actor(author));
        self.save(session, &mut page)?;

        self.rewrite_referrers(session, &referrers, &from_path, &to_path, author)?;
        Ok(to_path)
    }

    /// Saved attachments stored below `path`.
    fn attachments(&self, session: &Session, path: &WikiPath) -> Result<Vec<WikiPath>> {
        let prefix = format!("{}/", self.resolver.resolve(path).as_str());
        Ok(session
            .list(PathRoot::Pages, &prefix)?
            .into_iter()
            .filter(|r| !r.is_new())
            .map(|r| r.path)
            .collect())
    }

    fn rewrite_referrers(
        &self,
        session: &Session,
        referrers: &BTreeSet<WikiPath>,
        from: &WikiPath,
        to: &WikiPath,
        author: &str,
    ) -> Result<()> {
        for referrer in referrers {
            let target = referrer.rebase(from, to).unwrap_or_else(|| referrer.clone());
            let mut page = match self.get_page(session, &target, PageVersion::Latest) {
                Ok(page) => page,
                Err(e) if e.is_not_found() => {
                    warn!(referrer = %target, "referrer vanished before its links were rewritten");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let rewritten = rewrite_links(
                page.content(),
                from,
                to,
                target.space(),
                self.options.camel_case_links,
            );
            if rewritten == page.content() {
                continue;
            }
            page.set_content(rewritten);
            page.set_author(author);
            self.save(session, &mut page)?;
            debug!(referrer = %target, "rewrote links after rename");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reference index
    // -----------------------------------------------------------------------

    /// Re-index the links of every saved page. Returns the number of pages.
    pub fn rebuild_references(&self, session: &Session) -> Result<usize> {
        let pages = self.all_pages(session, None)?;
        for page in &pages {
            self.references.update(page.path(), page.content());
        }
        debug!(pages = pages.len(), "rebuilt reference index");
        Ok(pages.len())
    }
}

impl std::fmt::Debug for ContentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentManager")
            .field("sessions", &self.sessions)
            .field("options", &self.options)
            .finish()
    }
}

fn check_content_type(content_type: &str) -> Result<()> {
    match content_type.split_once('/') {
        Some((kind, sub)) if !kind.trim().is_empty() && !sub.trim().is_empty() => Ok(()),
        _ => Err(ContentError::InvalidContentType(content_type.to_string())),
    }
}
