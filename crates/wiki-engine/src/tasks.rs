//! The two tasks that wrap every page save.
//!
//! [`PreSaveTask`] runs when the save is submitted: it filters the proposed
//! text and stashes everything the commit needs as workflow facts.
//! [`SaveTask`] runs once the save is approved (or immediately when no
//! approver is configured) and writes the stashed state to the store.
//!
//! The commit side reads only facts, so a pending save survives a restart
//! as long as its facts are persisted.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use wiki_content::{ContentManager, WikiPage};
use wiki_diff::DiffProvider;
use wiki_types::{keys as attr, Acl, Attributes, PageVersion, WikiPath, WIKI_MARKUP};
use wiki_workflow::{keys, Facts, Task, TaskError};

use crate::acl::parse_acl;
use crate::error::EngineError;
use crate::filter::FilterManager;

/// Workflow name used for page saves.
pub const SAVE_WORKFLOW: &str = "saveWikiPage";

/// Facts stashed by [`PreSaveTask`] for [`SaveTask`].
pub mod stash {
    pub const ACL: &str = "page.acl";
    pub const AUTHOR: &str = "page.author";
    pub const ATTRIBUTES: &str = "page.attributes";
    pub const LAST_MODIFIED: &str = "page.lastmodified";
    pub const NAME: &str = "page.name";
    pub const TEXT: &str = "page.text";
    /// Version written by the commit; absent until it has run.
    pub const VERSION: &str = "page.version";
}

/// What the save tasks run against.
pub struct Services {
    pub(crate) content: ContentManager,
    pub(crate) filters: FilterManager,
    pub(crate) differ: Box<dyn DiffProvider>,
}

impl Services {
    pub fn content(&self) -> &ContentManager {
        &self.content
    }

    pub fn filters(&self) -> &FilterManager {
        &self.filters
    }

    pub fn differ(&self) -> &dyn DiffProvider {
        self.differ.as_ref()
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("content", &self.content)
            .field("filters", &self.filters)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Prepare
// ---------------------------------------------------------------------------

/// Filters the proposed text and stashes the page state.
#[derive(Debug)]
pub struct PreSaveTask {
    path: WikiPath,
    acl: Acl,
    attributes: Attributes,
    author: String,
    proposed: String,
}

impl PreSaveTask {
    /// Prepare a save of `proposed` over `page`. The page's own author is
    /// kept when it has one; otherwise `user` becomes the author.
    pub fn new(page: &WikiPage, user: &str, proposed: impl Into<String>) -> Self {
        Self {
            path: page.path().clone(),
            acl: page.acl().clone(),
            attributes: page.attributes().clone(),
            author: page.author().unwrap_or(user).to_string(),
            proposed: proposed.into(),
        }
    }
}

impl Task<Services> for PreSaveTask {
    fn name(&self) -> &str {
        "preSave"
    }

    fn execute(&self, services: &Services, facts: &mut Facts) -> Result<(), TaskError> {
        let text = services.filters.pre_save(&self.path, &self.proposed)?;

        facts.insert_as(stash::ACL, &self.acl)?;
        facts.insert(stash::AUTHOR, self.author.as_str());
        facts.insert_as(stash::ATTRIBUTES, &self.attributes)?;
        facts.insert(stash::LAST_MODIFIED, Utc::now().to_rfc3339());
        facts.insert(stash::NAME, self.path.to_string());
        facts.insert(keys::PROPOSED_TEXT, text.as_str());
        facts.insert(stash::TEXT, text);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// Writes the stashed page state to the store.
///
/// The page is fetched again at commit time and recreated if it vanished
/// while the save was pending. ACL directives in the saved text replace the
/// stashed ACL before the version is written.
#[derive(Clone, Copy, Debug, Default)]
pub struct SaveTask;

impl Task<Services> for SaveTask {
    fn name(&self) -> &str {
        "save"
    }

    fn execute(&self, services: &Services, facts: &mut Facts) -> Result<(), TaskError> {
        let name = facts.get_str(stash::NAME).ok_or("no page name stashed")?;
        let path = WikiPath::parse(name)?;
        let text = facts.get_str(stash::TEXT).ok_or("no page text stashed")?.to_string();

        let content = &services.content;
        let session = content.sessions().current();
        let mut page = match content.get_page(&session, &path, PageVersion::Latest) {
            Ok(page) => page,
            Err(e) if e.is_not_found() => {
                debug!(%path, "page vanished before commit, recreating");
                content.add_page(&session, &path, WIKI_MARKUP).map_err(EngineError::from)?
            }
            Err(e) => return Err(EngineError::from(e).into()),
        };

        let markup_acl = parse_acl(&text);
        let acl = if markup_acl.is_empty() {
            facts.get_as::<Acl>(stash::ACL)?.unwrap_or_default()
        } else {
            markup_acl
        };
        page.set_acl(acl);
        if let Some(author) = facts.get_str(stash::AUTHOR) {
            page.set_author(author);
        }
        if let Some(attributes) = facts.get_as::<Attributes>(stash::ATTRIBUTES)? {
            page.set_attributes(attributes);
        }
        match facts.get_str(keys::DECIDED_BY) {
            Some(approver) => page.set_attribute(attr::APPROVED_BY, approver),
            None => {
                page.remove_attribute(attr::APPROVED_BY);
            }
        }
        if let Some(at) = facts.get_as::<DateTime<Utc>>(stash::LAST_MODIFIED)? {
            page.set_last_modified(at);
        }
        page.set_content(text);

        if let Err(e) = content.save(&session, &mut page) {
            session.rollback();
            return Err(EngineError::from(e).into());
        }
        facts.insert(stash::VERSION, page.version());

        if let Err(e) = services.filters.post_save(&path, page.content()) {
            warn!(%path, version = page.version(), error = %e, "post-save filter failed, version kept");
            facts.insert(keys::COMMIT_NOTE, e.to_string());
        }
        Ok(())
    }
}
