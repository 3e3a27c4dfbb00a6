//! The synchronization engine: keeps each list's in-memory subscriber
//! registry consistent with the remote review pages, and pushes membership
//! changes through bounded batches of form posts.
//!
//! The remote side is an HTML UI with no API contract, so every write is
//! best-effort: payloads are fired through a fixed worker pool without
//! per-request acknowledgment, and correctness is re-established afterwards
//! by polling the affected page until it visibly changes and rebuilding the
//! registry from it.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use listward_client::{ClientConfig, FetchError, RawPage, SympaClient};
use listward_core::{
    reconcile, BounceRow, BounceState, ReconcilePlan, Subscriber, SubscriberRow,
};
use tokio::sync::{mpsc, Mutex, Semaphore};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "listward-sync";

/// Cached list state is considered fresh for this long.
pub const UPDATE_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// How long to poll for a page to change after a write batch.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(60);
/// Spacing between poll attempts.
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);
/// Worker-pool size for batch dispatch and list population.
pub const DEFAULT_WORKERS: usize = 4;

/// One form-encoded write, ready to post to the session endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPayload {
    fields: Vec<(String, String)>,
}

impl FormPayload {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Submit every payload exactly once through a fixed pool of `workers`
/// tasks draining a shared queue, returning only after the queue is empty
/// and every worker has stopped. The queue is unbounded, so a batch larger
/// than the pool can never deadlock on enqueue. Submission order across
/// workers is unspecified; each submission is fire-and-forget.
pub async fn dispatch<F, Fut>(payloads: Vec<FormPayload>, workers: usize, submit: F)
where
    F: Fn(FormPayload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    if payloads.is_empty() {
        return;
    }

    let (tx, rx) = mpsc::unbounded_channel();
    for payload in payloads {
        let _ = tx.send(payload);
    }
    drop(tx);

    let rx = Arc::new(Mutex::new(rx));
    let submit = Arc::new(submit);
    let mut handles = Vec::with_capacity(workers.max(1));
    for worker in 0..workers.max(1) {
        let rx = Arc::clone(&rx);
        let submit = Arc::clone(&submit);
        handles.push(tokio::spawn(
            async move {
                loop {
                    let payload = rx.lock().await.recv().await;
                    let Some(payload) = payload else { break };
                    submit(payload).await;
                }
            }
            .instrument(info_span!("dispatch_worker", worker)),
        ));
    }

    for handle in handles {
        let _ = handle.await;
    }
}

/// Poll `fetch` at `interval` spacing until the fetched text differs from
/// `previous` or `timeout` elapses, whichever comes first. Returns the last
/// successfully fetched page either way: a timeout is not an error, since a
/// write that changes nothing (removing an already-absent member) never
/// changes the page. `None` only when every attempt failed, in which case
/// the caller keeps its cached snapshot.
pub async fn await_change<F, Fut>(
    mut fetch: F,
    previous: &str,
    timeout: Duration,
    interval: Duration,
) -> Option<RawPage>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RawPage, FetchError>>,
{
    let deadline = Instant::now() + timeout;
    let mut latest: Option<RawPage> = None;

    loop {
        match fetch().await {
            Ok(page) => {
                let changed = page.text != previous;
                latest = Some(page);
                if changed {
                    return latest;
                }
            }
            Err(err) => warn!(error = %err, "poll fetch failed"),
        }
        if Instant::now() >= deadline {
            return latest;
        }
        tokio::time::sleep(interval).await;
    }
}

/// Desired-membership input for [`MailingList::set_subscribers`].
#[derive(Debug, Clone)]
pub enum DesiredInput {
    /// Bare addresses; display names default to empty.
    Emails(Vec<String>),
    /// Explicit email -> display-name mapping.
    Pairs(BTreeMap<String, String>),
    /// Line-oriented file of `email [display name...]` entries.
    File(PathBuf),
}

impl DesiredInput {
    /// Normalize to the mapping form. Malformed entries are logged and
    /// skipped; only an unreadable file aborts.
    pub async fn normalize(self) -> anyhow::Result<BTreeMap<String, String>> {
        match self {
            DesiredInput::Emails(emails) => Ok(emails
                .into_iter()
                .filter_map(|email| {
                    let email = email.trim().to_string();
                    if looks_like_email(&email) {
                        Some((email, String::new()))
                    } else {
                        warn!(entry = %email, "skipping malformed subscriber entry");
                        None
                    }
                })
                .collect()),
            DesiredInput::Pairs(pairs) => Ok(pairs
                .into_iter()
                .filter(|(email, _)| {
                    let ok = looks_like_email(email);
                    if !ok {
                        warn!(entry = %email, "skipping malformed subscriber entry");
                    }
                    ok
                })
                .collect()),
            DesiredInput::File(path) => {
                let text = tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?;
                Ok(parse_desired_lines(&text))
            }
        }
    }
}

fn looks_like_email(entry: &str) -> bool {
    !entry.is_empty() && entry.contains('@')
}

fn parse_desired_lines(text: &str) -> BTreeMap<String, String> {
    let mut desired = BTreeMap::new();
    for line in text.lines() {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some(email) if looks_like_email(email) => {
                let name = parts.collect::<Vec<_>>().join(" ");
                desired.insert(email.to_string(), name);
            }
            Some(_) => warn!(entry = line, "skipping malformed subscriber entry"),
            None => {}
        }
    }
    desired
}

type PageFuture =
    std::pin::Pin<Box<dyn Future<Output = Result<RawPage, FetchError>> + Send>>;

/// One mailing list: cached remote pages, the subscriber registry built
/// from them, and the privileged operations against the list.
///
/// Operations take `&mut self`, so a list's update cycle can never
/// interleave with itself; callers that share a list across tasks must
/// wrap it in a lock, which the borrow rules make explicit.
pub struct MailingList {
    client: Arc<SympaClient>,
    name: String,
    admin: bool,
    review: Option<RawPage>,
    review_bouncing: Option<RawPage>,
    subscribers: BTreeMap<String, Subscriber>,
    last_refresh: Option<Instant>,
    workers: usize,
}

impl MailingList {
    pub fn new(client: Arc<SympaClient>, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
            admin: false,
            review: None,
            review_bouncing: None,
            subscribers: BTreeMap::new(),
            last_refresh: None,
            workers: DEFAULT_WORKERS,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Privilege flag as of the last refresh. Privileged operations never
    /// consult this directly; they go through the refresh-then-check guard.
    pub fn is_admin(&self) -> bool {
        self.admin
    }

    /// Review URIs request up to 10,000 members sorted by email.
    fn review_uri(&self) -> String {
        format!("?sortby=email&action=review&list={}&size=10000", self.name)
    }

    fn review_bouncing_uri(&self) -> String {
        format!(
            "?sortby=email&action=reviewbouncing&list={}&size=10000",
            self.name
        )
    }

    fn needs_refresh_at(&self, now: Instant) -> bool {
        let outdated = match self.last_refresh {
            Some(at) => now.saturating_duration_since(at) > UPDATE_INTERVAL,
            None => true,
        };
        self.review.is_none()
            || self.subscribers.is_empty()
            || self.review_bouncing.is_none()
            || outdated
    }

    fn needs_refresh(&self) -> bool {
        self.needs_refresh_at(Instant::now())
    }

    /// Re-synchronize from the remote pages if the cached state is stale.
    /// Fetch failures keep the previous cache and are never fatal.
    pub async fn update(&mut self) {
        if !self.needs_refresh() {
            return;
        }
        let run_id = Uuid::new_v4();
        let span = info_span!("list_update", %run_id, list = %self.name);
        async {
            let review = self.client.get(&self.review_uri()).await;
            match review {
                Ok(page) => self.review = Some(page),
                Err(err) => warn!(error = %err, "review page fetch failed"),
            }
            let bouncing = self.client.get(&self.review_bouncing_uri()).await;
            match bouncing {
                Ok(page) => self.review_bouncing = Some(page),
                Err(err) => warn!(error = %err, "bounce page fetch failed"),
            }
            self.refresh_admin();
            self.rebuild_registry();
            self.last_refresh = Some(Instant::now());
        }
        .instrument(span)
        .await;
    }

    /// Privilege can only be read off a fetched page; keep the previous
    /// flag when there is none.
    fn refresh_admin(&mut self) {
        if let Some(review) = &self.review {
            self.admin = listward_scrape::parse_privilege_role(&review.text)
                .map(|role| listward_scrape::is_privileged_role(&role))
                .unwrap_or(false);
        }
    }

    fn rebuild_registry(&mut self) {
        if self.review.is_some() {
            let parsed = self
                .review
                .as_ref()
                .and_then(|page| listward_scrape::parse_subscriber_rows(&page.text));
            let rows = match parsed {
                Some(rows) => rows,
                // A missing table reads as zero rows.
                None => {
                    self.log_missing_table("subscriptions");
                    Vec::new()
                }
            };
            self.apply_review_rows(&rows);
        }

        self.rebuild_bounce_state();
    }

    fn rebuild_bounce_state(&mut self) {
        if self.review_bouncing.is_some() {
            let parsed = self
                .review_bouncing
                .as_ref()
                .and_then(|page| listward_scrape::parse_bounce_rows(&page.text));
            let rows = match parsed {
                Some(rows) => rows,
                None => {
                    self.log_missing_table("bouncing subscriptions");
                    Vec::new()
                }
            };
            self.apply_bounce_rows(rows);
        }
    }

    /// A missing table means either an authorization banner took its place
    /// or the list genuinely has no entries; the cached privilege flag
    /// tells the two apart.
    fn log_missing_table(&self, what: &str) {
        if self.admin {
            info!(list = %self.name, "list has no {what}");
        } else {
            warn!(
                list = %self.name,
                "current user is not an administrator of the list; access denied"
            );
        }
    }

    /// Merge freshly parsed review rows into the registry, then prune
    /// entries that were not seen. Pruning is skipped on the very first
    /// population: an empty first result legitimately means "no
    /// subscribers" and there is nothing to prune anyway.
    fn apply_review_rows(&mut self, rows: &[SubscriberRow]) {
        let had_prior_state = !self.subscribers.is_empty();
        let mut seen = BTreeSet::new();

        for row in rows {
            seen.insert(row.email.clone());
            match self.subscribers.get_mut(&row.email) {
                Some(existing) => existing.merge_info(row),
                None => {
                    self.subscribers
                        .insert(row.email.clone(), Subscriber::from_row(row));
                }
            }
        }

        if had_prior_state {
            self.subscribers.retain(|email, _| seen.contains(email));
        }
    }

    /// Reset every entry's bounce state, then apply the bounce rows. The
    /// two review pages are expected to agree on membership; a bounce row
    /// for an unknown email is a consistency warning, not an error.
    fn apply_bounce_rows(&mut self, rows: Vec<BounceRow>) {
        for subscriber in self.subscribers.values_mut() {
            subscriber.set_bounce(BounceState::default());
        }
        for row in rows {
            match self.subscribers.get_mut(&row.email) {
                Some(subscriber) => subscriber.set_bounce(row.into_state()),
                None => warn!(
                    list = %self.name,
                    email = %row.email,
                    "bounce row references an email missing from the review page; skipping"
                ),
            }
        }
    }

    /// Refresh-if-stale, then consult the privilege flag. Every privileged
    /// operation funnels through here.
    async fn ensure_admin(&mut self) -> bool {
        self.update().await;
        if self.admin {
            true
        } else {
            warn!(
                list = %self.name,
                "current user is not an administrator of the list; access denied"
            );
            false
        }
    }

    /// The full registry, or `None` when the current user is not an
    /// administrator of the list.
    pub async fn subscribers(&mut self) -> Option<&BTreeMap<String, Subscriber>> {
        if !self.ensure_admin().await {
            return None;
        }
        Some(&self.subscribers)
    }

    /// The bouncing members only.
    pub async fn bouncing(&mut self) -> Option<BTreeMap<String, Subscriber>> {
        if !self.ensure_admin().await {
            return None;
        }
        Some(
            self.subscribers
                .iter()
                .filter(|(_, s)| s.bounce.bouncing)
                .map(|(email, s)| (email.clone(), s.clone()))
                .collect(),
        )
    }

    pub async fn subscriber_emails(&mut self) -> Option<Vec<String>> {
        let subscribers = self.subscribers().await?;
        Some(subscribers.keys().cloned().collect())
    }

    pub async fn bouncing_emails(&mut self) -> Option<Vec<String>> {
        let bouncing = self.bouncing().await?;
        Some(bouncing.into_keys().collect())
    }

    /// Export the membership (or only the bouncing members) as a flat text
    /// file, one address per line. Returns the number of addresses written;
    /// zero when access is denied.
    pub async fn export_emails(&mut self, path: &Path, bouncing_only: bool) -> anyhow::Result<usize> {
        if !self.ensure_admin().await {
            return Ok(0);
        }
        let emails: Vec<&String> = self
            .subscribers
            .iter()
            .filter(|(_, s)| !bouncing_only || s.bounce.bouncing)
            .map(|(email, _)| email)
            .collect();
        let body = emails
            .iter()
            .map(|email| format!("{email}\n"))
            .collect::<String>();
        tokio::fs::write(path, body)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(emails.len())
    }

    fn add_payload(&self, email: &str, name: &str) -> FormPayload {
        FormPayload::new(vec![
            ("list".to_string(), self.name.clone()),
            ("action_add".to_string(), "Add subscribers".to_string()),
            ("quiet".to_string(), "on".to_string()),
            ("used".to_string(), "true".to_string()),
            ("dump".to_string(), format!("{email} {name}").trim().to_string()),
        ])
    }

    fn remove_payload(&self, email: &str) -> FormPayload {
        FormPayload::new(vec![
            ("list".to_string(), self.name.clone()),
            ("quiet".to_string(), "on".to_string()),
            ("email".to_string(), email.to_string()),
            (
                "action_del".to_string(),
                "Delete selected email addresses".to_string(),
            ),
        ])
    }

    fn reset_bounce_payload(&self, email: &str) -> FormPayload {
        FormPayload::new(vec![
            ("list".to_string(), self.name.clone()),
            ("previous_action".to_string(), "reviewbouncing".to_string()),
            ("email".to_string(), email.to_string()),
            (
                "action_resetbounce".to_string(),
                "Reset errors for selected users".to_string(),
            ),
        ])
    }

    async fn dispatch_batch(&self, payloads: Vec<FormPayload>) {
        let client = Arc::clone(&self.client);
        dispatch(payloads, self.workers, move |payload| {
            let client = Arc::clone(&client);
            async move {
                if let Err(err) = client.post_form(payload.fields()).await {
                    warn!(
                        error = %err,
                        "write submission failed; state is re-verified by the refresh"
                    );
                }
            }
        })
        .await;
    }

    fn page_fetcher(&self, uri: String) -> impl FnMut() -> PageFuture {
        let client = Arc::clone(&self.client);
        move || -> PageFuture {
            let client = Arc::clone(&client);
            let uri = uri.clone();
            Box::pin(async move { client.get(&uri).await })
        }
    }

    /// After subscriber writes: poll the review page until it visibly
    /// changes, re-fetch the bounce page once, rebuild everything.
    async fn refresh_after_subscriber_writes(&mut self) {
        let previous = self
            .review
            .as_ref()
            .map(|page| page.text.clone())
            .unwrap_or_default();
        let fetch = self.page_fetcher(self.review_uri());
        if let Some(page) = await_change(fetch, &previous, POLL_TIMEOUT, POLL_INTERVAL).await {
            self.review = Some(page);
        }
        let bouncing = self.client.get(&self.review_bouncing_uri()).await;
        match bouncing {
            Ok(page) => self.review_bouncing = Some(page),
            Err(err) => warn!(error = %err, "bounce page fetch failed"),
        }
        self.rebuild_registry();
        self.last_refresh = Some(Instant::now());
    }

    /// After bounce writes: poll the bounce page until it visibly changes
    /// and re-apply the bounce pass. Membership itself is untouched.
    async fn refresh_after_bounce_writes(&mut self) {
        let previous = self
            .review_bouncing
            .as_ref()
            .map(|page| page.text.clone())
            .unwrap_or_default();
        let fetch = self.page_fetcher(self.review_bouncing_uri());
        if let Some(page) = await_change(fetch, &previous, POLL_TIMEOUT, POLL_INTERVAL).await {
            self.review_bouncing = Some(page);
        }
        self.rebuild_bounce_state();
    }

    /// Add one subscriber. Returns the response page, or `None` when
    /// access is denied or the submission failed.
    pub async fn add_subscriber(&mut self, email: &str, name: &str) -> Option<RawPage> {
        if !self.ensure_admin().await {
            return None;
        }
        let payload = self.add_payload(email, name);
        let response = match self.client.post_form(payload.fields()).await {
            Ok(page) => Some(page),
            Err(err) => {
                warn!(error = %err, "add submission failed");
                None
            }
        };
        self.refresh_after_subscriber_writes().await;
        response
    }

    /// Remove one subscriber.
    pub async fn remove_subscriber(&mut self, email: &str) -> Option<RawPage> {
        if !self.ensure_admin().await {
            return None;
        }
        let payload = self.remove_payload(email);
        let response = match self.client.post_form(payload.fields()).await {
            Ok(page) => Some(page),
            Err(err) => {
                warn!(error = %err, "remove submission failed");
                None
            }
        };
        self.refresh_after_subscriber_writes().await;
        response
    }

    /// Reconcile the membership against `desired`: add what is missing,
    /// remove what is surplus, leave the intersection alone. An empty plan
    /// dispatches nothing and skips the refresh. Returns the executed
    /// plan, or `None` when access is denied or the input was unreadable.
    pub async fn set_subscribers(&mut self, desired: DesiredInput) -> Option<ReconcilePlan> {
        if !self.ensure_admin().await {
            return None;
        }
        let desired = match desired.normalize().await {
            Ok(map) => map,
            Err(err) => {
                warn!(list = %self.name, error = %err, "could not read desired subscribers");
                return None;
            }
        };
        let current: BTreeSet<String> = self.subscribers.keys().cloned().collect();
        let plan = reconcile(&current, &desired);
        if plan.is_empty() {
            info!(list = %self.name, "membership already matches; nothing to dispatch");
            return Some(plan);
        }

        let mut payloads: Vec<FormPayload> = plan
            .additions
            .iter()
            .map(|(email, name)| self.add_payload(email, name))
            .collect();
        payloads.extend(plan.removals.iter().map(|email| self.remove_payload(email)));

        info!(
            list = %self.name,
            additions = plan.additions.len(),
            removals = plan.removals.len(),
            "dispatching membership changes"
        );
        self.dispatch_batch(payloads).await;
        self.refresh_after_subscriber_writes().await;
        Some(plan)
    }

    /// Reset the bounce errors of every bouncing member. Returns how many
    /// resets were dispatched.
    pub async fn reset_bouncing(&mut self) -> Option<usize> {
        if !self.ensure_admin().await {
            return None;
        }
        let payloads: Vec<FormPayload> = self
            .subscribers
            .iter()
            .filter(|(_, s)| s.bounce.bouncing)
            .map(|(email, _)| self.reset_bounce_payload(email))
            .collect();
        if payloads.is_empty() {
            return Some(0);
        }
        let count = payloads.len();
        self.dispatch_batch(payloads).await;
        self.refresh_after_bounce_writes().await;
        Some(count)
    }

    /// Reset the bounce errors of one member.
    pub async fn reset_bouncing_subscriber(&mut self, email: &str) -> Option<RawPage> {
        if !self.ensure_admin().await {
            return None;
        }
        let payload = self.reset_bounce_payload(email);
        let response = match self.client.post_form(payload.fields()).await {
            Ok(page) => Some(page),
            Err(err) => {
                warn!(error = %err, "bounce reset submission failed");
                None
            }
        };
        self.refresh_after_bounce_writes().await;
        response
    }

    /// Unsubscribe every bouncing member. Returns how many removals were
    /// dispatched.
    pub async fn remove_bouncing_subscribers(&mut self) -> Option<usize> {
        if !self.ensure_admin().await {
            return None;
        }
        let payloads: Vec<FormPayload> = self
            .subscribers
            .iter()
            .filter(|(_, s)| s.bounce.bouncing)
            .map(|(email, _)| self.remove_payload(email))
            .collect();
        if payloads.is_empty() {
            return Some(0);
        }
        let count = payloads.len();
        self.dispatch_batch(payloads).await;
        self.refresh_after_subscriber_writes().await;
        Some(count)
    }
}

/// One authenticated Sympa session and the lists discovered in it.
pub struct Session {
    client: Arc<SympaClient>,
    lists: BTreeMap<String, MailingList>,
    workers: usize,
}

impl Session {
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: Arc::new(SympaClient::new(config)?),
            lists: BTreeMap::new(),
            workers: DEFAULT_WORKERS,
        })
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn client(&self) -> &Arc<SympaClient> {
        &self.client
    }

    /// Form login. On success the sidebar list-of-lists from the login
    /// response seeds the session's lists; on failure the session stays
    /// unauthenticated and the list map stays empty.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<bool, FetchError> {
        let page = self.client.login(email, password).await?;
        if !page.is_authenticated() {
            self.lists.clear();
            return Ok(false);
        }
        self.lists = listward_scrape::parse_list_names(&page.text)
            .into_iter()
            .map(|name| {
                let list = MailingList::new(Arc::clone(&self.client), name.clone())
                    .with_workers(self.workers);
                (name, list)
            })
            .collect();
        info!(lists = self.lists.len(), "logged in");
        Ok(true)
    }

    pub fn lists(&self) -> &BTreeMap<String, MailingList> {
        &self.lists
    }

    pub fn list(&self, name: &str) -> Option<&MailingList> {
        self.lists.get(name)
    }

    pub fn list_mut(&mut self, name: &str) -> Option<&mut MailingList> {
        self.lists.get_mut(name)
    }

    /// Get or lazily instantiate a list by name, for working with a known
    /// list without going through discovery.
    pub fn list_named(&mut self, name: &str) -> &mut MailingList {
        let client = Arc::clone(&self.client);
        let workers = self.workers;
        self.lists
            .entry(name.to_string())
            .or_insert_with(|| MailingList::new(client, name).with_workers(workers))
    }

    /// Update one list by name.
    pub async fn populate(&mut self, name: &str) {
        if let Some(list) = self.lists.get_mut(name) {
            list.update().await;
        }
    }

    /// Update every known list through a bounded pool. Each list is moved
    /// into exactly one worker task, so no list's update cycle can
    /// interleave with itself.
    pub async fn populate_all(&mut self) {
        match self.client.logged_in().await {
            Ok(true) => {}
            Ok(false) => {
                warn!("cannot populate lists; not logged in");
                return;
            }
            Err(err) => {
                warn!(error = %err, "cannot check session state");
                return;
            }
        }

        let lists = std::mem::take(&mut self.lists);
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut handles = Vec::with_capacity(lists.len());
        for (name, mut list) in lists {
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore not closed");
                list.update().await;
                (name, list)
            }));
        }
        for handle in handles {
            if let Ok((name, list)) = handle.await {
                self.lists.insert(name, list);
            }
        }
    }

    /// Best-effort logout.
    pub async fn logout(&self) {
        if let Err(err) = self.client.logout().await {
            warn!(error = %err, "logout failed");
        }
    }
}
